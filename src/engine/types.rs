// SPDX-License-Identifier: Apache-2.0

//! Data types shared by the warehouse and source drivers
//!
//! Rows coming back from Redshift and SQL Server are normalized into the same
//! flat representation so the provisioning steps never see driver types.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::observability::Sensitive;

/// Unique identifier for a database session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: Sensitive<String>,
    pub database: Option<String>,
    pub ssl: bool,
    pub connect_timeout_secs: u64,
}

impl ConnectionConfig {
    /// `user@host:port/database`, safe to print and log.
    pub fn display_name(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username,
            self.host,
            self.port,
            self.database.as_deref().unwrap_or("default")
        )
    }
}

/// Universal value representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Json(j) => write!(f, "{}", j),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

/// Column metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// A single row of data (indexed by column order)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

/// Query execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column information
    pub columns: Vec<ColumnInfo>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Number of affected rows (for statements that do not return rows)
    pub affected_rows: Option<u64>,
    /// Execution time in milliseconds
    pub execution_time_ms: f64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: None,
            execution_time_ms: 0.0,
        }
    }

    pub fn with_affected_rows(affected: u64, time_ms: f64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: Some(affected),
            execution_time_ms: time_ms,
        }
    }

    /// First column of the first row, if any.
    pub fn first_value(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.values.first())
    }

    /// Text values of the given column, skipping NULLs.
    pub fn column_strings(&self, idx: usize) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.values.get(idx))
            .filter(|v| !matches!(v, Value::Null))
            .map(|v| v.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_of(rows: Vec<Vec<Value>>) -> QueryResult {
        QueryResult {
            columns: vec![ColumnInfo {
                name: "tablename".to_string(),
                data_type: "TEXT".to_string(),
            }],
            rows: rows.into_iter().map(|values| Row { values }).collect(),
            affected_rows: None,
            execution_time_ms: 1.0,
        }
    }

    #[test]
    fn test_first_value_and_column_strings() {
        let result = result_of(vec![
            vec![Value::from("dimdate")],
            vec![Value::Null],
            vec![Value::from("dimlocation")],
        ]);
        assert_eq!(result.first_value(), Some(&Value::from("dimdate")));
        assert_eq!(result.column_strings(0), vec!["dimdate", "dimlocation"]);
        assert!(result.column_strings(3).is_empty());
        assert!(QueryResult::empty().first_value().is_none());
    }

    #[test]
    fn test_value_as_i64() {
        assert_eq!(Value::Int(42).as_i64(), Some(42));
        assert_eq!(Value::from(" 17 ").as_i64(), Some(17));
        assert_eq!(Value::Bool(true).as_i64(), None);
        assert_eq!(Value::Null.as_i64(), None);
    }

    #[test]
    fn test_connection_config_never_serializes_password() {
        let config = ConnectionConfig {
            driver: "redshift".to_string(),
            host: "wh.example.com".to_string(),
            port: 5439,
            username: "admin".to_string(),
            password: Sensitive::new("hunter2".to_string()),
            database: Some("dev".to_string()),
            ssl: true,
            connect_timeout_secs: 15,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!format!("{:?}", config).contains("hunter2"));
        assert_eq!(config.display_name(), "admin@wh.example.com:5439/dev");
    }
}
