// SPDX-License-Identifier: Apache-2.0

//! Redshift Driver
//!
//! Implements the DataEngine trait for Amazon Redshift using SQLx's Postgres
//! wire protocol support.
//!
//! ## Sessions
//!
//! Every session owns a single-connection pool. Provisioning runs its
//! statements strictly one after another, so one connection is enough and
//! keeps `svv_*` catalog reads on the same backend that ran the DDL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode, Postgres};
use sqlx::query::Query;
use sqlx::{Column, Row, TypeInfo};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::DataEngine;
use crate::engine::types::{
    ColumnInfo, ConnectionConfig, QueryResult, Row as QRow, SessionId, Value,
};

const APPLICATION_NAME: &str = "fedschema";
const DEFAULT_DATABASE: &str = "dev";

/// Redshift driver implementation
pub struct RedshiftDriver {
    sessions: Arc<RwLock<HashMap<SessionId, PgPool>>>,
}

impl RedshiftDriver {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn get_pool(&self, session: SessionId) -> EngineResult<PgPool> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&session)
            .cloned()
            .ok_or_else(|| EngineError::session_not_found(session.to_string()))
    }

    pub(crate) fn connect_options(config: &ConnectionConfig) -> PgConnectOptions {
        let ssl_mode = if config.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(config.password.expose())
            .database(config.database.as_deref().unwrap_or(DEFAULT_DATABASE))
            .ssl_mode(ssl_mode)
            .application_name(APPLICATION_NAME)
    }

    async fn open_pool(config: &ConnectionConfig) -> EngineResult<PgPool> {
        PgPoolOptions::new()
            .max_connections(1)
            .min_connections(0)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs.max(1)))
            .connect_with(Self::connect_options(config))
            .await
            .map_err(|e| classify_connect_error(e.to_string()))
    }

    fn bind_param<'q>(
        query: Query<'q, Postgres, PgArguments>,
        value: &'q Value,
    ) -> Query<'q, Postgres, PgArguments> {
        match value {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(b),
            Value::Int(i) => query.bind(i),
            Value::Float(f) => query.bind(f),
            Value::Text(s) => query.bind(s),
            Value::Json(j) => query.bind(j.to_string()),
        }
    }

    /// Converts a SQLx row to our universal Row type
    fn convert_row(pg_row: &PgRow) -> QRow {
        let values = pg_row
            .columns()
            .iter()
            .map(|col| Self::extract_value(pg_row, col.ordinal()))
            .collect();

        QRow { values }
    }

    /// Extracts a value from a PgRow at the given index
    fn extract_value(row: &PgRow, idx: usize) -> Value {
        // Option<T> keeps NULLs from failing the decode
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Value::Int).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
            return v.map(Value::Bool).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(Value::Float).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
            return v.map(|f| Value::Float(f as f64)).unwrap_or(Value::Null);
        }
        // NUMERIC stays textual so large DECIMAL(38,x) values survive
        if let Ok(v) = row.try_get::<Option<Decimal>, _>(idx) {
            return v.map(|d| Value::Text(d.to_string())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::Text).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
            return v.map(Value::Json).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
            return v.map(|dt| Value::Text(dt.to_rfc3339())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return v
                .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            return v
                .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
            return v
                .map(|t| Value::Text(t.format("%H:%M:%S").to_string()))
                .unwrap_or(Value::Null);
        }

        Value::Null
    }

    fn get_column_info(row: &PgRow) -> Vec<ColumnInfo> {
        row.columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name().to_string(),
                data_type: col.type_info().name().to_string(),
            })
            .collect()
    }
}

impl Default for RedshiftDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits connection errors into credential problems and everything else.
fn classify_connect_error(msg: String) -> EngineError {
    let lower = msg.to_lowercase();
    if lower.contains("password authentication failed")
        || lower.contains("authentication failed")
        || lower.contains("invalid password")
    {
        EngineError::auth_failed(msg)
    } else {
        EngineError::connection_failed(msg)
    }
}

/// Classify a query error into syntax or execution error.
fn classify_query_error(msg: String) -> EngineError {
    if msg.to_lowercase().contains("syntax error") {
        EngineError::syntax_error(msg)
    } else {
        EngineError::execution_error(msg)
    }
}

#[async_trait]
impl DataEngine for RedshiftDriver {
    fn driver_id(&self) -> &'static str {
        "redshift"
    }

    fn driver_name(&self) -> &'static str {
        "Amazon Redshift"
    }

    #[instrument(skip(self, config), fields(host = %config.host, port = config.port))]
    async fn test_connection(&self, config: &ConnectionConfig) -> EngineResult<()> {
        let pool = Self::open_pool(config).await?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| EngineError::execution_error(e.to_string()))?;

        pool.close().await;
        Ok(())
    }

    async fn connect(&self, config: &ConnectionConfig) -> EngineResult<SessionId> {
        let pool = Self::open_pool(config).await?;

        let session_id = SessionId::new();
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id, pool);

        debug!(session = %session_id, "redshift session opened");
        Ok(session_id)
    }

    async fn disconnect(&self, session: SessionId) -> EngineResult<()> {
        let pool = {
            let mut sessions = self.sessions.write().await;
            sessions
                .remove(&session)
                .ok_or_else(|| EngineError::session_not_found(session.to_string()))?
        };

        pool.close().await;
        debug!(session = %session, "redshift session closed");
        Ok(())
    }

    async fn execute(
        &self,
        session: SessionId,
        query: &str,
        params: &[Value],
    ) -> EngineResult<QueryResult> {
        let pool = self.get_pool(session).await?;
        let start = Instant::now();

        let mut q = sqlx::query(query);
        for param in params {
            q = Self::bind_param(q, param);
        }

        let pg_rows = q
            .fetch_all(&pool)
            .await
            .map_err(|e| classify_query_error(e.to_string()))?;

        let execution_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        let columns = pg_rows.first().map(Self::get_column_info).unwrap_or_default();
        let rows = pg_rows.iter().map(Self::convert_row).collect();

        Ok(QueryResult {
            columns,
            rows,
            affected_rows: None,
            execution_time_ms,
        })
    }

    async fn execute_in_transaction(&self, session: SessionId, query: &str) -> EngineResult<()> {
        let pool = self.get_pool(session).await?;

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| EngineError::transaction_error(e.to_string()))?;

        // Simple protocol: Redshift DDL is not preparable
        let conn: &mut sqlx::PgConnection = &mut tx;
        let outcome = sqlx::Executor::execute(conn, sqlx::raw_sql(query)).await;

        match outcome {
            Ok(_) => tx
                .commit()
                .await
                .map_err(|e| EngineError::transaction_error(e.to_string())),
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    debug!(error = %rollback_err, "rollback after failed statement also failed");
                }
                Err(classify_query_error(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Sensitive;

    fn config(ssl: bool) -> ConnectionConfig {
        ConnectionConfig {
            driver: "redshift".to_string(),
            host: "wg.123456789012.us-west-2.redshift-serverless.amazonaws.com".to_string(),
            port: 5439,
            username: "admin".to_string(),
            password: Sensitive::new("p@ss:word/with?chars".to_string()),
            database: None,
            ssl,
            connect_timeout_secs: 15,
        }
    }

    #[test]
    fn test_connect_options() {
        let options = RedshiftDriver::connect_options(&config(true));
        assert_eq!(
            options.get_host(),
            "wg.123456789012.us-west-2.redshift-serverless.amazonaws.com"
        );
        assert_eq!(options.get_port(), 5439);
        assert_eq!(options.get_username(), "admin");
        assert_eq!(options.get_database(), Some("dev"));
        assert!(matches!(options.get_ssl_mode(), PgSslMode::Require));
        assert_eq!(options.get_application_name(), Some("fedschema"));
    }

    #[test]
    fn test_ssl_disabled_still_prefers_tls() {
        let options = RedshiftDriver::connect_options(&config(false));
        assert!(matches!(options.get_ssl_mode(), PgSslMode::Prefer));
    }

    #[test]
    fn test_error_classification() {
        assert!(matches!(
            classify_connect_error("password authentication failed for user \"admin\"".into()),
            EngineError::AuthenticationFailed { .. }
        ));
        assert!(matches!(
            classify_connect_error("pool timed out while waiting for an open connection".into()),
            EngineError::ConnectionFailed { .. }
        ));
        assert!(matches!(
            classify_query_error("syntax error at or near \"EXTERNAL\"".into()),
            EngineError::SyntaxError { .. }
        ));
        assert!(matches!(
            classify_query_error("permission denied for schema raptor_external".into()),
            EngineError::ExecutionError { .. }
        ));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let driver = RedshiftDriver::new();
        let err = driver
            .execute(SessionId::new(), "SELECT 1", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound { .. }));
        assert!(driver.disconnect(SessionId::new()).await.is_err());
    }
}
