// SPDX-License-Identifier: Apache-2.0

//! SQL Server Driver
//!
//! Direct connection to the federated source database, used by the
//! `--preflight-source` check to confirm the credentials in the source secret
//! work and to see which tables the warehouse should be able to federate.
//!
//! Uses tiberius over a tokio TCP stream (via the `tokio-util` compat layer).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, ToSql};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::DataEngine;
use crate::engine::types::{
    ColumnInfo, ConnectionConfig, QueryResult, Row as QRow, SessionId, Value,
};

type MssqlClient = Client<Compat<TcpStream>>;

const NULL_PARAM: Option<&str> = None;

pub struct SqlServerDriver {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Mutex<MssqlClient>>>>>,
}

impl SqlServerDriver {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn get_session(&self, session: SessionId) -> EngineResult<Arc<Mutex<MssqlClient>>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&session)
            .cloned()
            .ok_or_else(|| EngineError::session_not_found(session.to_string()))
    }

    /// Build a tiberius Config from a ConnectionConfig.
    fn build_config(config: &ConnectionConfig) -> Config {
        let mut tib_config = Config::new();
        tib_config.host(&config.host);
        tib_config.port(config.port);
        tib_config.authentication(AuthMethod::sql_server(
            &config.username,
            config.password.expose(),
        ));
        if let Some(ref db) = config.database {
            if !db.is_empty() {
                tib_config.database(db);
            }
        }
        tib_config.application_name("fedschema");
        tib_config.encryption(if config.ssl {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::Off
        });
        tib_config.trust_cert();
        tib_config
    }

    async fn connect_raw(config: &ConnectionConfig) -> EngineResult<MssqlClient> {
        let tib_config = Self::build_config(config);
        let limit = Duration::from_secs(config.connect_timeout_secs.max(1));

        let tcp = match timeout(limit, TcpStream::connect(tib_config.get_addr())).await {
            Ok(Ok(tcp)) => tcp,
            Ok(Err(e)) => {
                return Err(EngineError::connection_failed(format!(
                    "Failed to connect to {}:{} - {}",
                    config.host, config.port, e
                )))
            }
            Err(_) => {
                return Err(EngineError::Timeout {
                    timeout_ms: limit.as_millis() as u64,
                })
            }
        };
        tcp.set_nodelay(true).ok();

        Client::connect(tib_config, tcp.compat_write())
            .await
            .map_err(|e| classify_connect_error(e.to_string()))
    }
}

impl Default for SqlServerDriver {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== Type Conversion ====================

fn convert_column_data(data: &ColumnData<'_>) -> Value {
    match data {
        ColumnData::Bit(Some(b)) => Value::Bool(*b),
        ColumnData::U8(Some(v)) => Value::Int(*v as i64),
        ColumnData::I16(Some(v)) => Value::Int(*v as i64),
        ColumnData::I32(Some(v)) => Value::Int(*v as i64),
        ColumnData::I64(Some(v)) => Value::Int(*v),
        ColumnData::F32(Some(v)) => Value::Float(*v as f64),
        ColumnData::F64(Some(v)) => Value::Float(*v),
        ColumnData::Numeric(Some(n)) => Value::Text(n.to_string()),
        ColumnData::String(Some(s)) => Value::Text(s.to_string()),
        ColumnData::Guid(Some(g)) => Value::Text(g.to_string()),
        _ => Value::Null,
    }
}

fn convert_row(row: &tiberius::Row) -> QRow {
    let values = row
        .cells()
        .enumerate()
        .map(|(i, (_col, data))| match data {
            ColumnData::DateTime(Some(_))
            | ColumnData::SmallDateTime(Some(_))
            | ColumnData::DateTime2(Some(_)) => row
                .try_get::<chrono::NaiveDateTime, _>(i)
                .ok()
                .flatten()
                .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
                .unwrap_or(Value::Null),
            ColumnData::Date(Some(_)) => row
                .try_get::<chrono::NaiveDate, _>(i)
                .ok()
                .flatten()
                .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null),
            _ => convert_column_data(data),
        })
        .collect();
    QRow { values }
}

fn get_column_info(columns: &[tiberius::Column]) -> Vec<ColumnInfo> {
    columns
        .iter()
        .map(|col| ColumnInfo {
            name: col.name().to_string(),
            data_type: format!("{:?}", col.column_type()),
        })
        .collect()
}

fn classify_connect_error(msg: String) -> EngineError {
    if msg.contains("Login failed") {
        EngineError::auth_failed(msg)
    } else {
        EngineError::connection_failed(msg)
    }
}

fn classify_error(msg: String) -> EngineError {
    let lower = msg.to_lowercase();
    if lower.contains("incorrect syntax") || lower.contains("syntax error") {
        EngineError::syntax_error(msg)
    } else {
        EngineError::execution_error(msg)
    }
}

// ==================== DataEngine Implementation ====================

#[async_trait]
impl DataEngine for SqlServerDriver {
    fn driver_id(&self) -> &'static str {
        "sqlserver"
    }

    fn driver_name(&self) -> &'static str {
        "SQL Server"
    }

    async fn test_connection(&self, config: &ConnectionConfig) -> EngineResult<()> {
        let mut client = Self::connect_raw(config).await?;

        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| EngineError::execution_error(e.to_string()))?
            .into_results()
            .await
            .map_err(|e| EngineError::execution_error(e.to_string()))?;

        Ok(())
    }

    async fn connect(&self, config: &ConnectionConfig) -> EngineResult<SessionId> {
        let client = Self::connect_raw(config).await?;

        let session_id = SessionId::new();
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id, Arc::new(Mutex::new(client)));

        debug!(session = %session_id, "sql server session opened");
        Ok(session_id)
    }

    async fn disconnect(&self, session: SessionId) -> EngineResult<()> {
        let client = {
            let mut sessions = self.sessions.write().await;
            sessions
                .remove(&session)
                .ok_or_else(|| EngineError::session_not_found(session.to_string()))?
        };

        // Only the map held the client; try_unwrap fails if a query is mid-flight
        if let Ok(client) = Arc::try_unwrap(client) {
            if let Err(e) = client.into_inner().close().await {
                debug!(error = %e, "sql server close failed");
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        session: SessionId,
        query: &str,
        params: &[Value],
    ) -> EngineResult<QueryResult> {
        let client = self.get_session(session).await?;
        let mut client = client.lock().await;
        let start = Instant::now();

        let json_params: Vec<String> = params
            .iter()
            .map(|v| match v {
                Value::Json(j) => j.to_string(),
                _ => String::new(),
            })
            .collect();
        let bound: Vec<&dyn ToSql> = params
            .iter()
            .zip(json_params.iter())
            .map(|(value, json)| match value {
                Value::Null => &NULL_PARAM as &dyn ToSql,
                Value::Bool(b) => b as &dyn ToSql,
                Value::Int(i) => i as &dyn ToSql,
                Value::Float(f) => f as &dyn ToSql,
                Value::Text(s) => s as &dyn ToSql,
                Value::Json(_) => json as &dyn ToSql,
            })
            .collect();

        let result_set = client
            .query(query, &bound)
            .await
            .map_err(|e| classify_error(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| classify_error(e.to_string()))?;

        let columns = result_set
            .first()
            .map(|first| get_column_info(first.columns()))
            .unwrap_or_default();
        let rows = result_set.iter().map(convert_row).collect();

        Ok(QueryResult {
            columns,
            rows,
            affected_rows: None,
            execution_time_ms: start.elapsed().as_micros() as f64 / 1000.0,
        })
    }

    async fn execute_in_transaction(&self, session: SessionId, query: &str) -> EngineResult<()> {
        let client = self.get_session(session).await?;
        let mut client = client.lock().await;

        client
            .simple_query("BEGIN TRANSACTION")
            .await
            .map_err(|e| EngineError::transaction_error(e.to_string()))?
            .into_results()
            .await
            .map_err(|e| EngineError::transaction_error(e.to_string()))?;

        let outcome = match client.simple_query(query).await {
            Ok(stream) => stream.into_results().await.map(|_| ()),
            Err(e) => Err(e),
        };

        let finish = if outcome.is_ok() {
            "COMMIT TRANSACTION"
        } else {
            "ROLLBACK TRANSACTION"
        };
        let finished = match client.simple_query(finish).await {
            Ok(stream) => stream.into_results().await.map(|_| ()),
            Err(e) => Err(e),
        };

        outcome.map_err(|e| classify_error(e.to_string()))?;
        finished.map_err(|e| EngineError::transaction_error(e.to_string()))
    }
}

// ==================== Tests ====================
