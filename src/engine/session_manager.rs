// SPDX-License-Identifier: Apache-2.0

//! Session Manager
//!
//! Owns every connection a run opens, so they can all be closed on the way
//! out regardless of which step failed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::{timeout, Duration};
use tracing::{instrument, warn};

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::traits::DataEngine;
use crate::engine::types::{ConnectionConfig, QueryResult, SessionId, Value};
use crate::engine::DriverRegistry;

/// An open session and the driver it belongs to
pub struct ActiveSession {
    pub driver: Arc<dyn DataEngine>,
    pub display_name: String,
}

pub struct SessionManager {
    registry: Arc<DriverRegistry>,
    sessions: RwLock<HashMap<SessionId, ActiveSession>>,
}

impl SessionManager {
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self {
            registry,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn driver_for(&self, config: &ConnectionConfig) -> EngineResult<Arc<dyn DataEngine>> {
        self.registry
            .get(&config.driver)
            .ok_or_else(|| EngineError::driver_not_found(&config.driver))
    }

    /// Establishes a new connection and returns its session ID
    #[instrument(
        skip(self, config),
        fields(driver = %config.driver, host = %config.host, port = config.port, database = ?config.database)
    )]
    pub async fn connect(&self, config: &ConnectionConfig) -> EngineResult<SessionId> {
        let driver = self.driver_for(config)?;
        let limit = Duration::from_secs(config.connect_timeout_secs.max(1));

        let session_id = match timeout(limit, driver.connect(config)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(EngineError::Timeout {
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })
            }
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(
            session_id,
            ActiveSession {
                driver,
                display_name: config.display_name(),
            },
        );

        Ok(session_id)
    }

    async fn driver_of(&self, session: SessionId) -> EngineResult<Arc<dyn DataEngine>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&session)
            .map(|s| Arc::clone(&s.driver))
            .ok_or_else(|| EngineError::session_not_found(session.to_string()))
    }

    pub async fn execute(
        &self,
        session: SessionId,
        query: &str,
        params: &[Value],
    ) -> EngineResult<QueryResult> {
        let driver = self.driver_of(session).await?;
        driver.execute(session, query, params).await
    }

    pub async fn execute_in_transaction(&self, session: SessionId, query: &str) -> EngineResult<()> {
        let driver = self.driver_of(session).await?;
        driver.execute_in_transaction(session, query).await
    }

    pub async fn disconnect(&self, session: SessionId) -> EngineResult<()> {
        let active = {
            let mut sessions = self.sessions.write().await;
            sessions
                .remove(&session)
                .ok_or_else(|| EngineError::session_not_found(session.to_string()))?
        };
        active.driver.disconnect(session).await
    }

    /// Closes every open session, logging (not returning) close failures.
    pub async fn disconnect_all(&self) {
        let drained: Vec<(SessionId, ActiveSession)> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().collect()
        };

        for (id, active) in drained {
            if let Err(e) = active.driver.disconnect(id).await {
                warn!(session = %id, name = %active.display_name, error = %e, "failed to close session");
            }
        }
    }

    /// Display names of the open sessions
    pub async fn list_sessions(&self) -> Vec<(SessionId, String)> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .map(|(id, s)| (*id, s.display_name.clone()))
            .collect()
    }
}
