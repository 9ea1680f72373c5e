// SPDX-License-Identifier: Apache-2.0

//! DataEngine trait definition
//!
//! The abstraction both the warehouse driver (Redshift) and the source
//! driver (SQL Server) implement. Provisioning code only talks to this trait,
//! which is also what the tests mock.

use async_trait::async_trait;

use crate::engine::error::EngineResult;
use crate::engine::types::{ConnectionConfig, QueryResult, SessionId, Value};

/// Core trait that all database drivers must implement
#[async_trait]
pub trait DataEngine: Send + Sync {
    /// Returns the unique identifier for this driver (e.g., "redshift", "sqlserver")
    fn driver_id(&self) -> &'static str;

    /// Returns a human-readable name for this driver
    fn driver_name(&self) -> &'static str;

    /// Tests the connection without keeping a session open
    async fn test_connection(&self, config: &ConnectionConfig) -> EngineResult<()>;

    /// Establishes a connection and returns a session identifier
    async fn connect(&self, config: &ConnectionConfig) -> EngineResult<SessionId>;

    /// Closes a session and releases associated resources
    async fn disconnect(&self, session: SessionId) -> EngineResult<()>;

    /// Executes a statement with positional parameters and returns its rows
    ///
    /// Parameters use the driver's native placeholder syntax
    /// (`$1` for Redshift, `@P1` for SQL Server).
    async fn execute(
        &self,
        session: SessionId,
        query: &str,
        params: &[Value],
    ) -> EngineResult<QueryResult>;

    /// Executes a single statement inside its own transaction
    ///
    /// Commits when the statement succeeds and rolls back otherwise.
    async fn execute_in_transaction(&self, session: SessionId, query: &str) -> EngineResult<()>;
}
