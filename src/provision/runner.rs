// SPDX-License-Identifier: Apache-2.0

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::config::{Environment, FederationConfig};
use crate::console::Console;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::sql_generator;
use crate::engine::types::{ConnectionConfig, SessionId, Value};
use crate::engine::{DriverRegistry, SessionManager};
use crate::report::{ExternalSchemaInfo, ProvisionReport, SmokeResult, StepStatus, TableSample};
use crate::secrets::{fetch_credentials, SecretProvider};

use super::{Command, ProvisionOptions, SmokeOptions};

const WAREHOUSE_DRIVER: &str = "redshift";

/// Runs provisioning commands against one configured federation.
pub struct Provisioner {
    config: FederationConfig,
    secrets: Arc<dyn SecretProvider>,
    sessions: SessionManager,
    console: Console,
}

/// Awaits `fut` and records it as step `name` in the report.
async fn timed<T, F>(report: &mut ProvisionReport, name: &str, fut: F) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    let start = Instant::now();
    let result = fut.await;
    let duration_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => report.record(name, StepStatus::Ok, None, duration_ms),
        Err(e) => report.record(name, StepStatus::Failed, Some(e.to_string()), duration_ms),
    }
    result
}

impl Provisioner {
    pub fn new(
        config: FederationConfig,
        secrets: Arc<dyn SecretProvider>,
        registry: Arc<DriverRegistry>,
        console: Console,
    ) -> Self {
        Self {
            config,
            secrets,
            sessions: SessionManager::new(registry),
            console,
        }
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    /// Executes `command`, always closing every connection it opened.
    #[instrument(skip(self, command), fields(command = command.name(), schema = %self.config.external_schema))]
    pub async fn run(&self, command: &Command) -> ProvisionReport {
        let mut report =
            ProvisionReport::new(command.name(), &self.config.external_schema, command.is_dry_run());

        let outcome = match self.config.validate() {
            Ok(()) => self.dispatch(command, &mut report).await,
            Err(e) => {
                self.console.fail(e.to_string());
                Err(e)
            }
        };

        self.sessions.disconnect_all().await;

        let fatal = outcome.err().map(|e| {
            warn!(error = %e, "run stopped");
            (e.to_string(), e.exit_code())
        });
        report.finish(fatal, command.is_strict());
        info!(status = ?report.exit_status, steps = report.steps.len(), "run finished");

        self.console.finish(&report);
        report
    }

    async fn dispatch(&self, command: &Command, report: &mut ProvisionReport) -> EngineResult<()> {
        match command {
            Command::Provision(opts) => self.provision(opts, report).await,
            Command::Verify(smoke) => self.verify(smoke, report).await,
            Command::Teardown { confirmed } => self.teardown(*confirmed, report).await,
        }
    }

    async fn provision(&self, opts: &ProvisionOptions, report: &mut ProvisionReport) -> EngineResult<()> {
        let title = format!(
            "Creating External Schema for {} Federation",
            self.config.source.engine.from_keyword()
        );
        self.console.banner(&title, &self.config);

        if opts.dry_run {
            report.statements = sql_generator::render_plan(&self.config);
            self.console
                .line("Dry run: the following statements would be executed\n");
            for statement in &report.statements {
                self.console.line(format!("{}\n", statement));
            }
            return Ok(());
        }

        if opts.preflight_source {
            self.preflight_source(report).await?;
        }

        let session = self.connect_warehouse(report).await?;
        self.create_external_schema(session, report).await?;
        self.verify_external_schema(session, report).await?;
        let tables = self.list_external_tables(session, report).await;
        self.smoke_test(session, &tables, &opts.smoke, report).await;

        self.console
            .footer("External schema setup complete!", &self.config);
        Ok(())
    }

    async fn verify(&self, smoke: &SmokeOptions, report: &mut ProvisionReport) -> EngineResult<()> {
        self.console
            .banner("Verifying External Schema Federation", &self.config);

        let session = self.connect_warehouse(report).await?;
        self.verify_external_schema(session, report).await?;
        let tables = self.list_external_tables(session, report).await;
        self.smoke_test(session, &tables, smoke, report).await;

        self.console
            .footer("External schema verification complete!", &self.config);
        Ok(())
    }

    async fn teardown(&self, confirmed: bool, report: &mut ProvisionReport) -> EngineResult<()> {
        self.console
            .banner("Dropping External Schema Federation", &self.config);

        if self.config.environment == Environment::Production && !confirmed {
            let err = EngineError::validation(format!(
                "refusing to drop external schema '{}' in production without --yes",
                self.config.external_schema
            ));
            self.console.fail(err.to_string());
            report.record("drop_external_schema", StepStatus::Skipped, Some(err.to_string()), 0);
            return Err(err);
        }

        let session = self.connect_warehouse(report).await?;

        self.console.section(format!(
            "Dropping external schema {}...",
            self.config.external_schema
        ));
        let sql = sql_generator::drop_external_schema(&self.config);
        match timed(
            report,
            "drop_external_schema",
            self.sessions.execute_in_transaction(session, &sql),
        )
        .await
        {
            Ok(()) => {
                self.console.ok(format!(
                    "External schema '{}' dropped",
                    self.config.external_schema
                ));
                Ok(())
            }
            Err(e) => {
                self.console
                    .line(format!("Error dropping external schema: {}", e));
                Err(e)
            }
        }
    }

    /// Retrieves the admin secret and opens the warehouse session.
    async fn connect_warehouse(&self, report: &mut ProvisionReport) -> EngineResult<SessionId> {
        let warehouse = &self.config.warehouse;
        self.console.line(format!(
            "Connecting to Redshift: {}:{}/{}",
            warehouse.host, warehouse.port, warehouse.database
        ));
        self.console
            .line(format!("Retrieving secret: {}", warehouse.admin_secret_arn));

        let creds = match timed(
            report,
            "retrieve_secret",
            fetch_credentials(self.secrets.as_ref(), &warehouse.admin_secret_arn),
        )
        .await
        {
            Ok(creds) => creds,
            Err(e) => {
                self.console.fail(e.to_string());
                return Err(e);
            }
        };

        let connection = ConnectionConfig {
            driver: WAREHOUSE_DRIVER.to_string(),
            host: warehouse.host.clone(),
            port: warehouse.port,
            username: creds.username,
            password: creds.password,
            database: Some(warehouse.database.clone()),
            ssl: warehouse.ssl,
            connect_timeout_secs: warehouse.connect_timeout_secs,
        };

        match timed(report, "connect", self.sessions.connect(&connection)).await {
            Ok(session) => {
                self.console.ok("Connected to Redshift");
                Ok(session)
            }
            Err(e) => {
                self.console
                    .line(format!("Error connecting to Redshift: {}", e));
                Err(e)
            }
        }
    }

    /// Logs into the source database with the source secret and lists the
    /// tables the external schema should expose.
    async fn preflight_source(&self, report: &mut ProvisionReport) -> EngineResult<()> {
        let source = &self.config.source;
        self.console.section(format!(
            "Checking source database {}...",
            self.config.source_display()
        ));

        let Some(driver_id) = source.engine.driver_id() else {
            let err = EngineError::validation(format!(
                "direct preflight is not supported for {} sources",
                source.engine.from_keyword()
            ));
            self.console.fail(err.to_string());
            report.record("preflight_source", StepStatus::Skipped, Some(err.to_string()), 0);
            return Err(err);
        };
        let Some(list_sql) = sql_generator::source_list_tables(source.engine) else {
            return Err(EngineError::internal("no source listing query for engine"));
        };

        self.console
            .line(format!("Retrieving secret: {}", source.secret_arn));

        let result = timed(report, "preflight_source", async {
            let creds = fetch_credentials(self.secrets.as_ref(), &source.secret_arn).await?;
            for mismatch in creds.endpoint_mismatches(&source.host, source.port, &source.database) {
                warn!(secret = %source.secret_arn, %mismatch, "source secret disagrees with configuration");
                self.console
                    .line(format!("Warning: source secret records {}", mismatch));
            }
            let connection = ConnectionConfig {
                driver: driver_id.to_string(),
                host: source.host.clone(),
                port: source.port,
                username: creds.username,
                password: creds.password,
                database: Some(source.database.clone()),
                ssl: source.ssl,
                connect_timeout_secs: self.config.warehouse.connect_timeout_secs,
            };

            let session = self.sessions.connect(&connection).await?;
            let listed = self
                .sessions
                .execute(session, list_sql, &[Value::from(source.schema.as_str())])
                .await;
            if let Err(e) = self.sessions.disconnect(session).await {
                warn!(error = %e, "failed to close source session");
            }
            listed
        })
        .await;

        match result {
            Ok(listed) => {
                report.source_tables = listed.column_strings(0);
                self.console.ok(format!(
                    "Source reachable: {} tables in {}.{}",
                    report.source_tables.len(),
                    source.database,
                    source.schema
                ));
                Ok(())
            }
            Err(e) => {
                self.console
                    .line(format!("Error checking source database: {}", e));
                Err(e)
            }
        }
    }

    async fn create_external_schema(
        &self,
        session: SessionId,
        report: &mut ProvisionReport,
    ) -> EngineResult<()> {
        self.console.section(format!(
            "Creating external schema for {}...",
            self.config.source.database
        ));

        let sql = sql_generator::create_external_schema(&self.config);
        match timed(
            report,
            "create_external_schema",
            self.sessions.execute_in_transaction(session, &sql),
        )
        .await
        {
            Ok(()) => {
                self.console.ok(format!(
                    "External schema '{}' created successfully",
                    self.config.external_schema
                ));
                Ok(())
            }
            Err(e) => {
                self.console
                    .line(format!("Error creating external schema: {}", e));
                Err(e)
            }
        }
    }

    async fn verify_external_schema(
        &self,
        session: SessionId,
        report: &mut ProvisionReport,
    ) -> EngineResult<()> {
        self.console.section("Verifying external schema...");

        let schema = self.config.external_schema.as_str();
        let start = Instant::now();
        let result = self
            .sessions
            .execute(
                session,
                sql_generator::VERIFY_EXTERNAL_SCHEMA_SQL,
                &[Value::from(schema)],
            )
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                self.console
                    .line(format!("Error verifying external schema: {}", e));
                report.record(
                    "verify_external_schema",
                    StepStatus::Failed,
                    Some(e.to_string()),
                    duration_ms,
                );
                return Err(e);
            }
        };

        if result.rows.is_empty() {
            self.console.fail("External schema not found");
            let err = EngineError::not_found(format!(
                "external schema '{}' is not listed in svv_external_schemas",
                schema
            ));
            report.record(
                "verify_external_schema",
                StepStatus::Failed,
                Some(err.to_string()),
                duration_ms,
            );
            return Err(err);
        }

        self.console.ok("External schema verified:");
        for row in &result.rows {
            let text = |idx: usize| {
                row.values
                    .get(idx)
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            };
            self.console
                .line(format!("  Schema: {}, Database: {}", text(0), text(1)));
        }

        let first = &result.rows[0].values;
        report.schema_info = Some(ExternalSchemaInfo {
            schema_name: first.first().map(|v| v.to_string()).unwrap_or_default(),
            database_name: first.get(1).map(|v| v.to_string()).unwrap_or_default(),
            options: first
                .get(2)
                .filter(|v| !matches!(v, Value::Null))
                .map(|v| v.to_string()),
        });
        report.record("verify_external_schema", StepStatus::Ok, None, duration_ms);
        Ok(())
    }

    /// Lists the tables visible through the external schema. A failure here
    /// is reported and treated as an empty listing.
    async fn list_external_tables(
        &self,
        session: SessionId,
        report: &mut ProvisionReport,
    ) -> Vec<String> {
        self.console.section("Listing tables in external schema...");

        let result = timed(
            report,
            "list_external_tables",
            self.sessions.execute(
                session,
                sql_generator::LIST_EXTERNAL_TABLES_SQL,
                &[Value::from(self.config.external_schema.as_str())],
            ),
        )
        .await;

        match result {
            Ok(result) => {
                let tables = result.column_strings(0);
                self.console.ok(format!("Found {} tables:", tables.len()));
                for table in &tables {
                    self.console.item(table);
                }
                report.external_tables = tables.clone();
                tables
            }
            Err(e) => {
                self.console
                    .line(format!("Error listing external tables: {}", e));
                Vec::new()
            }
        }
    }

    async fn smoke_test(
        &self,
        session: SessionId,
        tables: &[String],
        smoke: &SmokeOptions,
        report: &mut ProvisionReport,
    ) {
        if self.config.target_tables.is_empty() {
            return;
        }

        self.console.line(format!(
            "\nTesting target tables: {}",
            self.config.target_tables.join(", ")
        ));

        for target in &self.config.target_tables {
            let step = format!("smoke_test:{}", target);

            // Catalog names are usually folded to lower case
            let Some(actual) = tables.iter().find(|t| t.eq_ignore_ascii_case(target)) else {
                self.console
                    .fail(format!("Table {} not found in external schema", target));
                report.record(
                    step,
                    StepStatus::Failed,
                    Some("not found in external schema".to_string()),
                    0,
                );
                report.smoke_results.push(SmokeResult {
                    table: target.clone(),
                    found: false,
                    row_count: None,
                    error: None,
                });
                continue;
            };

            let schema = self.config.external_schema.as_str();
            self.console
                .section(format!("Testing query on {}.{}...", schema, actual));

            let sql = sql_generator::count_rows(schema, actual);
            let counted = timed(report, &step, async {
                sql_generator::ensure_read_only(&sql)?;
                self.sessions.execute(session, &sql, &[]).await
            })
            .await;

            let smoke_result = match counted {
                Ok(result) => {
                    let row_count = result.first_value().and_then(Value::as_i64);
                    self.console.ok(format!(
                        "Table {} has {} rows",
                        target,
                        row_count
                            .map(|n| n.to_string())
                            .unwrap_or_else(|| "an unknown number of".to_string())
                    ));
                    SmokeResult {
                        table: target.clone(),
                        found: true,
                        row_count,
                        error: None,
                    }
                }
                Err(e) => {
                    self.console
                        .fail(format!("Error querying table {}: {}", target, e));
                    SmokeResult {
                        table: target.clone(),
                        found: true,
                        row_count: None,
                        error: Some(e.to_string()),
                    }
                }
            };

            let passed = smoke_result.passed();
            report.smoke_results.push(smoke_result);

            if passed && smoke.sample_rows > 0 {
                self.sample_table(session, target, actual, smoke.sample_rows, report)
                    .await;
            }
        }
    }

    async fn sample_table(
        &self,
        session: SessionId,
        target: &str,
        actual: &str,
        limit: u32,
        report: &mut ProvisionReport,
    ) {
        let sql = sql_generator::sample_rows(&self.config.external_schema, actual, limit);
        let step = format!("sample:{}", target);

        let sampled = timed(report, &step, async {
            sql_generator::ensure_read_only(&sql)?;
            self.sessions.execute(session, &sql, &[]).await
        })
        .await;

        match sampled {
            Ok(result) => {
                let sample = TableSample {
                    table: target.to_string(),
                    columns: result.columns.iter().map(|c| c.name.clone()).collect(),
                    rows: result
                        .rows
                        .iter()
                        .map(|row| row.values.iter().map(|v| v.to_string()).collect())
                        .collect(),
                };
                self.console.sample(&sample);
                report.samples.push(sample);
            }
            Err(e) => {
                self.console
                    .fail(format!("Error sampling table {}: {}", target, e));
            }
        }
    }
}
