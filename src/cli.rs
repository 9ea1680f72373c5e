// SPDX-License-Identifier: Apache-2.0

//! Command line surface of the `fedschema` binary.
//!
//! Every connection setting can also come from the environment (or a
//! `.env` file), so the same invocation works in CI and on a laptop.

use std::path::PathBuf;

use clap::ArgAction;

use crate::config::{
    Environment, FederationConfig, SourceConfig, SourceEngine, WarehouseConfig,
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_EXTERNAL_SCHEMA, DEFAULT_REGION, DEFAULT_REMOTE_SCHEMA,
    DEFAULT_SOURCE_PORT, DEFAULT_TARGET_TABLES, DEFAULT_WAREHOUSE_DATABASE,
    DEFAULT_WAREHOUSE_PORT,
};
use crate::console::OutputFormat;
use crate::engine::error::{EngineError, EngineResult};
use crate::observability::{default_log_dir, LogSettings};
use crate::provision::{Command, ProvisionOptions, SmokeOptions};
use crate::secrets::SecretBackend;

/// Cli arguments related to logging
#[derive(clap::Args, Debug, Clone, Default)]
pub struct LoggingArgs {
    /// Increase log verbosity (multiple uses increase verbosity further)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Reduce log verbosity to show only errors (equivalent to --log error)
    #[arg(short, long, global = true)]
    pub quiet: bool,
    /// Set log filter directive (default is "warn", or FEDSCHEMA_LOG)
    #[arg(long = "log", global = true)]
    pub log_level: Option<String>,
    /// Also write JSON logs to this directory
    #[arg(long, env = "FEDSCHEMA_LOG_DIR", global = true)]
    pub log_dir: Option<PathBuf>,
    /// Write JSON logs to the default per-user log directory
    #[arg(long, global = true)]
    pub persist_logs: bool,
}

impl LoggingArgs {
    /// Resolves the filter in this order: `--log`, `-q`, `-v` count, then
    /// `FEDSCHEMA_LOG` (handled by the subscriber).
    pub fn settings(&self) -> LogSettings {
        let level = if let Some(level) = &self.log_level {
            Some(level.clone())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            match self.verbose {
                0 => None,
                1 => Some("info".to_string()),
                2 => Some("debug".to_string()),
                _ => Some("trace".to_string()),
            }
        };

        let log_dir = match &self.log_dir {
            Some(dir) => Some(dir.clone()),
            None if self.persist_logs => Some(default_log_dir()),
            None => None,
        };

        LogSettings { level, log_dir }
    }
}

/// Where the warehouse and the federated source live
#[derive(clap::Args, Debug, Clone, Default)]
pub struct FederationArgs {
    /// AWS profile used for Secrets Manager
    #[arg(long, env = "AWS_PROFILE", global = true)]
    pub profile: Option<String>,
    /// AWS region of the secrets
    #[arg(long, env = "AWS_REGION", global = true)]
    pub region: Option<String>,
    /// Environment the warehouse belongs to
    #[arg(long, value_enum, env = "FEDSCHEMA_ENVIRONMENT", global = true)]
    pub environment: Option<Environment>,

    /// Redshift endpoint host
    #[arg(long, env = "FEDSCHEMA_REDSHIFT_HOST", global = true)]
    pub redshift_host: Option<String>,
    #[arg(long, env = "FEDSCHEMA_REDSHIFT_PORT", global = true)]
    pub redshift_port: Option<u16>,
    #[arg(long, env = "FEDSCHEMA_REDSHIFT_DATABASE", global = true)]
    pub redshift_database: Option<String>,
    /// Secret ARN holding the Redshift admin username and password
    #[arg(long, env = "FEDSCHEMA_REDSHIFT_SECRET_ARN", global = true)]
    pub redshift_secret_arn: Option<String>,
    /// IAM role Redshift assumes to read the source secret
    #[arg(long, env = "FEDSCHEMA_IAM_ROLE_ARN", global = true)]
    pub iam_role_arn: Option<String>,
    /// Require TLS to Redshift
    #[arg(long, env = "FEDSCHEMA_REDSHIFT_SSL", action = ArgAction::Set, global = true)]
    pub redshift_ssl: Option<bool>,
    /// Connect timeout in seconds
    #[arg(long, env = "FEDSCHEMA_CONNECT_TIMEOUT", global = true)]
    pub connect_timeout: Option<u64>,

    /// Engine of the federated source database
    #[arg(long, value_enum, env = "FEDSCHEMA_SOURCE_ENGINE", global = true)]
    pub source_engine: Option<SourceEngine>,
    #[arg(long, env = "FEDSCHEMA_SOURCE_HOST", global = true)]
    pub source_host: Option<String>,
    #[arg(long, env = "FEDSCHEMA_SOURCE_PORT", global = true)]
    pub source_port: Option<u16>,
    #[arg(long, env = "FEDSCHEMA_SOURCE_DATABASE", global = true)]
    pub source_database: Option<String>,
    /// Schema inside the source database (ignored for MySQL)
    #[arg(long, env = "FEDSCHEMA_SOURCE_SCHEMA", global = true)]
    pub source_schema: Option<String>,
    /// Secret ARN Redshift uses to log into the source
    #[arg(long, env = "FEDSCHEMA_SOURCE_SECRET_ARN", global = true)]
    pub source_secret_arn: Option<String>,
    /// Require TLS on direct source connections
    #[arg(long, env = "FEDSCHEMA_SOURCE_SSL", action = ArgAction::Set, global = true)]
    pub source_ssl: Option<bool>,

    /// Name of the external schema to manage
    #[arg(long, env = "FEDSCHEMA_EXTERNAL_SCHEMA", global = true)]
    pub external_schema: Option<String>,
    /// Tables to smoke-test, comma separated; pass "" to skip smoke tests
    #[arg(long, env = "FEDSCHEMA_TARGET_TABLES", value_delimiter = ',', global = true)]
    pub target_tables: Option<Vec<String>>,
}

fn required(value: &Option<String>, flag: &str, env: &str) -> EngineResult<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(EngineError::validation(format!(
            "missing {flag} (or {env})"
        ))),
    }
}

impl FederationArgs {
    /// Builds the run configuration, applying defaults. Does not validate
    /// formats; see [`FederationConfig::validate`].
    pub fn resolve(&self) -> EngineResult<FederationConfig> {
        let warehouse = WarehouseConfig {
            host: required(&self.redshift_host, "--redshift-host", "FEDSCHEMA_REDSHIFT_HOST")?,
            port: self.redshift_port.unwrap_or(DEFAULT_WAREHOUSE_PORT),
            database: self
                .redshift_database
                .clone()
                .unwrap_or_else(|| DEFAULT_WAREHOUSE_DATABASE.to_string()),
            admin_secret_arn: required(
                &self.redshift_secret_arn,
                "--redshift-secret-arn",
                "FEDSCHEMA_REDSHIFT_SECRET_ARN",
            )?,
            iam_role_arn: required(&self.iam_role_arn, "--iam-role-arn", "FEDSCHEMA_IAM_ROLE_ARN")?,
            ssl: self.redshift_ssl.unwrap_or(true),
            connect_timeout_secs: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        let engine = self.source_engine.unwrap_or_default();
        let source = SourceConfig {
            engine,
            host: required(&self.source_host, "--source-host", "FEDSCHEMA_SOURCE_HOST")?,
            port: self.source_port.unwrap_or(DEFAULT_SOURCE_PORT),
            database: required(
                &self.source_database,
                "--source-database",
                "FEDSCHEMA_SOURCE_DATABASE",
            )?,
            schema: match &self.source_schema {
                Some(schema) => schema.clone(),
                None if engine.has_schema_clause() => DEFAULT_REMOTE_SCHEMA.to_string(),
                None => String::new(),
            },
            secret_arn: required(
                &self.source_secret_arn,
                "--source-secret-arn",
                "FEDSCHEMA_SOURCE_SECRET_ARN",
            )?,
            ssl: self.source_ssl.unwrap_or(true),
        };

        let target_tables = match &self.target_tables {
            Some(tables) => tables
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_TARGET_TABLES.iter().map(|t| t.to_string()).collect(),
        };

        Ok(FederationConfig {
            aws_profile: self.profile.clone().filter(|p| !p.trim().is_empty()),
            aws_region: self
                .region
                .clone()
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            environment: self.environment.unwrap_or_default(),
            warehouse,
            source,
            external_schema: self
                .external_schema
                .clone()
                .unwrap_or_else(|| DEFAULT_EXTERNAL_SCHEMA.to_string()),
            target_tables,
        })
    }
}

/// Cli arguments for commands that run smoke tests
#[derive(clap::Args, Debug, Clone, Copy, Default)]
pub struct SmokeArgs {
    /// Exit with status 3 when a target table is missing or cannot be queried
    #[arg(long)]
    pub strict: bool,
    /// Print the first N rows of every target table
    #[arg(long, default_value_t = 0)]
    pub sample_rows: u32,
}

impl From<SmokeArgs> for SmokeOptions {
    fn from(args: SmokeArgs) -> Self {
        SmokeOptions {
            strict: args.strict,
            sample_rows: args.sample_rows,
        }
    }
}

#[derive(clap::Args, Debug, Clone, Copy, Default)]
pub struct ProvisionArgs {
    /// Print the statements that would run and exit
    #[arg(long)]
    pub dry_run: bool,
    /// Connect to the source database first and list its tables
    #[arg(long)]
    pub preflight_source: bool,
    #[command(flatten)]
    pub smoke: SmokeArgs,
}

impl From<ProvisionArgs> for ProvisionOptions {
    fn from(args: ProvisionArgs) -> Self {
        ProvisionOptions {
            dry_run: args.dry_run,
            preflight_source: args.preflight_source,
            smoke: args.smoke.into(),
        }
    }
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Create the external schema, verify it and smoke-test the target tables (default)
    Provision(ProvisionArgs),
    /// Verify an existing external schema and smoke-test the target tables
    Verify(SmokeArgs),
    /// Drop the external schema
    Teardown {
        /// Confirm dropping in the production environment
        #[arg(long)]
        yes: bool,
    },
    /// Print the SQL a provision run would execute
    Sql,
    /// Print the resolved configuration as JSON
    Config,
    /// Store a secret JSON document read from stdin in the OS keyring
    ///
    /// On Linux the entry lives in the kernel session keyring and does not
    /// survive logout or reboot.
    KeyringSet {
        /// Secret id (usually the secret ARN) to store the document under
        secret_id: String,
    },
}

impl CliCommand {
    /// The provisioning command this maps to, for commands that touch the
    /// warehouse.
    pub fn run_command(&self) -> Option<Command> {
        match self {
            CliCommand::Provision(args) => Some(Command::Provision((*args).into())),
            CliCommand::Verify(args) => Some(Command::Verify((*args).into())),
            CliCommand::Teardown { yes } => Some(Command::Teardown { confirmed: *yes }),
            CliCommand::Sql | CliCommand::Config | CliCommand::KeyringSet { .. } => None,
        }
    }
}

/// Provision and validate a federated external schema in Amazon Redshift
#[derive(clap::Parser, Debug)]
#[command(author, version, about)]
pub struct CliApp {
    #[command(subcommand)]
    pub command: Option<CliCommand>,
    /// Output format
    #[arg(long, value_enum, default_value_t, env = "FEDSCHEMA_FORMAT", global = true)]
    pub format: OutputFormat,
    /// Where secrets are read from
    #[arg(long, value_enum, default_value_t, env = "FEDSCHEMA_SECRET_BACKEND", global = true)]
    pub secret_backend: SecretBackend,
    #[command(flatten)]
    pub logging: LoggingArgs,
    #[command(flatten)]
    pub federation: FederationArgs,
}

impl CliApp {
    /// The selected subcommand; `provision` when none is given.
    pub fn selected_command(&self) -> CliCommand {
        self.command
            .clone()
            .unwrap_or_else(|| CliCommand::Provision(ProvisionArgs::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const BASE: &[&str] = &[
        "fedschema",
        "--profile",
        "data_prod",
        "--region",
        "us-west-2",
        "--redshift-host",
        "fed-wg.example.com",
        "--redshift-secret-arn",
        "arn:aws:secretsmanager:us-west-2:123456789012:secret:redshift-admin-AbCdEf",
        "--iam-role-arn",
        "arn:aws:iam::123456789012:role/redshift-fed-role",
        "--source-host",
        "mssql.corp.example.com",
        "--source-port",
        "4070",
        "--source-database",
        "Raptor",
        "--source-secret-arn",
        "arn:aws:secretsmanager:us-west-2:123456789012:secret:mssql-KfZGux",
    ];

    fn parse(extra: &[&str]) -> CliApp {
        let args: Vec<&str> = BASE.iter().chain(extra.iter()).copied().collect();
        CliApp::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        <CliApp as CommandFactory>::command().debug_assert();
    }

    #[test]
    fn test_defaults_resolve_to_valid_config() {
        let app = parse(&[]);
        assert!(matches!(app.selected_command(), CliCommand::Provision(_)));

        let config = app.federation.resolve().unwrap();
        config.validate().unwrap();
        assert_eq!(config.aws_profile.as_deref(), Some("data_prod"));
        assert_eq!(config.source.port, 4070);
        assert_eq!(config.source.schema, "dbo");
        assert_eq!(config.external_schema, "raptor_external");
        assert_eq!(config.target_tables, vec!["DimLocation", "DimDate"]);
        assert!(config.warehouse.ssl);
    }

    #[test]
    fn test_subcommand_flags_after_global_options() {
        let app = parse(&["provision", "--dry-run", "--strict", "--sample-rows", "5"]);
        match app.selected_command().run_command() {
            Some(Command::Provision(opts)) => {
                assert!(opts.dry_run);
                assert!(!opts.preflight_source);
                assert!(opts.smoke.strict);
                assert_eq!(opts.smoke.sample_rows, 5);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let app = parse(&["teardown", "--yes", "--external-schema", "raptor_stage", "--format", "json"]);
        assert_eq!(app.format, OutputFormat::Json);
        assert!(matches!(
            app.selected_command().run_command(),
            Some(Command::Teardown { confirmed: true })
        ));
        let config = app.federation.resolve().unwrap();
        assert_eq!(config.external_schema, "raptor_stage");
    }

    #[test]
    fn test_target_tables_list() {
        let app = parse(&["--target-tables", "DimDate, FactSales"]);
        let config = app.federation.resolve().unwrap();
        assert_eq!(config.target_tables, vec!["DimDate", "FactSales"]);

        let app = parse(&["--target-tables", ""]);
        assert!(app.federation.resolve().unwrap().target_tables.is_empty());
    }

    #[test]
    fn test_missing_required_setting_is_validation_error() {
        let mut app = parse(&[]);
        app.federation.redshift_host = None;
        let err = app.federation.resolve().unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("--redshift-host"));
    }

    #[test]
    fn test_mysql_source_has_no_default_schema() {
        let app = parse(&["--source-engine", "mysql"]);
        let config = app.federation.resolve().unwrap();
        assert_eq!(config.source.engine, SourceEngine::Mysql);
        assert!(config.source.schema.is_empty());
    }

    #[test]
    fn test_logging_precedence() {
        let args = LoggingArgs {
            verbose: 2,
            ..Default::default()
        };
        assert_eq!(args.settings().level.as_deref(), Some("debug"));

        let args = LoggingArgs {
            verbose: 2,
            quiet: true,
            ..Default::default()
        };
        assert_eq!(args.settings().level.as_deref(), Some("error"));

        let args = LoggingArgs {
            log_level: Some("fedschema=trace".to_string()),
            quiet: true,
            ..Default::default()
        };
        assert_eq!(args.settings().level.as_deref(), Some("fedschema=trace"));
        assert!(args.settings().log_dir.is_none());

        let args = LoggingArgs {
            persist_logs: true,
            ..Default::default()
        };
        assert_eq!(args.settings().log_dir, Some(default_log_dir()));
    }

    #[test]
    fn test_keyring_set_takes_secret_id() {
        let app = CliApp::try_parse_from(["fedschema", "keyring-set", "arn:aws:secretsmanager:x"]).unwrap();
        match app.selected_command() {
            CliCommand::KeyringSet { secret_id } => assert_eq!(secret_id, "arn:aws:secretsmanager:x"),
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(app.selected_command().run_command().is_none());
    }

    #[test]
    fn test_keyring_set_help_mentions_session_lifetime() {
        use clap::CommandFactory;
        let cmd = <CliApp as CommandFactory>::command();
        let keyring_set = cmd.find_subcommand("keyring-set").unwrap();
        let help = keyring_set
            .get_long_about()
            .map(|text| text.to_string())
            .unwrap_or_default();
        assert!(help.contains("logout"), "help was: {help}");
    }
}
