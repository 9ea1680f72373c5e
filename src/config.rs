// SPDX-License-Identifier: Apache-2.0

//! Run configuration
//!
//! Resolved from CLI flags and environment variables (see `cli`), then
//! validated once before anything touches the network. Only ARNs and
//! endpoints live here; secret values are fetched at run time.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::engine::error::{EngineError, EngineResult};

pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_WAREHOUSE_PORT: u16 = 5439;
pub const DEFAULT_WAREHOUSE_DATABASE: &str = "dev";
pub const DEFAULT_SOURCE_PORT: u16 = 1433;
pub const DEFAULT_REMOTE_SCHEMA: &str = "dbo";
pub const DEFAULT_EXTERNAL_SCHEMA: &str = "raptor_external";
pub const DEFAULT_TARGET_TABLES: &[&str] = &["DimLocation", "DimDate"];
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;
pub const MAX_CONNECT_TIMEOUT_SECS: u64 = 3600;

/// Redshift limits identifiers to 127 bytes.
const MAX_IDENTIFIER_LEN: usize = 127;

/// Environment classification for the target warehouse
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

/// Engine of the remote database the external schema federates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceEngine {
    #[default]
    Sqlserver,
    Postgres,
    Mysql,
}

impl SourceEngine {
    /// Keyword used in `CREATE EXTERNAL SCHEMA ... FROM <keyword>`.
    pub fn from_keyword(&self) -> &'static str {
        match self {
            Self::Sqlserver => "SQLSERVER",
            Self::Postgres => "POSTGRES",
            Self::Mysql => "MYSQL",
        }
    }

    /// MySQL has no schema level below the database.
    pub fn has_schema_clause(&self) -> bool {
        !matches!(self, Self::Mysql)
    }

    /// Driver id for a direct connection, when one is available.
    pub fn driver_id(&self) -> Option<&'static str> {
        match self {
            Self::Sqlserver => Some("sqlserver"),
            Self::Postgres | Self::Mysql => None,
        }
    }
}

/// Redshift endpoint and the identities provisioning runs under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    /// Secret holding the admin `username` / `password`.
    pub admin_secret_arn: String,
    /// Role the warehouse assumes to read the source secret.
    pub iam_role_arn: String,
    pub ssl: bool,
    pub connect_timeout_secs: u64,
}

/// The remote database behind the external schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub engine: SourceEngine,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub schema: String,
    /// Secret the warehouse uses to log into the source.
    pub secret_arn: String,
    /// Require TLS on direct source connections (preflight only).
    pub ssl: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    pub aws_profile: Option<String>,
    pub aws_region: String,
    pub environment: Environment,
    pub warehouse: WarehouseConfig,
    pub source: SourceConfig,
    pub external_schema: String,
    pub target_tables: Vec<String>,
}

fn identifier_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").ok())
        .as_ref()
}

pub fn is_plain_identifier(name: &str) -> bool {
    name.len() <= MAX_IDENTIFIER_LEN && identifier_re().is_some_and(|re| re.is_match(name))
}

fn check_identifier(field: &str, value: &str) -> EngineResult<()> {
    if is_plain_identifier(value) {
        Ok(())
    } else {
        Err(EngineError::validation(format!(
            "{field} must be a plain identifier (letters, digits, _ or $, at most {MAX_IDENTIFIER_LEN} bytes), got '{value}'"
        )))
    }
}

fn check_host(field: &str, value: &str) -> EngineResult<()> {
    if value.is_empty() {
        return Err(EngineError::validation(format!("{field} is required")));
    }
    if value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '\\' | ';'))
    {
        return Err(EngineError::validation(format!(
            "{field} contains characters not allowed in a host name: '{value}'"
        )));
    }
    Ok(())
}

fn check_arn(field: &str, value: &str, prefix: &str) -> EngineResult<()> {
    if !value.starts_with(prefix) {
        return Err(EngineError::validation(format!(
            "{field} must start with '{prefix}', got '{value}'"
        )));
    }
    if value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '\\'))
    {
        return Err(EngineError::validation(format!(
            "{field} contains invalid characters: '{value}'"
        )));
    }
    Ok(())
}

fn check_port(field: &str, value: u16) -> EngineResult<()> {
    if value == 0 {
        return Err(EngineError::validation(format!("{field} must be non-zero")));
    }
    Ok(())
}

impl FederationConfig {
    /// Validates everything that ends up interpolated into SQL or used to
    /// reach a remote endpoint.
    pub fn validate(&self) -> EngineResult<()> {
        if self.aws_region.trim().is_empty() {
            return Err(EngineError::validation("AWS region is required"));
        }

        check_host("warehouse host", &self.warehouse.host)?;
        check_port("warehouse port", self.warehouse.port)?;
        check_identifier("warehouse database", &self.warehouse.database)?;
        check_arn(
            "warehouse admin secret ARN",
            &self.warehouse.admin_secret_arn,
            "arn:aws:secretsmanager:",
        )?;
        check_arn("IAM role ARN", &self.warehouse.iam_role_arn, "arn:aws:iam::")?;
        if !(1..=MAX_CONNECT_TIMEOUT_SECS).contains(&self.warehouse.connect_timeout_secs) {
            return Err(EngineError::validation(format!(
                "connect timeout must be between 1 and {MAX_CONNECT_TIMEOUT_SECS} seconds, got {}",
                self.warehouse.connect_timeout_secs
            )));
        }

        check_host("source host", &self.source.host)?;
        check_port("source port", self.source.port)?;
        check_identifier("source database", &self.source.database)?;
        if self.source.engine.has_schema_clause() {
            check_identifier("source schema", &self.source.schema)?;
        }
        check_arn(
            "source secret ARN",
            &self.source.secret_arn,
            "arn:aws:secretsmanager:",
        )?;

        check_identifier("external schema", &self.external_schema)?;

        let mut seen = HashSet::new();
        for table in &self.target_tables {
            check_identifier("target table", table)?;
            if !seen.insert(table.to_lowercase()) {
                return Err(EngineError::validation(format!(
                    "target table '{table}' is listed more than once"
                )));
            }
        }

        Ok(())
    }

    /// `host:port/database` of the federated source, as shown to operators.
    pub fn source_display(&self) -> String {
        format!(
            "{}:{}/{}",
            self.source.host, self.source.port, self.source.database
        )
    }

    pub fn warehouse_display(&self) -> String {
        format!("{}:{}", self.warehouse.host, self.warehouse.port)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_config() -> FederationConfig {
        FederationConfig {
            aws_profile: Some("data_prod".to_string()),
            aws_region: DEFAULT_REGION.to_string(),
            environment: Environment::Development,
            warehouse: WarehouseConfig {
                host: "fed-wg.123456789012.us-west-2.redshift-serverless.amazonaws.com"
                    .to_string(),
                port: DEFAULT_WAREHOUSE_PORT,
                database: DEFAULT_WAREHOUSE_DATABASE.to_string(),
                admin_secret_arn:
                    "arn:aws:secretsmanager:us-west-2:123456789012:secret:redshift-admin-AbCdEf"
                        .to_string(),
                iam_role_arn: "arn:aws:iam::123456789012:role/redshift-fed-role".to_string(),
                ssl: true,
                connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
            source: SourceConfig {
                engine: SourceEngine::Sqlserver,
                host: "mssql.corp.example.com".to_string(),
                port: 4070,
                database: "Raptor".to_string(),
                schema: DEFAULT_REMOTE_SCHEMA.to_string(),
                secret_arn: "arn:aws:secretsmanager:us-west-2:123456789012:secret:mssql-KfZGux"
                    .to_string(),
                ssl: true,
            },
            external_schema: DEFAULT_EXTERNAL_SCHEMA.to_string(),
            target_tables: DEFAULT_TARGET_TABLES.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_sample_config_is_valid() {
        sample_config().validate().unwrap();
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_plain_identifier("raptor_external"));
        assert!(is_plain_identifier("DimDate"));
        assert!(is_plain_identifier("_tmp$1"));
        assert!(!is_plain_identifier("1table"));
        assert!(!is_plain_identifier("raptor external"));
        assert!(!is_plain_identifier("x; DROP SCHEMA y"));
        assert!(!is_plain_identifier(""));
        assert!(!is_plain_identifier(&"a".repeat(128)));
    }

    #[test]
    fn test_rejects_injection_in_schema_name() {
        let mut config = sample_config();
        config.external_schema = "raptor'; DROP SCHEMA public; --".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, EngineError::ValidationError { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_rejects_bad_arns() {
        let mut config = sample_config();
        config.warehouse.iam_role_arn = "role/redshift".to_string();
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.source.secret_arn = "arn:aws:secretsmanager:us-west-2:1:secret:x'y".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_tables_case_insensitively() {
        let mut config = sample_config();
        config.target_tables = vec!["DimDate".to_string(), "dimdate".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_rejects_zero_port_and_bad_host() {
        let mut config = sample_config();
        config.source.port = 0;
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.source.host = "host name".to_string();
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.warehouse.host = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connect_timeout_bounds() {
        let mut config = sample_config();
        config.warehouse.connect_timeout_secs = 0;
        assert_eq!(config.validate().unwrap_err().exit_code(), 2);

        config.warehouse.connect_timeout_secs = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("connect timeout"));

        config.warehouse.connect_timeout_secs = MAX_CONNECT_TIMEOUT_SECS;
        config.validate().unwrap();
    }

    #[test]
    fn test_mysql_source_ignores_schema() {
        let mut config = sample_config();
        config.source.engine = SourceEngine::Mysql;
        config.source.schema = String::new();
        config.validate().unwrap();
        assert!(!SourceEngine::Mysql.has_schema_clause());
        assert_eq!(SourceEngine::Postgres.from_keyword(), "POSTGRES");
    }

    #[test]
    fn test_display_helpers() {
        let config = sample_config();
        assert_eq!(config.source_display(), "mssql.corp.example.com:4070/Raptor");
        assert_eq!(
            config.warehouse_display(),
            "fed-wg.123456789012.us-west-2.redshift-serverless.amazonaws.com:5439"
        );
    }

    #[test]
    fn test_config_json_has_no_secret_values() {
        let json = serde_json::to_value(sample_config()).unwrap();
        assert_eq!(json["source"]["engine"], "sqlserver");
        assert_eq!(json["environment"], "development");
        assert_eq!(json["external_schema"], "raptor_external");
    }
}
