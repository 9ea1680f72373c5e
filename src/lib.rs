// SPDX-License-Identifier: Apache-2.0

//! fedschema - provision and validate federated external schemas in Amazon Redshift

pub mod cli;
pub mod config;
pub mod console;
pub mod engine;
pub mod observability;
pub mod provision;
pub mod report;
pub mod secrets;

use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use cli::{CliApp, CliCommand};
use console::{Console, OutputFormat};
use engine::error::{EngineError, EngineResult};
use engine::{sql_generator, DriverRegistry};
use provision::Provisioner;
use report::ExitStatus;
use secrets::{
    AwsSecretsManagerProvider, DatabaseCredentials, KeyringProvider, SecretBackend,
    SecretProvider,
};

/// Environment variable naming an explicit dotenv file.
pub const ENV_FILE_VAR: &str = "FEDSCHEMA_ENV_FILE";

/// Loads `FEDSCHEMA_ENV_FILE` if set, otherwise `.env` when present.
fn load_env_file() -> Result<Option<PathBuf>, String> {
    match std::env::var_os(ENV_FILE_VAR) {
        Some(path) => {
            let path = PathBuf::from(path);
            dotenvy::from_path(&path)
                .map(|_| Some(path.clone()))
                .map_err(|e| format!("failed to load {}: {}", path.display(), e))
        }
        None => Ok(dotenvy::dotenv().ok()),
    }
}

/// Entry point of the `fedschema` binary.
pub fn run() -> ExitCode {
    if let Err(message) = load_env_file() {
        eprintln!("{}", message);
        return ExitCode::from(ExitStatus::InvalidConfig.code());
    }

    let app = CliApp::parse();
    observability::init_tracing(&app.logging.settings());

    let color = app.format == OutputFormat::Text && std::io::stdout().is_terminal();
    let console = Console::stdout(app.format, color);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            return ExitCode::from(ExitStatus::Failed.code());
        }
    };

    let code = runtime.block_on(execute(&app, console));
    ExitCode::from(code)
}

async fn secret_provider(
    backend: SecretBackend,
    profile: Option<&str>,
    region: &str,
) -> Arc<dyn SecretProvider> {
    match backend {
        SecretBackend::Aws => Arc::new(AwsSecretsManagerProvider::from_profile(profile, region).await),
        SecretBackend::Keyring => Arc::new(KeyringProvider::new()),
    }
}

/// Runs the selected subcommand and returns the process exit code.
pub async fn execute(app: &CliApp, console: Console) -> u8 {
    let command = app.selected_command();

    if let CliCommand::KeyringSet { secret_id } = &command {
        let mut payload = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut payload) {
            eprintln!("Failed to read secret from stdin: {}", e);
            return ExitStatus::Failed.code();
        }
        return match store_in_keyring(&KeyringProvider::new(), secret_id, &payload) {
            Ok(()) => {
                console.ok(format!("Stored secret '{}' in the OS keyring", secret_id));
                ExitStatus::Success.code()
            }
            Err(e) => report_error(&console, e),
        };
    }

    let config = match app.federation.resolve() {
        Ok(config) => config,
        Err(e) => return report_error(&console, e),
    };

    match command.run_command() {
        Some(run) => {
            let secrets = secret_provider(
                app.secret_backend,
                config.aws_profile.as_deref(),
                &config.aws_region,
            )
            .await;
            let registry = Arc::new(DriverRegistry::with_default_drivers());
            let provisioner = Provisioner::new(config, secrets, registry, console);
            provisioner.run(&run).await.exit_status.code()
        }
        None => match print_document(&command, &config, &console) {
            Ok(()) => ExitStatus::Success.code(),
            Err(e) => report_error(&console, e),
        },
    }
}

/// Handles the commands that only print something derived from the config.
fn print_document(
    command: &CliCommand,
    config: &config::FederationConfig,
    console: &Console,
) -> EngineResult<()> {
    config.validate()?;
    match command {
        CliCommand::Sql => {
            console.document(sql_generator::render_plan(config).join("\n\n"));
        }
        CliCommand::Config => {
            let json = serde_json::to_string_pretty(config)
                .map_err(|e| EngineError::internal(format!("failed to serialize config: {}", e)))?;
            console.document(json);
        }
        _ => return Err(EngineError::internal("not a document command")),
    }
    Ok(())
}

/// Checks `payload` parses as database credentials, then stores it.
pub fn store_in_keyring(
    keyring: &KeyringProvider,
    secret_id: &str,
    payload: &str,
) -> EngineResult<()> {
    if secret_id.trim().is_empty() {
        return Err(EngineError::validation("secret id must not be empty"));
    }
    let payload = payload.trim();
    DatabaseCredentials::from_secret_json(secret_id, payload)?;
    keyring.store(secret_id, payload)?;
    info!(secret_id, "stored secret in keyring");
    Ok(())
}

fn report_error(console: &Console, e: EngineError) -> u8 {
    error!(error = %e, "command failed");
    if console.format() == OutputFormat::Json {
        let body = serde_json::json!({ "error": e.to_string(), "exit_code": e.exit_code() });
        console.document(body.to_string());
    } else {
        eprintln!("Error: {}", e);
    }
    e.exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;

    #[test]
    fn test_keyring_set_rejects_invalid_payload_before_storing() {
        let keyring = KeyringProvider::with_service("fedschema-test-unused");
        let err = store_in_keyring(&keyring, "arn:aws:secretsmanager:x", "not json").unwrap_err();
        assert!(matches!(err, EngineError::SecretError { .. }));

        let err = store_in_keyring(&keyring, "  ", r#"{"username":"a","password":"b"}"#).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_sql_document_lists_statements() {
        let (console, buffer) = Console::buffered(OutputFormat::Json);
        print_document(&CliCommand::Sql, &sample_config(), &console).unwrap();
        let out = buffer.contents();
        assert!(out.starts_with("CREATE EXTERNAL SCHEMA IF NOT EXISTS raptor_external"));
        assert!(out.contains("svv_external_tables"));
    }

    #[test]
    fn test_config_document_is_json() {
        let (console, buffer) = Console::buffered(OutputFormat::Text);
        print_document(&CliCommand::Config, &sample_config(), &console).unwrap();
        let json: serde_json::Value = serde_json::from_str(&buffer.contents()).unwrap();
        assert_eq!(json["source"]["database"], "Raptor");
    }

    #[test]
    fn test_invalid_config_is_not_printed() {
        let mut config = sample_config();
        config.external_schema = "bad name".to_string();
        let (console, buffer) = Console::buffered(OutputFormat::Text);
        let err = print_document(&CliCommand::Sql, &config, &console).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(buffer.contents().is_empty());
    }
}
