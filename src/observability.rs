// SPDX-License-Identifier: Apache-2.0

//! Logging and observability helpers.
//!
//! Human-readable events go to stderr so stdout stays reserved for the run
//! report. When a log directory is configured, JSON events are also written to
//! a daily rolling file there.

pub mod sensitive;

pub use sensitive::Sensitive;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV_VAR: &str = "FEDSCHEMA_LOG";
const LOG_FILE_PREFIX: &str = "fedschema.log";
const LOG_RETENTION_DAYS: u64 = 14;
const DEFAULT_LEVEL: &str = "warn";

/// Where and how much to log.
#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    /// Explicit filter directive (`info`, `fedschema=debug,sqlx=warn`, ...).
    /// Overrides `FEDSCHEMA_LOG` when set.
    pub level: Option<String>,
    /// Directory for JSON log files; no file logging when unset.
    pub log_dir: Option<PathBuf>,
}

/// `~/.local/share/fedschema/logs` or the platform equivalent.
pub fn default_log_dir() -> PathBuf {
    let mut path = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    path.push("fedschema");
    path.push("logs");
    path
}

fn build_filter(level: Option<&str>) -> EnvFilter {
    match level {
        Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|e| {
            eprintln!("Invalid log filter '{}': {}", directive, e);
            EnvFilter::new(DEFAULT_LEVEL)
        }),
        None => EnvFilter::try_from_env(LOG_ENV_VAR)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL)),
    }
}

pub fn init_tracing(settings: &LogSettings) {
    let env_filter = build_filter(settings.level.as_deref());

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let file_layer = settings.log_dir.as_ref().and_then(|log_dir| {
        if let Err(e) = fs::create_dir_all(log_dir) {
            eprintln!("Failed to create log directory {}: {}", log_dir.display(), e);
            return None;
        }
        if let Err(e) = cleanup_old_logs(log_dir, LOG_RETENTION_DAYS) {
            eprintln!("Failed to clean up old logs: {}", e);
        }

        let file_appender: RollingFileAppender =
            tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
        Some(
            fmt::layer()
                .json()
                .with_writer(file_appender)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_current_span(true)
                .with_span_list(true)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE),
        )
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            format!("PANIC: {}", s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            format!("PANIC: {}", s)
        } else {
            "PANIC: unknown cause".to_string()
        };

        tracing::error!(target: "panic", location = %location, message = %msg, "fedschema panicked");
        previous_hook(panic_info);
    }));

    if let Some(dir) = &settings.log_dir {
        tracing::debug!("File logging enabled. Logs directory: {:?}", dir);
    }
}

/// Removes rolled log files older than `retention_days`. Returns how many
/// files were deleted.
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u64) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let retention = Duration::from_secs(retention_days * 24 * 60 * 60);
    let mut removed = 0;

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();

        // Rolled files are named `fedschema.log.YYYY-MM-DD`
        let is_ours = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(LOG_FILE_PREFIX))
            .unwrap_or(false);
        if !is_ours || !path.is_file() {
            continue;
        }

        let age = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());

        if matches!(age, Some(age) if age > retention) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Failed to remove old log file {:?}: {}", path, e),
            }
        }
    }
    Ok(removed)
}
