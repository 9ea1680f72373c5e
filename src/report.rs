// SPDX-License-Identifier: Apache-2.0

//! Run report
//!
//! Everything a provisioning run did, step by step. Printed as JSON with
//! `--format json`; the text console renders the same facts as it goes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub name: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_ms: u64,
}

/// Row from `svv_external_schemas`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExternalSchemaInfo {
    pub schema_name: String,
    pub database_name: String,
    pub options: Option<String>,
}

/// Result of the row-count query against one target table
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SmokeResult {
    pub table: String,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SmokeResult {
    pub fn passed(&self) -> bool {
        self.found && self.error.is_none()
    }
}

/// First rows of a target table, rendered as text
#[derive(Debug, Clone, Serialize)]
pub struct TableSample {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Final status of a run, mapped to the process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    Success,
    Failed,
    InvalidConfig,
    SmokeFailures,
}

impl ExitStatus {
    pub fn code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failed => 1,
            Self::InvalidConfig => 2,
            Self::SmokeFailures => 3,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Success,
            2 => Self::InvalidConfig,
            3 => Self::SmokeFailures,
            _ => Self::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub run_id: Uuid,
    pub command: String,
    pub external_schema: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub steps: Vec<StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_info: Option<ExternalSchemaInfo>,
    pub external_tables: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_tables: Vec<String>,
    pub smoke_results: Vec<SmokeResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<TableSample>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub exit_status: ExitStatus,
}

impl ProvisionReport {
    pub fn new(command: &str, external_schema: &str, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            command: command.to_string(),
            external_schema: external_schema.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            steps: Vec::new(),
            schema_info: None,
            external_tables: Vec::new(),
            source_tables: Vec::new(),
            smoke_results: Vec::new(),
            samples: Vec::new(),
            statements: Vec::new(),
            error: None,
            exit_status: ExitStatus::Success,
        }
    }

    pub fn record(
        &mut self,
        name: impl Into<String>,
        status: StepStatus,
        message: Option<String>,
        duration_ms: u64,
    ) {
        self.steps.push(StepOutcome {
            name: name.into(),
            status,
            message,
            duration_ms,
        });
    }

    pub fn step(&self, name: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn smoke_failures(&self) -> usize {
        self.smoke_results.iter().filter(|r| !r.passed()).count()
    }

    /// Stamps the finish time and settles the exit status.
    ///
    /// A fatal error wins; smoke failures only count when `strict` is set.
    pub fn finish(&mut self, fatal: Option<(String, u8)>, strict: bool) {
        self.finished_at = Some(Utc::now());
        self.exit_status = match fatal {
            Some((message, code)) => {
                self.error = Some(message);
                ExitStatus::from_code(code)
            }
            None if strict && self.smoke_failures() > 0 => ExitStatus::SmokeFailures,
            None => ExitStatus::Success,
        };
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
