// SPDX-License-Identifier: Apache-2.0

//! Operator-facing output.
//!
//! In text mode, progress lines are printed as steps complete. In JSON mode
//! nothing is printed until the run ends, then the whole report is written
//! as one document.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use colored::Colorize;

use crate::config::FederationConfig;
use crate::report::{ProvisionReport, TableSample};

const RULE_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Output sink shared by the provisioning steps.
#[derive(Clone)]
pub struct Console {
    format: OutputFormat,
    color: bool,
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Console {
    pub fn stdout(format: OutputFormat, color: bool) -> Self {
        Self::with_writer(format, color, Box::new(io::stdout()))
    }

    pub fn with_writer(format: OutputFormat, color: bool, out: Box<dyn Write + Send>) -> Self {
        Self {
            format,
            color,
            out: Arc::new(Mutex::new(out)),
        }
    }

    /// Console writing into a shared buffer, for tests.
    pub fn buffered(format: OutputFormat) -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let console = Self::with_writer(format, false, Box::new(buffer.clone()));
        (console, buffer)
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn is_text(&self) -> bool {
        self.format == OutputFormat::Text
    }

    fn write_raw(&self, text: &str) {
        if let Ok(mut out) = self.out.lock() {
            // stdout closed under a pipe: nothing useful left to do
            let _ = writeln!(out, "{}", text);
            let _ = out.flush();
        }
    }

    /// Plain progress line (text mode only).
    pub fn line(&self, text: impl AsRef<str>) {
        if self.is_text() {
            self.write_raw(text.as_ref());
        }
    }

    /// Blank line followed by a step heading, e.g. "Verifying external schema...".
    pub fn section(&self, title: impl AsRef<str>) {
        self.line(format!("\n{}", title.as_ref()));
    }

    pub fn ok(&self, text: impl AsRef<str>) {
        let mark = if self.color {
            "✓".green().bold().to_string()
        } else {
            "✓".to_string()
        };
        self.line(format!("{} {}", mark, text.as_ref()));
    }

    pub fn fail(&self, text: impl AsRef<str>) {
        let mark = if self.color {
            "✗".red().bold().to_string()
        } else {
            "✗".to_string()
        };
        self.line(format!("{} {}", mark, text.as_ref()));
    }

    pub fn item(&self, text: impl AsRef<str>) {
        self.line(format!("  - {}", text.as_ref()));
    }

    pub fn rule(&self) {
        self.line("=".repeat(RULE_WIDTH));
    }

    pub fn banner(&self, title: &str, config: &FederationConfig) {
        self.rule();
        self.line(title);
        self.rule();
        self.line(format!(
            "AWS Profile: {}",
            config.aws_profile.as_deref().unwrap_or("(default)")
        ));
        self.line(format!("Environment: {}", config.environment.as_str()));
        self.line(format!("Redshift: {}", config.warehouse_display()));
        self.line(format!(
            "{}: {}",
            config.source.engine.from_keyword(),
            config.source_display()
        ));
        self.line("");
    }

    pub fn sample(&self, sample: &TableSample) {
        self.line(format!("  {}", sample.columns.join(" | ")));
        for row in &sample.rows {
            self.line(format!("  {}", row.join(" | ")));
        }
    }

    /// Completion footer with example queries against the target tables.
    pub fn footer(&self, message: &str, config: &FederationConfig) {
        self.line("");
        self.rule();
        self.ok(message);
        self.rule();
        if !config.target_tables.is_empty() {
            self.line("\nYou can now query the tables using:");
            for table in &config.target_tables {
                self.line(format!(
                    "  SELECT * FROM {}.{} LIMIT 10;",
                    config.external_schema, table
                ));
            }
        }
        self.line("");
    }

    /// Emits the report in JSON mode; text mode already printed everything.
    pub fn finish(&self, report: &ProvisionReport) {
        if self.format == OutputFormat::Json {
            match report.to_json() {
                Ok(json) => self.write_raw(&json),
                Err(e) => tracing::error!(error = %e, "failed to serialize run report"),
            }
        }
    }

    /// Prints a document regardless of format (`sql`, `config` commands).
    pub fn document(&self, text: impl AsRef<str>) {
        self.write_raw(text.as_ref());
    }
}

/// Cloneable in-memory writer.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        self.0
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self
            .0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "buffer poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
