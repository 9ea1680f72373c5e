// SPDX-License-Identifier: Apache-2.0

//! Provisioning workflow
//!
//! A run is a fixed, linear sequence of steps against the warehouse (and,
//! optionally, the federated source). `Provisioner` executes one `Command`
//! and returns a `ProvisionReport` describing what happened.

mod runner;

pub use runner::Provisioner;

/// Options shared by every command that runs smoke tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmokeOptions {
    /// Smoke-test failures fail the run (exit 3).
    pub strict: bool,
    /// Rows to fetch and print per target table after counting.
    pub sample_rows: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProvisionOptions {
    /// Print the statements instead of running them.
    pub dry_run: bool,
    /// Connect to the source database directly before creating the schema.
    pub preflight_source: bool,
    pub smoke: SmokeOptions,
}

/// What a run should do
#[derive(Debug, Clone, Copy)]
pub enum Command {
    /// Create, verify and smoke-test the external schema
    Provision(ProvisionOptions),
    /// Verify and smoke-test an existing external schema
    Verify(SmokeOptions),
    /// Drop the external schema; `confirmed` is required in production
    Teardown { confirmed: bool },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Provision(_) => "provision",
            Command::Verify(_) => "verify",
            Command::Teardown { .. } => "teardown",
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, Command::Provision(opts) if opts.dry_run)
    }

    pub fn is_strict(&self) -> bool {
        match self {
            Command::Provision(opts) => opts.smoke.strict,
            Command::Verify(smoke) => smoke.strict,
            Command::Teardown { .. } => false,
        }
    }
}
