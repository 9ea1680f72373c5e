// SPDX-License-Identifier: Apache-2.0

//! Secret store access
//!
//! Database logins are never passed on the command line. They are read at run
//! time from a secret store as JSON documents (`{"username": ..., "password": ...}`),
//! the format AWS Secrets Manager uses for database secrets.

pub mod aws;
pub mod credentials;
pub mod keyring;

pub use aws::AwsSecretsManagerProvider;
pub use credentials::{fetch_credentials, DatabaseCredentials};
pub use keyring::KeyringProvider;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::engine::error::{EngineError, EngineResult};

/// Which secret store a run reads from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SecretBackend {
    /// AWS Secrets Manager, using the configured profile and region
    #[default]
    Aws,
    /// The local OS keyring, entries keyed by secret ARN
    Keyring,
}

/// Trait for secret storage backends
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns the secret's string payload.
    async fn get_secret_string(&self, secret_id: &str) -> EngineResult<String>;
}

/// In-memory provider for tests
#[derive(Clone, Default)]
pub struct MockProvider {
    storage: Arc<Mutex<HashMap<String, String>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(self, secret_id: &str, payload: &str) -> Self {
        self.insert(secret_id, payload);
        self
    }

    pub fn insert(&self, secret_id: &str, payload: &str) {
        if let Ok(mut map) = self.storage.lock() {
            map.insert(secret_id.to_string(), payload.to_string());
        }
    }
}

#[async_trait]
impl SecretProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get_secret_string(&self, secret_id: &str) -> EngineResult<String> {
        let map = self
            .storage
            .lock()
            .map_err(|_| EngineError::internal("mock secret store poisoned"))?;
        map.get(secret_id)
            .cloned()
            .ok_or_else(|| EngineError::secret(secret_id, "ResourceNotFoundException: secret not found"))
    }
}
