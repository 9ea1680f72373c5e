// SPDX-License-Identifier: Apache-2.0

//! OS keyring backend
//!
//! Lets an operator run against a warehouse without AWS credentials on the
//! machine: the same JSON document the secret ARN would hold is stored in the
//! OS keyring under service `fedschema`, keyed by the ARN.
//!
//! On Linux the entry lives in the kernel session keyring, so it does not
//! survive logout or reboot; run `fedschema keyring-set` again in a new
//! session.

use async_trait::async_trait;
use keyring::Entry;

use crate::engine::error::{EngineError, EngineResult};
use crate::secrets::SecretProvider;

pub const KEYRING_SERVICE: &str = "fedschema";

pub struct KeyringProvider {
    service: String,
}

impl KeyringProvider {
    pub fn new() -> Self {
        Self::with_service(KEYRING_SERVICE)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, secret_id: &str) -> EngineResult<Entry> {
        Entry::new(&self.service, secret_id)
            .map_err(|e| EngineError::secret(secret_id, format!("Keyring error: {}", e)))
    }

    /// Stores `payload` under `secret_id`, replacing any previous value.
    pub fn store(&self, secret_id: &str, payload: &str) -> EngineResult<()> {
        self.entry(secret_id)?
            .set_password(payload)
            .map_err(|e| EngineError::secret(secret_id, format!("Failed to store secret: {}", e)))
    }
}

impl Default for KeyringProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretProvider for KeyringProvider {
    fn name(&self) -> &'static str {
        "keyring"
    }

    async fn get_secret_string(&self, secret_id: &str) -> EngineResult<String> {
        let entry = self.entry(secret_id)?;
        let owned_id = secret_id.to_string();

        // Platform keyring calls block on IPC
        let read = tokio::task::spawn_blocking(move || entry.get_password())
            .await
            .map_err(|e| EngineError::internal(format!("keyring task failed: {}", e)))?;

        match read {
            Ok(payload) => Ok(payload),
            Err(keyring::Error::NoEntry) => Err(EngineError::secret(
                owned_id,
                "no keyring entry (store one with `fedschema keyring-set`)",
            )),
            Err(e) => Err(EngineError::secret(
                owned_id,
                format!("Failed to read secret: {}", e),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_entry_is_a_secret_error() {
        // Read only; a current-thread runtime would deadlock if the read blocked it
        let provider = KeyringProvider::with_service("fedschema-test-unset");
        let err = provider
            .get_secret_string("arn:aws:secretsmanager:us-east-1:1:secret:never-stored")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SecretError { .. }));
    }
}
