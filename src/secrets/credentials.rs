// SPDX-License-Identifier: Apache-2.0

//! Database credentials parsed from a secret payload.

use serde::{Deserialize, Deserializer};
use tracing::info;

use crate::engine::error::{EngineError, EngineResult};
use crate::observability::Sensitive;
use crate::secrets::SecretProvider;

/// Login stored in a database secret.
///
/// Only `username` and `password` are required. RDS-style secrets also carry
/// the endpoint they were created for, which preflight compares against the
/// configured source.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: Sensitive<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default, deserialize_with = "port_from_number_or_string")]
    pub port: Option<u16>,
    #[serde(default)]
    pub dbname: Option<String>,
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Port::Number(n)) => Ok(Some(n)),
        Some(Port::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port '{}'", s))),
    }
}

impl DatabaseCredentials {
    /// Parses a secret payload, reporting the failure against `secret_id`.
    ///
    /// The payload itself never appears in the error.
    pub fn from_secret_json(secret_id: &str, payload: &str) -> EngineResult<Self> {
        let creds: Self = serde_json::from_str(payload).map_err(|e| {
            EngineError::secret(
                secret_id,
                format!(
                    "secret is not a database login (expected JSON with username and password): line {} column {}",
                    e.line(),
                    e.column()
                ),
            )
        })?;

        if creds.username.trim().is_empty() {
            return Err(EngineError::secret(secret_id, "secret has an empty username"));
        }
        if creds.password.is_empty() {
            return Err(EngineError::secret(secret_id, "secret has an empty password"));
        }
        Ok(creds)
    }

    /// Describes every endpoint field the secret records that differs from
    /// the given one. Host names compare case-insensitively.
    pub fn endpoint_mismatches(&self, host: &str, port: u16, database: &str) -> Vec<String> {
        let mut mismatches = Vec::new();
        if let Some(secret_host) = self.host.as_deref() {
            if !secret_host.eq_ignore_ascii_case(host) {
                mismatches.push(format!("host '{}' (configured '{}')", secret_host, host));
            }
        }
        if let Some(secret_port) = self.port {
            if secret_port != port {
                mismatches.push(format!("port {} (configured {})", secret_port, port));
            }
        }
        if let Some(dbname) = self.dbname.as_deref() {
            if dbname != database {
                mismatches.push(format!("dbname '{}' (configured '{}')", dbname, database));
            }
        }
        mismatches
    }
}

/// Retrieves and parses a database login from the secret store.
pub async fn fetch_credentials(
    provider: &dyn SecretProvider,
    secret_id: &str,
) -> EngineResult<DatabaseCredentials> {
    info!(backend = provider.name(), secret_id, "retrieving secret");
    let payload = provider.get_secret_string(secret_id).await?;
    DatabaseCredentials::from_secret_json(secret_id, &payload)
}
