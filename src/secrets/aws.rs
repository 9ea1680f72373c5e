// SPDX-License-Identifier: Apache-2.0

//! AWS Secrets Manager backend

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use aws_sdk_secretsmanager::Client;
use tracing::{debug, instrument};

use crate::engine::error::{EngineError, EngineResult};
use crate::secrets::SecretProvider;

pub struct AwsSecretsManagerProvider {
    client: Client,
}

impl AwsSecretsManagerProvider {
    /// Builds a client from the shared AWS config chain, pinned to `region`
    /// and, when given, to a named profile.
    pub async fn from_profile(profile: Option<&str>, region: &str) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;
        debug!(profile = ?profile, region, "aws config loaded");

        Self {
            client: Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl SecretProvider for AwsSecretsManagerProvider {
    fn name(&self) -> &'static str {
        "aws-secrets-manager"
    }

    #[instrument(skip(self))]
    async fn get_secret_string(&self, secret_id: &str) -> EngineResult<String> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| EngineError::secret(secret_id, DisplayErrorContext(&e).to_string()))?;

        output
            .secret_string()
            .map(str::to_string)
            .ok_or_else(|| {
                EngineError::secret(
                    secret_id,
                    "secret has no SecretString (binary secrets are not supported)",
                )
            })
    }
}
