//! Secrets store access.

use async_trait::async_trait;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use aws_sdk_secretsmanager::Client;

use common::errors::{AppError, AppResult};

/// Returns the raw secret string stored under an identifier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretsProvider: Send + Sync {
    async fn get_secret(&self, id: &str) -> AppResult<String>;
}

/// AWS Secrets Manager backed provider.
pub struct SecretsManagerProvider {
    client: Client,
}

impl SecretsManagerProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretsProvider for SecretsManagerProvider {
    async fn get_secret(&self, id: &str) -> AppResult<String> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(id)
            .send()
            .await
            .map_err(|e| {
                AppError::SecretRetrieval(format!(
                    "GetSecretValue failed for {}: {}",
                    id,
                    DisplayErrorContext(&e)
                ))
            })?;

        output
            .secret_string()
            .map(str::to_string)
            .ok_or_else(|| AppError::SecretRetrieval(format!("secret {} has no string value", id)))
    }
}
