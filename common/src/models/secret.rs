//! Database credential secret.

use std::fmt;

use serde::{Deserialize, Deserializer};
use validator::Validate;

use crate::errors::{AppError, AppResult};

/// Database credentials as stored in the secrets store.
///
/// Extra keys written by managed databases (`engine`,
/// `dbClusterIdentifier`, ...) are ignored.
#[derive(Clone, Deserialize, Validate)]
pub struct SecretPayload {
    /// Database host.
    #[validate(length(min = 1, message = "host is required"))]
    pub host: String,
    /// Database user.
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,
    /// Database password.
    pub password: String,
    /// Database (schema) name.
    #[serde(rename = "dbname")]
    #[validate(length(min = 1, message = "dbname is required"))]
    pub database_name: String,
    /// Database port. Accepts `3306` or `"3306"`.
    #[serde(deserialize_with = "port_from_number_or_string")]
    #[validate(range(min = 1, message = "port must be non-zero"))]
    pub port: u16,
}

impl SecretPayload {
    /// Parses and validates a secret string.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let payload: SecretPayload = serde_json::from_str(raw)
            .map_err(|e| AppError::SecretRetrieval(format!("invalid secret payload: {}", e)))?;
        payload
            .validate()
            .map_err(|e| AppError::SecretRetrieval(format!("invalid secret payload: {}", e)))?;
        Ok(payload)
    }
}

impl fmt::Debug for SecretPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretPayload")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***")
            .field("database_name", &self.database_name)
            .field("port", &self.port)
            .finish()
    }
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u64),
        Text(String),
    }

    let port = match RawPort::deserialize(deserializer)? {
        RawPort::Number(n) => n,
        RawPort::Text(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom(format!("port is not a number: {:?}", s)))?,
    };
    u16::try_from(port).map_err(|_| serde::de::Error::custom(format!("port out of range: {}", port)))
}
