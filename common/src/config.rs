//! Application configuration.
//!
//! Loaded once at startup from environment variables (and an optional
//! `.env` file) and passed into the runner.

use std::str::FromStr;

/// Default port for the connectivity probe (MySQL).
pub const DEFAULT_PROBE_PORT: u16 = 3306;
/// Default timeout for the connectivity probe, in seconds.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
/// Default database connect timeout, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Which payload field the result record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadPolicy {
    /// `"processed_items": 100`
    ProcessedItems,
    /// `"query_result": [<count>]`
    #[default]
    QueryResult,
}

impl FromStr for PayloadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "processed_items" => Ok(PayloadPolicy::ProcessedItems),
            "query_result" => Ok(PayloadPolicy::QueryResult),
            other => Err(format!("unknown payload policy: {}", other)),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Batch job configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Target bucket for result records (`OUTPUT_BUCKET_NAME`).
    pub output_bucket: Option<String>,
    /// Identifier of the database credentials secret (`DB_SECRET_ARN`).
    pub db_secret_id: Option<String>,
    /// Whether to run the advisory TCP probe before connecting.
    pub probe_enabled: bool,
    pub probe_port: u16,
    pub probe_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub payload_policy: PayloadPolicy,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_bucket: None,
            db_secret_id: None,
            probe_enabled: true,
            probe_port: DEFAULT_PROBE_PORT,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            payload_policy: PayloadPolicy::default(),
            log_format: LogFormat::default(),
        }
    }
}

/// A configuration value that failed to parse and was replaced by its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub key: &'static str,
    pub value: String,
    pub error: String,
}

impl ConfigWarning {
    /// Emits the warning; call once a subscriber is installed.
    pub fn log(&self) {
        tracing::warn!(
            key = self.key,
            value = %self.value,
            error = %self.error,
            "Invalid config value, using default"
        );
    }
}

impl AppConfig {
    /// Loads configuration from the process environment.
    ///
    /// A `.env` file in the working directory is read first if present;
    /// variables already set in the environment take precedence. Loading
    /// happens before logging is configured, so parse problems are
    /// returned rather than logged.
    pub fn load() -> (Self, Vec<ConfigWarning>) {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// Values that fail to parse fall back to their defaults and are
    /// reported in the returned warnings.
    pub fn from_lookup<F>(lookup: F) -> (Self, Vec<ConfigWarning>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let mut warnings = Vec::new();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let probe_enabled = parse_or(
            non_empty("DB_PROBE_ENABLED"),
            "DB_PROBE_ENABLED",
            defaults.probe_enabled,
            &mut warnings,
        );
        let probe_port = parse_or(non_empty("DB_PROBE_PORT"), "DB_PROBE_PORT", defaults.probe_port, &mut warnings);
        let probe_timeout_secs = parse_or(
            non_empty("DB_PROBE_TIMEOUT_SECS"),
            "DB_PROBE_TIMEOUT_SECS",
            defaults.probe_timeout_secs,
            &mut warnings,
        );
        let connect_timeout_secs = parse_or(
            non_empty("DB_CONNECT_TIMEOUT_SECS"),
            "DB_CONNECT_TIMEOUT_SECS",
            defaults.connect_timeout_secs,
            &mut warnings,
        );
        let payload_policy = parse_or(
            non_empty("RESULT_PAYLOAD"),
            "RESULT_PAYLOAD",
            defaults.payload_policy,
            &mut warnings,
        );
        let log_format = parse_or(non_empty("LOG_FORMAT"), "LOG_FORMAT", defaults.log_format, &mut warnings);

        let config = Self {
            output_bucket: non_empty("OUTPUT_BUCKET_NAME"),
            db_secret_id: non_empty("DB_SECRET_ARN"),
            probe_enabled,
            probe_port,
            probe_timeout_secs,
            connect_timeout_secs,
            payload_policy,
            log_format,
        };
        (config, warnings)
    }
}

fn parse_or<T>(raw: Option<String>, key: &'static str, default: T, warnings: &mut Vec<ConfigWarning>) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => match value.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                warnings.push(ConfigWarning {
                    key,
                    error: e.to_string(),
                    value,
                });
                default
            }
        },
        None => default,
    }
}
