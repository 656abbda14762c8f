//! Advisory TCP reachability probe.
//!
//! The outcome is only logged; it never gates the database connection.

use std::future::Future;
use std::io;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;

/// Result of a connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The TCP handshake completed after the given latency.
    Reachable(Duration),
    /// The connection was refused or could not be routed.
    Unreachable(String),
    /// No answer within the timeout.
    TimedOut,
}

/// Checks whether a host accepts TCP connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectivityCheck: Send + Sync {
    async fn check(&self, host: &str, port: u16, timeout: Duration) -> ProbeOutcome;
}

/// Raw TCP connect check.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnectivityCheck;

#[async_trait]
impl ConnectivityCheck for TcpConnectivityCheck {
    async fn check(&self, host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
        probe_tcp(host, port, timeout).await
    }
}

/// Attempts a raw TCP connection to `host:port` within `timeout`.
pub async fn probe_tcp(host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
    bounded_attempt(TcpStream::connect((host, port)), timeout).await
}

async fn bounded_attempt<F, T>(attempt: F, timeout: Duration) -> ProbeOutcome
where
    F: Future<Output = io::Result<T>>,
{
    let start = Instant::now();
    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(_)) => ProbeOutcome::Reachable(start.elapsed()),
        Ok(Err(e)) => ProbeOutcome::Unreachable(e.to_string()),
        Err(_) => ProbeOutcome::TimedOut,
    }
}

/// Logs an outcome: `info` when reachable, `warn` otherwise.
pub fn log_outcome(host: &str, port: u16, timeout: Duration, outcome: &ProbeOutcome) {
    match outcome {
        ProbeOutcome::Reachable(latency) => {
            tracing::info!(host, port, latency_ms = latency.as_millis() as u64, "Database host reachable");
        }
        ProbeOutcome::Unreachable(error) => {
            tracing::warn!(host, port, error = %error, "Database host unreachable, continuing");
        }
        ProbeOutcome::TimedOut => {
            tracing::warn!(host, port, timeout_secs = timeout.as_secs(), "Database probe timed out, continuing");
        }
    }
}
