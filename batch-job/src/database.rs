//! Database session used by the diagnostic step.
//!
//! One connection per run; no pool.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;

use common::errors::{AppError, AppResult};
use common::models::SecretPayload;

/// Table touched by the diagnostic query.
pub const DIAGNOSTIC_TABLE: &str = "batch_test";

/// Opens database sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    /// Opens a session with the given credentials, bounded by `timeout`.
    async fn connect(&self, secret: &SecretPayload, timeout: Duration) -> AppResult<Box<dyn DatabaseSession>>;
}

/// A live database session.
///
/// The owner calls `close` once the diagnostic is done; queries after that
/// fail with `DatabaseQuery`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatabaseSession: Send {
    /// Creates the diagnostic table if it is absent.
    async fn ensure_diagnostic_table(&mut self) -> AppResult<()>;

    /// Returns `COUNT(*)` of the diagnostic table.
    async fn count_rows(&mut self) -> AppResult<i64>;

    /// Releases the session. Closing an already closed session is a no-op.
    async fn close(&mut self) -> AppResult<()>;
}

/// MySQL connector built on sqlx.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlConnector;

impl MySqlConnector {
    fn connect_options(secret: &SecretPayload) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&secret.host)
            .port(secret.port)
            .username(&secret.username)
            .password(&secret.password)
            .database(&secret.database_name)
    }
}

#[async_trait]
impl DatabaseConnector for MySqlConnector {
    async fn connect(&self, secret: &SecretPayload, timeout: Duration) -> AppResult<Box<dyn DatabaseSession>> {
        let options = Self::connect_options(secret);
        let conn = tokio::time::timeout(timeout, MySqlConnection::connect_with(&options))
            .await
            .map_err(|_| {
                AppError::DatabaseConnection(format!(
                    "timed out after {}s connecting to {}:{}",
                    timeout.as_secs(),
                    secret.host,
                    secret.port
                ))
            })?
            .map_err(|e| AppError::DatabaseConnection(e.to_string()))?;

        Ok(Box::new(MySqlSession { conn: Some(conn) }))
    }
}

/// Session over a single MySQL connection.
pub struct MySqlSession {
    conn: Option<MySqlConnection>,
}

impl MySqlSession {
    fn conn(&mut self) -> AppResult<&mut MySqlConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| AppError::DatabaseQuery("session already closed".into()))
    }
}

#[async_trait]
impl DatabaseSession for MySqlSession {
    async fn ensure_diagnostic_table(&mut self) -> AppResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS `{}` (
                `id`         INT          NOT NULL AUTO_INCREMENT,
                `name`       VARCHAR(255) DEFAULT NULL,
                `created_at` TIMESTAMP    NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (`id`)
            )",
            DIAGNOSTIC_TABLE
        );
        sqlx::query(&sql)
            .execute(self.conn()?)
            .await
            .map_err(|e| AppError::DatabaseQuery(format!("Failed to create {} table: {}", DIAGNOSTIC_TABLE, e)))?;

        tracing::info!(table = DIAGNOSTIC_TABLE, "Diagnostic table ensured");
        Ok(())
    }

    async fn count_rows(&mut self) -> AppResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM `{}`", DIAGNOSTIC_TABLE);
        let row: (i64,) = sqlx::query_as(&sql)
            .fetch_one(self.conn()?)
            .await
            .map_err(|e| AppError::DatabaseQuery(e.to_string()))?;
        Ok(row.0)
    }

    async fn close(&mut self) -> AppResult<()> {
        match self.conn.take() {
            Some(conn) => conn
                .close()
                .await
                .map_err(|e| AppError::DatabaseConnection(format!("Failed to close connection: {}", e))),
            None => Ok(()),
        }
    }
}
