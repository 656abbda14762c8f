//! Batch job runner.
//!
//! One run is a straight sequence: fetch secret, probe, connect, diagnose,
//! close, build the record, upload it. Any failure ends the run; nothing is
//! uploaded unless every earlier step succeeded.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::{ResultPayload, ResultRecord, SecretPayload};
use common::utils::StorageKey;

use crate::database::{DatabaseConnector, DatabaseSession};
use crate::probe::{self, ConnectivityCheck};
use crate::secrets::SecretsProvider;
use crate::storage::{ObjectStore, JSON_CONTENT_TYPE};

/// Executes one end-to-end batch run per call.
pub struct BatchJobRunner {
    config: AppConfig,
    secrets: Arc<dyn SecretsProvider>,
    database: Arc<dyn DatabaseConnector>,
    storage: Arc<dyn ObjectStore>,
    connectivity: Arc<dyn ConnectivityCheck>,
}

impl BatchJobRunner {
    pub fn new(
        config: AppConfig,
        secrets: Arc<dyn SecretsProvider>,
        database: Arc<dyn DatabaseConnector>,
        storage: Arc<dyn ObjectStore>,
        connectivity: Arc<dyn ConnectivityCheck>,
    ) -> Self {
        Self {
            config,
            secrets,
            database,
            storage,
            connectivity,
        }
    }

    /// Runs the job stamped with the current time.
    pub async fn run(&self) -> AppResult<ResultRecord> {
        self.run_at(Utc::now()).await
    }

    /// Runs the job; `now` stamps both the record and its storage key.
    ///
    /// Errors are logged here once and returned unchanged.
    pub async fn run_at(&self, now: DateTime<Utc>) -> AppResult<ResultRecord> {
        info!("Batch function execution started");

        match self.execute(now).await {
            Ok(record) => {
                info!(status = %record.status, "Batch function execution finished");
                Ok(record)
            }
            Err(e) => {
                error!(code = e.code(), error = %e, "Batch function execution failed");
                Err(e)
            }
        }
    }

    async fn execute(&self, now: DateTime<Utc>) -> AppResult<ResultRecord> {
        let secret = self.fetch_secret().await?;

        if self.config.probe_enabled {
            let timeout = Duration::from_secs(self.config.probe_timeout_secs);
            let outcome = self
                .connectivity
                .check(&secret.host, self.config.probe_port, timeout)
                .await;
            probe::log_outcome(&secret.host, self.config.probe_port, timeout, &outcome);
        }

        let count = self.run_diagnostic(&secret).await?;

        let record = ResultRecord::success(ResultPayload::from_count(self.config.payload_policy, count), now);
        self.publish(&record, &StorageKey::for_time(now)).await?;

        Ok(record)
    }

    async fn fetch_secret(&self) -> AppResult<SecretPayload> {
        let id = self
            .config
            .db_secret_id
            .as_deref()
            .ok_or_else(|| AppError::SecretRetrieval("DB_SECRET_ARN is not set".into()))?;

        let raw = self.secrets.get_secret(id).await?;
        let secret = SecretPayload::parse(&raw)?;

        info!(host = %secret.host, port = secret.port, database = %secret.database_name, "Database secret retrieved");
        Ok(secret)
    }

    /// Opens a session, runs the diagnostic, and closes the session on
    /// every path once it has been opened.
    async fn run_diagnostic(&self, secret: &SecretPayload) -> AppResult<i64> {
        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let mut session = self.database.connect(secret, timeout).await?;
        info!(host = %secret.host, "Database connection established");

        let outcome = diagnose(&mut *session).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close database connection");
        }

        let count = outcome?;
        info!(count, "Diagnostic query completed");
        Ok(count)
    }

    async fn publish(&self, record: &ResultRecord, key: &StorageKey) -> AppResult<()> {
        let bucket = self.config.output_bucket.as_deref();

        match self.upload(bucket, record, key).await {
            Ok(()) => {
                info!(bucket = bucket.unwrap_or_default(), key = %key, "Successfully uploaded result record");
                Ok(())
            }
            Err(e) => {
                error!(bucket = bucket.unwrap_or("<unset>"), key = %key, error = %e, "Error uploading result record");
                Err(e)
            }
        }
    }

    async fn upload(&self, bucket: Option<&str>, record: &ResultRecord, key: &StorageKey) -> AppResult<()> {
        let bucket = bucket.ok_or_else(|| AppError::StorageWrite("OUTPUT_BUCKET_NAME is not set".into()))?;
        let body = record
            .to_json_bytes()
            .map_err(|e| AppError::StorageWrite(format!("failed to serialize result record: {}", e)))?;

        self.storage
            .put_object(bucket, key.as_str(), body, JSON_CONTENT_TYPE)
            .await
    }
}

async fn diagnose(session: &mut dyn DatabaseSession) -> AppResult<i64> {
    session.ensure_diagnostic_table().await?;
    session.count_rows().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MockDatabaseConnector, MockDatabaseSession};
    use crate::probe::{MockConnectivityCheck, ProbeOutcome};
    use crate::secrets::MockSecretsProvider;
    use crate::storage::MockObjectStore;
    use chrono::TimeZone;
    use common::config::PayloadPolicy;
    use common::models::RunStatus;
    use std::io::Write;
    use std::sync::Mutex;

    const SECRET_JSON: &str =
        r#"{"host":"db.test","username":"u","password":"p","dbname":"d","port":"3306"}"#;

    fn test_config() -> AppConfig {
        AppConfig {
            output_bucket: Some("batch-outputs-test".into()),
            db_secret_id: Some("db-secret".into()),
            probe_enabled: false,
            ..AppConfig::default()
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 1, 0, 0).unwrap()
    }

    fn secrets_ok() -> MockSecretsProvider {
        let mut secrets = MockSecretsProvider::new();
        secrets
            .expect_get_secret()
            .withf(|id: &str| id == "db-secret")
            .times(1)
            .returning(|_| Ok(SECRET_JSON.to_string()));
        secrets
    }

    /// A session that answers `count` and must be closed exactly once.
    fn healthy_session(count: i64) -> MockDatabaseSession {
        let mut session = MockDatabaseSession::new();
        session.expect_ensure_diagnostic_table().times(1).returning(|| Ok(()));
        session.expect_count_rows().times(1).returning(move || Ok(count));
        session.expect_close().times(1).returning(|| Ok(()));
        session
    }

    fn connector_returning(session: MockDatabaseSession) -> MockDatabaseConnector {
        let mut database = MockDatabaseConnector::new();
        database
            .expect_connect()
            .times(1)
            .return_once(move |_, _| Ok(Box::new(session)));
        database
    }

    fn storage_capturing(captured: Arc<Mutex<Vec<(String, String, Vec<u8>, String)>>>) -> MockObjectStore {
        let mut storage = MockObjectStore::new();
        storage
            .expect_put_object()
            .times(1)
            .returning(move |bucket, key, body, content_type| {
                captured
                    .lock()
                    .unwrap()
                    .push((bucket.to_string(), key.to_string(), body, content_type.to_string()));
                Ok(())
            });
        storage
    }

    fn storage_never() -> MockObjectStore {
        let mut storage = MockObjectStore::new();
        storage.expect_put_object().never();
        storage
    }

    fn runner(
        config: AppConfig,
        secrets: MockSecretsProvider,
        database: MockDatabaseConnector,
        storage: MockObjectStore,
    ) -> BatchJobRunner {
        let mut connectivity = MockConnectivityCheck::new();
        connectivity.expect_check().never();
        runner_with_check(config, secrets, database, storage, connectivity)
    }

    fn runner_with_check(
        config: AppConfig,
        secrets: MockSecretsProvider,
        database: MockDatabaseConnector,
        storage: MockObjectStore,
        connectivity: MockConnectivityCheck,
    ) -> BatchJobRunner {
        BatchJobRunner::new(
            config,
            Arc::new(secrets),
            Arc::new(database),
            Arc::new(storage),
            Arc::new(connectivity),
        )
    }

    fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    #[tokio::test]
    async fn test_success_uploads_query_result_record() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let mut database = MockDatabaseConnector::new();
        database
            .expect_connect()
            .withf(|secret: &SecretPayload, timeout: &Duration| {
                secret.host == "db.test" && secret.port == 3306 && *timeout == Duration::from_secs(15)
            })
            .times(1)
            .return_once(|_, _| Ok(Box::new(healthy_session(0))));

        let runner = runner(test_config(), secrets_ok(), database, storage_capturing(captured.clone()));
        let record = runner.run_at(fixed_now()).await.unwrap();

        assert_eq!(record.status, RunStatus::Success);
        assert_eq!(record.payload, ResultPayload::QueryResult(vec![0]));
        assert!(DateTime::parse_from_rfc3339(&record.timestamp).is_ok());

        let uploads = captured.lock().unwrap();
        let (bucket, key, body, content_type) = &uploads[0];
        assert_eq!(bucket, "batch-outputs-test");
        assert_eq!(key, "logs/batch-log-20250601010000.json");
        assert_eq!(content_type, "application/json");

        let stored: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(stored["status"], "success");
        assert_eq!(stored["message"], "Batch process completed successfully");
        assert_eq!(stored["query_result"], serde_json::json!([0]));
        assert_eq!(stored["timestamp"], record.timestamp.as_str());
    }

    #[tokio::test]
    async fn test_processed_items_policy_stores_placeholder_body() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let config = AppConfig {
            payload_policy: PayloadPolicy::ProcessedItems,
            ..test_config()
        };

        let runner = runner(
            config,
            secrets_ok(),
            connector_returning(healthy_session(0)),
            storage_capturing(captured.clone()),
        );
        let record = runner.run_at(fixed_now()).await.unwrap();

        let uploads = captured.lock().unwrap();
        let body = String::from_utf8(uploads[0].2.clone()).unwrap();
        assert_eq!(
            body,
            format!(
                r#"{{"status":"success","timestamp":"{}","message":"Batch process completed successfully","processed_items":100}}"#,
                record.timestamp
            )
        );
    }

    #[tokio::test]
    async fn test_secret_failure_skips_database_and_storage() {
        let mut secrets = MockSecretsProvider::new();
        secrets
            .expect_get_secret()
            .times(1)
            .returning(|_| Err(AppError::SecretRetrieval("unreachable".into())));
        let mut database = MockDatabaseConnector::new();
        database.expect_connect().never();

        let runner = runner(test_config(), secrets, database, storage_never());
        let err = runner.run_at(fixed_now()).await.unwrap_err();

        assert!(matches!(err, AppError::SecretRetrieval(_)));
    }

    #[tokio::test]
    async fn test_missing_secret_id_fails_without_calling_store() {
        let mut secrets = MockSecretsProvider::new();
        secrets.expect_get_secret().never();
        let mut database = MockDatabaseConnector::new();
        database.expect_connect().never();
        let config = AppConfig {
            db_secret_id: None,
            ..test_config()
        };

        let runner = runner(config, secrets, database, storage_never());
        let err = runner.run().await.unwrap_err();

        assert!(matches!(err, AppError::SecretRetrieval(_)));
    }

    #[tokio::test]
    async fn test_malformed_secret_skips_database() {
        let mut secrets = MockSecretsProvider::new();
        secrets
            .expect_get_secret()
            .times(1)
            .returning(|_| Ok(r#"{"host":"db.test"}"#.to_string()));
        let mut database = MockDatabaseConnector::new();
        database.expect_connect().never();

        let runner = runner(test_config(), secrets, database, storage_never());
        let err = runner.run().await.unwrap_err();

        assert!(matches!(err, AppError::SecretRetrieval(_)));
    }

    #[tokio::test]
    async fn test_connection_failure_skips_storage() {
        let mut database = MockDatabaseConnector::new();
        database
            .expect_connect()
            .times(1)
            .returning(|_, _| Err(AppError::DatabaseConnection("access denied".into())));

        let runner = runner(test_config(), secrets_ok(), database, storage_never());
        let err = runner.run().await.unwrap_err();

        assert!(matches!(err, AppError::DatabaseConnection(_)));
    }

    #[tokio::test]
    async fn test_query_failure_closes_session_and_skips_storage() {
        let mut session = MockDatabaseSession::new();
        session.expect_ensure_diagnostic_table().times(1).returning(|| Ok(()));
        session
            .expect_count_rows()
            .times(1)
            .returning(|| Err(AppError::DatabaseQuery("table is locked".into())));
        session.expect_close().times(1).returning(|| Ok(()));

        let runner = runner(test_config(), secrets_ok(), connector_returning(session), storage_never());
        let err = runner.run().await.unwrap_err();

        assert!(matches!(err, AppError::DatabaseQuery(_)));
    }

    #[tokio::test]
    async fn test_create_table_failure_skips_count_and_closes_session() {
        let mut session = MockDatabaseSession::new();
        session
            .expect_ensure_diagnostic_table()
            .times(1)
            .returning(|| Err(AppError::DatabaseQuery("permission denied".into())));
        session.expect_count_rows().never();
        session.expect_close().times(1).returning(|| Ok(()));

        let runner = runner(test_config(), secrets_ok(), connector_returning(session), storage_never());
        let err = runner.run().await.unwrap_err();

        assert!(matches!(err, AppError::DatabaseQuery(_)));
    }

    #[tokio::test]
    async fn test_close_failure_does_not_fail_run() {
        let mut session = MockDatabaseSession::new();
        session.expect_ensure_diagnostic_table().times(1).returning(|| Ok(()));
        session.expect_count_rows().times(1).returning(|| Ok(5));
        session
            .expect_close()
            .times(1)
            .returning(|| Err(AppError::DatabaseConnection("broken pipe".into())));

        let captured = Arc::new(Mutex::new(Vec::new()));
        let runner = runner(
            test_config(),
            secrets_ok(),
            connector_returning(session),
            storage_capturing(captured.clone()),
        );
        let record = runner.run().await.unwrap();

        assert_eq!(record.payload, ResultPayload::QueryResult(vec![5]));
        assert_eq!(captured.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_bucket_is_storage_error() {
        let config = AppConfig {
            output_bucket: None,
            ..test_config()
        };

        let runner = runner(config, secrets_ok(), connector_returning(healthy_session(0)), storage_never());
        let err = runner.run().await.unwrap_err();

        assert!(matches!(err, AppError::StorageWrite(_)));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_logged_then_returned() {
        let (logs, _guard) = capture_logs();

        let mut storage = MockObjectStore::new();
        storage
            .expect_put_object()
            .times(1)
            .returning(|_, _, _, _| Err(AppError::StorageWrite("AccessDenied".into())));

        let runner = runner(
            test_config(),
            secrets_ok(),
            connector_returning(healthy_session(0)),
            storage,
        );
        let err = runner.run().await.unwrap_err();

        assert!(matches!(err, AppError::StorageWrite(_)));
        let output = logs.contents();
        assert!(output.contains("ERROR"));
        assert!(output.contains("Error uploading result record"));
        assert!(output.contains("STORAGE_WRITE_ERROR"));
    }

    fn checked_config() -> AppConfig {
        AppConfig {
            probe_enabled: true,
            probe_port: 3306,
            probe_timeout_secs: 5,
            ..test_config()
        }
    }

    fn check_answering(outcome: ProbeOutcome) -> MockConnectivityCheck {
        let mut connectivity = MockConnectivityCheck::new();
        connectivity
            .expect_check()
            .withf(|host: &str, port: &u16, timeout: &Duration| {
                host == "db.test" && *port == 3306 && *timeout == Duration::from_secs(5)
            })
            .times(1)
            .returning(move |_, _, _| outcome.clone());
        connectivity
    }

    #[tokio::test]
    async fn test_run_succeeds_when_host_check_times_out() {
        let (logs, _guard) = capture_logs();
        let captured = Arc::new(Mutex::new(Vec::new()));

        let runner = runner_with_check(
            checked_config(),
            secrets_ok(),
            connector_returning(healthy_session(0)),
            storage_capturing(captured.clone()),
            check_answering(ProbeOutcome::TimedOut),
        );
        let record = runner.run().await.unwrap();

        assert_eq!(record.status, RunStatus::Success);
        assert_eq!(captured.lock().unwrap().len(), 1);
        let output = logs.contents();
        assert!(output.contains("WARN"));
        assert!(output.contains("timed out, continuing"));
    }

    #[tokio::test]
    async fn test_run_succeeds_when_host_refuses_connection() {
        let (logs, _guard) = capture_logs();
        let captured = Arc::new(Mutex::new(Vec::new()));

        let runner = runner_with_check(
            checked_config(),
            secrets_ok(),
            connector_returning(healthy_session(0)),
            storage_capturing(captured.clone()),
            check_answering(ProbeOutcome::Unreachable("connection refused".into())),
        );
        let record = runner.run().await.unwrap();

        assert_eq!(record.status, RunStatus::Success);
        assert_eq!(captured.lock().unwrap().len(), 1);
        let output = logs.contents();
        assert!(output.contains("WARN"));
        assert!(output.contains("Database host unreachable, continuing"));
        assert!(output.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_reachable_host_logs_no_warning() {
        let (logs, _guard) = capture_logs();
        let captured = Arc::new(Mutex::new(Vec::new()));

        let runner = runner_with_check(
            checked_config(),
            secrets_ok(),
            connector_returning(healthy_session(0)),
            storage_capturing(captured.clone()),
            check_answering(ProbeOutcome::Reachable(Duration::from_millis(3))),
        );
        runner.run().await.unwrap();

        let output = logs.contents();
        assert!(output.contains("Database host reachable"));
        assert!(!output.contains("WARN"));
    }
}
