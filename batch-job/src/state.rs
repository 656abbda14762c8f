//! Application state for the batch job.

use std::sync::Arc;

use aws_config::BehaviorVersion;
use common::config::AppConfig;
use tokio::sync::OnceCell;

use crate::database::{DatabaseConnector, MySqlConnector};
use crate::probe::{ConnectivityCheck, TcpConnectivityCheck};
use crate::runner::BatchJobRunner;
use crate::secrets::{SecretsManagerProvider, SecretsProvider};
use crate::storage::{ObjectStore, S3ObjectStore};

/// Collaborator clients, built on first use and kept for the process lifetime.
static CLIENTS: OnceCell<Clients> = OnceCell::const_new();

/// Stateless collaborator clients shared by every invocation.
pub struct Clients {
    pub secrets: Arc<dyn SecretsProvider>,
    pub database: Arc<dyn DatabaseConnector>,
    pub storage: Arc<dyn ObjectStore>,
    pub connectivity: Arc<dyn ConnectivityCheck>,
}

impl Clients {
    /// Returns the process-wide clients, loading AWS configuration on first call.
    pub async fn global() -> &'static Clients {
        CLIENTS
            .get_or_init(|| async {
                let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
                tracing::info!(region = ?sdk_config.region(), "AWS clients initialized");
                let secrets_client = aws_sdk_secretsmanager::Client::new(&sdk_config);
                Clients {
                    secrets: Arc::new(SecretsManagerProvider::new(secrets_client)),
                    database: Arc::new(MySqlConnector),
                    storage: Arc::new(S3ObjectStore::new(aws_sdk_s3::Client::new(&sdk_config))),
                    connectivity: Arc::new(TcpConnectivityCheck),
                }
            })
            .await
    }
}

/// Application state shared across invocations.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub clients: &'static Clients,
}

impl AppState {
    /// Creates a new application state.
    pub async fn new(config: AppConfig) -> Self {
        Self {
            config,
            clients: Clients::global().await,
        }
    }

    /// Builds a runner for one invocation.
    pub fn runner(&self) -> BatchJobRunner {
        BatchJobRunner::new(
            self.config.clone(),
            Arc::clone(&self.clients.secrets),
            Arc::clone(&self.clients.database),
            Arc::clone(&self.clients.storage),
            Arc::clone(&self.clients.connectivity),
        )
    }
}
