//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own database, uploads
//! directory and backup directory.

use super::constants::*;
use super::fixtures::create_test_data_dir;
use beatvault::client::{BackupRestoreManager, ClientConfig};
use beatvault::server::{make_app, RequestsLoggingLevel, ServerConfig};
use beatvault::store::{MarketStore, SqliteMarketStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct TestServerOptions {
    pub seeded: bool,
    pub admin_token: Option<String>,
    pub max_part_size: u64,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            seeded: true,
            admin_token: Some(ADMIN_TOKEN.to_string()),
            max_part_size: beatvault::backup::MAX_PART_SIZE_BYTES,
        }
    }
}

/// Test server instance with an isolated marketplace
///
/// When dropped, the server shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    pub port: u16,

    /// Marketplace store for direct database access in tests
    pub store: Arc<SqliteMarketStore>,

    pub uploads_path: PathBuf,

    pub admin_token: Option<String>,

    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a seeded, token-protected server on a random port.
    pub async fn spawn() -> Self {
        Self::spawn_with(TestServerOptions::default()).await
    }

    /// Spawns a server with an empty database and no uploads.
    pub async fn spawn_empty() -> Self {
        Self::spawn_with(TestServerOptions {
            seeded: false,
            ..Default::default()
        })
        .await
    }

    /// # Panics
    ///
    /// Panics if the data directory cannot be created, the port cannot be
    /// bound or the server does not become ready within the timeout.
    pub async fn spawn_with(options: TestServerOptions) -> Self {
        let (temp_dir, store, uploads_path) =
            create_test_data_dir(options.seeded).expect("Failed to create test data dir");
        let store = Arc::new(store);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            admin_token: options.admin_token.clone(),
            uploads_path: uploads_path.clone(),
            backup_dir: temp_dir.path().join("backups"),
            max_part_size: options.max_part_size,
            ..Default::default()
        };

        let app = make_app(config, store.clone() as Arc<dyn MarketStore>)
            .expect("Failed to build app");

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            store,
            uploads_path,
            admin_token: options.admin_token,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// A client for this server carrying its admin token, with a short delay
    /// between part deliveries.
    pub fn manager(&self) -> BackupRestoreManager {
        let mut config = ClientConfig::new(self.base_url.clone());
        config.admin_token = self.admin_token.clone();
        config.part_interval = Duration::from_millis(FAST_PART_INTERVAL_MS);
        BackupRestoreManager::new(config).expect("Failed to build client")
    }

    /// Full URL of a backup endpoint.
    pub fn backup_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, beatvault::client::BACKUP_API_PREFIX, path)
    }

    /// Polls `/` until the server answers.
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
