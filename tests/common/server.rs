//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own databases.

use super::constants::*;
use super::fixtures::create_test_stores;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use storynest_server::book_access::BookAccessSettings;
use storynest_server::library::SqliteLibraryStore;
use storynest_server::server::server::make_app;
use storynest_server::user::SqliteUserStore;
use storynest_server::{RequestsLoggingLevel, ServerConfig, SqliteAnalyticsStore};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with isolated databases
///
/// When dropped, the server gracefully shuts down and temp resources are
/// cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Direct store access for test assertions
    pub user_store: Arc<SqliteUserStore>,
    pub library_store: Arc<SqliteLibraryStore>,
    pub analytics_store: Arc<SqliteAnalyticsStore>,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port with seeded test data.
    pub async fn spawn() -> Self {
        Self::spawn_with_book_expiry(Some(30)).await
    }

    /// Spawns a test server with a specific book-token expiry setting.
    pub async fn spawn_with_book_expiry(token_expiry_days: Option<u64>) -> Self {
        let (temp_db_dir, user_store, library_store, analytics_store) =
            create_test_stores().expect("Failed to create test stores");

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
            session_secret: TEST_SESSION_SECRET.to_string(),
            session_expiry_days: 7,
            book_access: BookAccessSettings {
                secret: TEST_SESSION_SECRET.to_string(),
                token_expiry_days,
                reader_base_url: "https://reader.example.com".to_string(),
                platform_id: "storynest-web".to_string(),
                library_url: format!("{}/library", base_url),
            },
        };

        let app = make_app(
            config,
            user_store.clone(),
            library_store.clone(),
            analytics_store.clone(),
        )
        .expect("Failed to build app");

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            user_store,
            library_store,
            analytics_store,
            _temp_db_dir: temp_db_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the root endpoint
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
                Ok(response) if response.status().is_success() => {
                    return;
                }
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Send shutdown signal
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
        // TempDir will be cleaned up automatically
    }
}
