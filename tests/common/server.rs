//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own jobs database, output
//! directory, and worker pool.

use jobs_server::config::{QueueSettings, RetrySettings};
use jobs_server::handlers::{CsvExportHandler, EmailSendHandler, HandlerRegistry};
use jobs_server::mailer::NoOpMailTransport;
use jobs_server::queue::{Dispatcher, LoggingObserver, QueueBroker, RetryPolicy, WorkerPool};
use jobs_server::server::state::ServerState;
use jobs_server::server::{server::make_app, RequestsLoggingLevel, ServerConfig};
use jobs_server::SqliteJobStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Test server instance with isolated storage and workers
///
/// When dropped, the workers and server shut down and temp resources are
/// cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Job store for direct database access in tests
    pub store: Arc<SqliteJobStore>,

    /// Directory CSV exports are written into
    pub output_dir: PathBuf,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    shutdown: CancellationToken,
}

impl TestServer {
    /// Spawns a new test server on a random port with fast retry backoff,
    /// so failing jobs reach their terminal state quickly.
    pub async fn spawn() -> Self {
        Self::spawn_with_retry(RetrySettings {
            max_attempts: 3,
            base_delay_ms: 50,
            max_delay_ms: 200,
        })
        .await
    }

    /// Spawns a new test server with the given retry settings.
    ///
    /// # Panics
    ///
    /// Panics if the database, port binding, or server startup fails.
    pub async fn spawn_with_retry(retry: RetrySettings) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let store = Arc::new(
            SqliteJobStore::new(temp_dir.path().join("jobs.db"))
                .expect("Failed to open job store"),
        );

        let output_dir = temp_dir.path().join("output");

        let mut registry = HandlerRegistry::new();
        registry.register(
            "CSV_EXPORT",
            Arc::new(CsvExportHandler::new(output_dir.clone())),
        );
        registry.register(
            "EMAIL_SEND",
            Arc::new(EmailSendHandler::new(
                Arc::new(NoOpMailTransport),
                "noreply@example.com".to_string(),
            )),
        );

        let broker = Arc::new(QueueBroker::new(&QueueSettings::default()));
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), broker.clone()));

        let shutdown = CancellationToken::new();

        let mut worker_pool = WorkerPool::new(
            store.clone(),
            broker.clone(),
            Arc::new(registry),
            RetryPolicy::new(&retry),
        );
        worker_pool.add_observer(Arc::new(LoggingObserver));
        Arc::new(worker_pool).spawn(shutdown.clone());

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            port,
        };
        let state = ServerState::new(config, store.clone(), dispatcher);
        let app = make_app(state);

        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
                .expect("Test server failed");
        });

        let server = Self {
            base_url,
            port,
            store,
            output_dir,
            _temp_dir: temp_dir,
            shutdown,
        };
        server.wait_until_ready().await;
        server
    }

    /// Waits for the server to answer its health endpoint.
    async fn wait_until_ready(&self) {
        let client = reqwest::Client::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(response) = client
                .get(format!("{}/health", self.base_url))
                .send()
                .await
            {
                if response.status().is_success() {
                    return;
                }
            }
            if tokio::time::Instant::now() > deadline {
                panic!("Test server did not become ready in time");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
