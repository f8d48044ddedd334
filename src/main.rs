use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
use config::{AppConfig, CliConfig, FileConfig};

mod handlers;
use handlers::{CsvExportHandler, EmailSendHandler, HandlerRegistry};

mod job_store;
use job_store::SqliteJobStore;

mod mailer;
use mailer::{HttpMailClient, MailTransport, NoOpMailTransport};

mod queue;
use queue::{Dispatcher, LoggingObserver, QueueBroker, QueueReconciler, RetryPolicy, WorkerPool};

mod server;
use server::{run_server, RequestsLoggingLevel, ServerConfig};

mod sqlite_persistence;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Directory holding the jobs database (and the default output dir).
    #[clap(long, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3000)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Directory where CSV exports are written.
    #[clap(long, value_parser = parse_path)]
    pub output_dir: Option<PathBuf>,

    /// URL of the mail relay service for EMAIL_SEND jobs.
    #[clap(long)]
    pub mail_url: Option<String>,

    /// Timeout in seconds for mail relay requests.
    #[clap(long, default_value_t = 30)]
    pub mail_timeout_sec: u64,

    /// Sender address for outgoing mail.
    #[clap(long, default_value = "noreply@example.com")]
    pub mail_from: String,

    /// Path to a TOML config file; its values override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            db_dir: self.db_dir.clone(),
            port: self.port,
            logging_level: self.logging_level.clone(),
            output_dir: self.output_dir.clone(),
            mail_url: self.mail_url.clone(),
            mail_timeout_sec: self.mail_timeout_sec,
            mail_from: self.mail_from.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Opening jobs database at {:?}...", config.jobs_db_path());
    let store = Arc::new(SqliteJobStore::new(config.jobs_db_path())?);

    // Mail transport: HTTP relay when configured, otherwise log-only
    let mail_transport: Arc<dyn MailTransport> = match &config.mail.relay_url {
        Some(url) => {
            info!("Mail relay configured at {}", url);
            Arc::new(HttpMailClient::new(url.clone(), config.mail.timeout_sec)?)
        }
        None => Arc::new(NoOpMailTransport),
    };

    let mut registry = HandlerRegistry::new();
    registry.register(
        "CSV_EXPORT",
        Arc::new(CsvExportHandler::new(config.output_dir.clone())),
    );
    registry.register(
        "EMAIL_SEND",
        Arc::new(EmailSendHandler::new(
            mail_transport,
            config.mail.from.clone(),
        )),
    );
    let registry = Arc::new(registry);
    info!("Registered job types: {:?}", registry.job_types());

    let broker = Arc::new(QueueBroker::new(&config.queue));
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), broker.clone()));

    let shutdown = CancellationToken::new();

    // Rebuild the lanes from any records left over from a previous run,
    // then keep sweeping for orphans periodically
    let reconciler = QueueReconciler::new(store.clone(), broker.clone(), &config.reconciler);
    match reconciler.recover_pending() {
        Ok(count) if count > 0 => info!("Recovered {} pending jobs into the queues", count),
        Ok(_) => {}
        Err(e) => error!("Failed to recover pending jobs: {:#}", e),
    }
    let reconciler_handle = tokio::spawn(reconciler.run(shutdown.clone()));

    let mut worker_pool = WorkerPool::new(
        store.clone(),
        broker.clone(),
        registry,
        RetryPolicy::new(&config.retry),
    );
    worker_pool.add_observer(Arc::new(LoggingObserver));
    let worker_handles = Arc::new(worker_pool).spawn(shutdown.clone());

    // Cancel everything on SIGINT/SIGTERM
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                let mut sigterm =
                    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                        .expect("Failed to install SIGTERM handler");
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
            }
            info!("Termination signal received, shutting down...");
            shutdown.cancel();
        });
    }

    info!("Ready to serve at port {}!", config.port);
    let server_config = ServerConfig {
        requests_logging_level: config.logging_level.clone(),
        port: config.port,
    };
    run_server(store, dispatcher, server_config, shutdown.clone()).await?;

    // The server only returns once shutdown is cancelled; wait for
    // in-flight executions to finish before exiting
    shutdown.cancel();
    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = reconciler_handle.await;

    info!("Shut down cleanly");
    Ok(())
}
