use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_appender::non_blocking::WorkerGuard;

use mail_triage::config::{LlmConfig, NotifyConfig, ServerConfig, SyncConfig};
use mail_triage::health::health_routes;
use mail_triage::llm::create_provider;
use mail_triage::notify::Notifier;
use mail_triage::pipeline::Classifier;
use mail_triage::store::{IngestionSink, LibSqlSink, MemorySink};
use mail_triage::sync::{ImapConnector, Supervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let server = ServerConfig::from_env();
    let _log_guard = init_tracing(&server);

    eprintln!("📬 Mail triage v{}", env!("CARGO_PKG_VERSION"));

    // ── Sink ─────────────────────────────────────────────────────────────
    let sink: Arc<dyn IngestionSink> = match LibSqlSink::new_local(&server.db_path).await {
        Ok(sink) => {
            eprintln!("   Database: {}", server.db_path.display());
            Arc::new(sink)
        }
        Err(e) => {
            tracing::error!(error = %e, path = %server.db_path.display(), "Database unavailable, using in-memory sink");
            eprintln!("   Database: in-memory (failed to open {})", server.db_path.display());
            Arc::new(MemorySink::new())
        }
    };

    // ── Classification ───────────────────────────────────────────────────
    let llm = match LlmConfig::from_env() {
        Some(cfg) => match create_provider(&cfg) {
            Ok(provider) => {
                eprintln!("   Model: {}", provider.model_name());
                Some(provider)
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM provider unavailable, heuristics only");
                None
            }
        },
        None => {
            eprintln!("   Model: none (OPENROUTER_API_KEY not set, heuristics only)");
            None
        }
    };

    let notifier = Arc::new(Notifier::from_config(&NotifyConfig::from_env()));
    let classifier = Arc::new(Classifier::new(llm, Arc::clone(&sink), notifier));

    // ── Sync ─────────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let supervisor = match SyncConfig::from_env() {
        Ok(Some(config)) => {
            eprintln!("   Accounts: {}", config.accounts.len());
            let supervisor = Supervisor::new(
                config,
                Arc::new(ImapConnector::new()),
                Arc::clone(&sink),
                classifier,
            );
            Some(supervisor.spawn(shutdown_rx.clone()))
        }
        Ok(None) => {
            eprintln!("   Accounts: none (IMAP_ACCOUNTS_JSON not set, sync disabled)");
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "Invalid account configuration, sync disabled");
            eprintln!("   Accounts: sync disabled ({e})");
            None
        }
    };

    // ── Liveness ─────────────────────────────────────────────────────────
    let statuses = supervisor
        .as_ref()
        .map(|s| s.statuses.clone())
        .unwrap_or_default();
    let app = health_routes(statuses);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", server.port))
        .await
        .with_context(|| format!("Failed to bind port {}", server.port))?;
    tracing::info!(port = server.port, "Health endpoint listening");
    eprintln!("   Health: http://0.0.0.0:{}/health\n", server.port);

    let mut server_shutdown = shutdown_rx.clone();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                mail_triage::sync::connection::shutdown_signalled(&mut server_shutdown).await;
            })
            .await
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");
    shutdown_tx.send_replace(true);

    if let Some(supervisor) = supervisor {
        supervisor.join().await;
    }
    match server_task.await {
        Ok(Err(e)) => tracing::warn!(error = %e, "Health server error"),
        Err(e) => tracing::warn!(error = %e, "Health server task failed"),
        Ok(Ok(())) => {}
    }

    tracing::info!("Stopped");
    Ok(())
}

/// stdout by default; daily-rotated file under `LOG_DIR` when set.
fn init_tracing(server: &ServerConfig) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match &server.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "mail-triage.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
            None
        }
    }
}
