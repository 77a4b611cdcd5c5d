use anyhow::Context;
use clap::Parser;
use ragram::api::{self, app_state::AppState};
use ragram::config::ConfigLoader;
use ragram::observability::{
    AppMetrics, HealthCheckResult, ObservabilityState, create_observability_router,
    init_tracing, metrics_middleware,
};
use ragram::services::KnowledgeBase;
use ragram::telegram::{CommandHandler, Dispatcher, TelegramClient};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Question answering over a website, on Telegram and HTTP
#[derive(Parser, Debug)]
#[command(name = "ragram", version, about)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "RAGRAM_CONFIG")]
    config: Option<PathBuf>,

    /// Serve the HTTP API only, even when a bot token is configured
    #[arg(long)]
    no_telegram: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from(path.clone()),
        None => ConfigLoader::load(),
    }
    .context("failed to load configuration")?;
    ConfigLoader::validate(&config).context("invalid configuration")?;

    let _log_guard = init_tracing(&config.logging).context("failed to initialize logging")?;
    info!("Starting ragram {}...", env!("CARGO_PKG_VERSION"));

    config
        .storage
        .ensure_dirs()
        .with_context(|| format!("failed to create {}", config.storage.data_dir.display()))?;

    let metrics = Arc::new(AppMetrics::new().context("failed to register metrics")?);
    let observability_state = Arc::new(ObservabilityState::new(
        env!("CARGO_PKG_VERSION"),
        metrics.clone(),
    ));

    let knowledge_base = match KnowledgeBase::open(config.clone()).await {
        Ok(kb) => {
            let stats = kb.stats();
            info!(
                "Knowledge base ready: {} chunks from {} pages",
                stats.chunks, stats.documents
            );
            metrics.indexed_chunks.set(stats.chunks as i64);
            observability_state
                .set_health_check(HealthCheckResult {
                    name: "knowledge_base".into(),
                    healthy: true,
                    message: format!("{} chunks", stats.chunks),
                })
                .await;
            Some(Arc::new(kb))
        }
        Err(e) => {
            error!("Failed to initialize the knowledge base: {}", e);
            observability_state
                .set_health_check(HealthCheckResult {
                    name: "knowledge_base".into(),
                    healthy: false,
                    message: e.to_string(),
                })
                .await;
            None
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let telegram_task = if config.telegram_enabled() && !cli.no_telegram {
        let client = TelegramClient::new(&config.telegram)?;
        let handler = CommandHandler::new(
            client.clone(),
            knowledge_base.clone(),
            metrics.clone(),
            &config,
        );
        let dispatcher = Dispatcher::new(
            client,
            handler,
            metrics.clone(),
            config.telegram.poll_timeout_secs,
        );
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = dispatcher.run(wait_for_shutdown(rx)).await {
                error!("Telegram bot stopped: {}", e);
            }
        }))
    } else {
        warn!("Telegram bot disabled, serving the HTTP API only");
        None
    };

    let app_state = AppState::new(knowledge_base, metrics);
    let router = create_observability_router(observability_state.clone())
        .merge(api::create_router(app_state))
        .layer(axum::middleware::from_fn_with_state(
            observability_state,
            metrics_middleware,
        ));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .await?;

    if let Some(task) = telegram_task {
        let _ = task.await;
    }
    info!("Stopped");
    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
