mod api;
mod metrics;
mod telegram;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roundnote_core::{
    load_config, load_config_from_env, validate_config, Config, Dispatcher, FfmpegConverter,
    JobPipeline, SanitizedConfig, WorkspaceManager,
};

use telegram::{Poller, TelegramTransport};

/// Application version
pub(crate) const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer between the poller and the dispatcher.
const EVENT_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let config = match load() {
        Ok(config) => config,
        Err(e) => {
            init_logging(false);
            return Err(e);
        }
    };
    init_logging(config.logging.json);

    validate_config(&config).context("Configuration validation failed")?;
    info!(version = VERSION, "Configuration loaded successfully");
    match serde_json::to_string(&SanitizedConfig::from(&config)) {
        Ok(json) => info!(config = %json, "Effective configuration"),
        Err(e) => warn!(error = %e, "Could not serialize configuration"),
    }

    let converter = Arc::new(FfmpegConverter::new(config.converter.clone()));
    converter
        .validate()
        .await
        .context("ffmpeg/ffprobe are not usable")?;

    let transport = Arc::new(
        TelegramTransport::new(config.telegram.clone())
            .context("Failed to create Telegram client")?,
    );
    let me = transport
        .get_me()
        .await
        .context("Telegram rejected the bot token")?;
    info!(
        bot_id = me.id,
        username = me.username.as_deref().unwrap_or("-"),
        "Connected to Telegram"
    );

    let workspaces = Arc::new(WorkspaceManager::new(config.workspace.clone()));
    info!("Temporary files under {:?}", workspaces.root());

    let pipeline = JobPipeline::new(
        transport.clone(),
        converter.clone(),
        converter,
        workspaces,
        config.transform.clone(),
    )
    .with_messages(config.messages.clone())
    .with_config(config.pipeline.clone());

    let dispatcher = Arc::new(Dispatcher::new(pipeline, config.dispatcher.clone()));

    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher_handle = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.run(events_rx).await })
    };
    let poller_handle = tokio::spawn(
        Poller::new(Arc::clone(&transport), events_tx, shutdown_rx.clone()).run(),
    );

    let metrics_handle = if config.metrics.enabled {
        let addr = config.metrics.listen;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind metrics endpoint to {}", addr))?;
        info!("Serving /metrics and /health on {}", addr);

        let app = api::create_router(Arc::clone(&dispatcher));
        let mut shutdown = shutdown_rx;
        Some(tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown.changed().await;
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "Metrics server error");
            }
        }))
    } else {
        None
    };

    shutdown_signal().await;
    info!("Shutting down...");

    // Stop taking updates; the poller drops its sender, which ends the
    // dispatcher loop once buffered events are handled.
    let _ = shutdown_tx.send(true);
    if let Err(e) = poller_handle.await {
        error!(error = %e, "Poller task failed");
    }
    if let Err(e) = dispatcher_handle.await {
        error!(error = %e, "Dispatcher task failed");
    }

    let timeout = config.dispatcher.drain_timeout();
    if dispatcher.drain(timeout).await {
        info!("All jobs finished");
    } else {
        warn!(
            timeout_secs = timeout.as_secs(),
            "Jobs still running after drain timeout"
        );
    }

    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }

    Ok(())
}

/// Loads config from `ROUNDNOTE_CONFIG`, `./config.toml`, or the environment alone.
fn load() -> Result<Config> {
    let config_path = std::env::var("ROUNDNOTE_CONFIG")
        .ok()
        .map(PathBuf::from)
        .or_else(|| Some(PathBuf::from("config.toml")).filter(|path| path.exists()));

    match config_path {
        Some(path) => load_config(&path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => load_config_from_env().context("Failed to load config from environment"),
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,roundnote=debug,roundnote_core=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
