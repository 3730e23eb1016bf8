use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use retrack_core::config::NotifierBackend;
use retrack_core::{
    load_config, validate_config, ForumFetcher, LogNotifier, Notifier, PageFetcher,
    QBittorrentStore, Reconciler, SeriesRepository, SqliteSeriesRepository, TelegramNotifier,
    TorrentStore,
};

use retrack_server::api::create_router;
use retrack_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("RETRACK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Version: {}", VERSION);
    info!("Auth method: {:?}", config.auth.method);
    info!("Database path: {:?}", config.database.path);

    // Config hash, logged so a deployed instance can be matched to its config
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!("Config hash: {}", &config_hash[..16]);

    // Create the page fetcher
    info!("Initializing forum fetcher for {}", config.fetcher.base_url);
    let fetcher: Arc<dyn PageFetcher> = Arc::new(
        ForumFetcher::new(config.fetcher.clone()).context("Failed to create forum fetcher")?,
    );

    // Create the torrent store
    info!("Initializing qBittorrent store at {}", config.store.url);
    let store: Arc<dyn TorrentStore> = Arc::new(
        QBittorrentStore::new(config.store.clone()).context("Failed to create torrent store")?,
    );

    // Create the series repository
    let repo: Arc<dyn SeriesRepository> = Arc::new(
        SqliteSeriesRepository::new(&config.database.path)
            .context("Failed to open series database")?,
    );
    info!("Series repository initialized");

    // Create the notifier
    let notifier: Arc<dyn Notifier> = match config.notifier.backend {
        NotifierBackend::Telegram => match &config.notifier.telegram {
            Some(telegram_config) => {
                info!("Initializing Telegram notifier");
                Arc::new(TelegramNotifier::new(telegram_config.clone()))
            }
            None => {
                // Rejected by validate_config; kept as a fallback.
                error!("Telegram backend selected but no telegram config provided");
                Arc::new(LogNotifier::new())
            }
        },
        NotifierBackend::Log => {
            info!("Using log notifier");
            Arc::new(LogNotifier::new())
        }
    };

    // Create the reconciliation engine
    let engine = Arc::new(Reconciler::new(
        fetcher,
        store,
        repo,
        notifier,
        config.scheduler.clone(),
        config.store.delete_files,
    ));

    if config.scheduler.enabled {
        engine.start();
        info!(
            interval_secs = config.scheduler.poll_interval_secs,
            "Reconciliation scheduler started"
        );
    } else {
        info!("Scheduler disabled in config, reconciliation runs on demand only");
    }

    // Create app state and router
    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&engine)));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    if config.scheduler.enabled {
        engine.stop();
        info!("Scheduler stopped");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
