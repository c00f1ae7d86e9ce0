use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chan_filter_watch::catalog::HttpCatalogFetcher;
use chan_filter_watch::config::Config;
use chan_filter_watch::db::{list_pins, Database};
use chan_filter_watch::filter::{FilterEngine, WatchFile};
use chan_filter_watch::watch::{
    schedule, Collaborators, Coordinator, CoordinatorOptions, LoggingKeepAlive,
};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting chan-filter-watch");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let watch_file = WatchFile::load(&config.watch_file).context("Failed to load watch file")?;
    let rules = watch_file.filter_rules()?;
    let invalid = rules.iter().filter(|rule| !rule.is_valid()).count();
    let filters = Arc::new(FilterEngine::new(rules));
    let saved_boards = Arc::new(watch_file.saved_boards());

    info!(
        watch_file = %config.watch_file.display(),
        sites = watch_file.sites.len(),
        filters = watch_file.filters.len(),
        watch_filters = filters.enabled_watch_filters().len(),
        invalid_filters = invalid,
        "Watch file loaded"
    );

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let db = Database::new(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    let pins = list_pins(db.pool()).await?;
    info!(pins = pins.len(), "Database initialized");

    let fetcher = HttpCatalogFetcher::new(
        watch_file.api_bases()?,
        &config.user_agent,
        config.fetch_timeout,
    )?;

    let db = Arc::new(db);
    let coordinator = Coordinator::new(
        Arc::clone(&filters),
        Collaborators {
            fetcher: Arc::new(fetcher),
            pins: db.clone(),
            boards: saved_boards,
            keep_alive: Arc::new(LoggingKeepAlive::new()),
            state: db,
        },
        CoordinatorOptions::from(&config),
    )
    .await;

    let shutdown = CancellationToken::new();

    #[cfg(unix)]
    let reload_handle = tokio::spawn(reload_on_hangup(
        config.watch_file.clone(),
        Arc::clone(&filters),
        shutdown.clone(),
    ));

    info!(interval_secs = config.poll_interval.as_secs(), "Starting filter watch");
    let poll_handle = tokio::spawn(schedule::poll_loop(
        coordinator,
        config.poll_interval,
        shutdown.clone(),
    ));

    shutdown_signal().await;

    info!("Shutting down...");
    shutdown.cancel();

    if let Err(e) = poll_handle.await {
        error!("Scheduler task panicked: {e}");
    }
    #[cfg(unix)]
    reload_handle.abort();

    info!("Shutdown complete");

    Ok(())
}

/// Reload filters from the watch file on SIGHUP. Site and board changes need
/// a restart.
#[cfg(unix)]
async fn reload_on_hangup(
    path: std::path::PathBuf,
    filters: Arc<FilterEngine>,
    shutdown: CancellationToken,
) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!("Failed to install SIGHUP handler, filter reload disabled: {e}");
            return;
        }
    };

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            received = hangup.recv() => {
                if received.is_none() {
                    break;
                }
                match WatchFile::load(&path).and_then(|file| file.filter_rules()) {
                    Ok(rules) => {
                        let count = rules.len();
                        filters.replace(rules);
                        info!(filters = count, "Filters reloaded");
                    }
                    Err(e) => warn!("Failed to reload watch file, keeping old filters: {e}"),
                }
            }
        }
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chan_filter_watch=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
