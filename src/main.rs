/*****************************************************************************************
 *
 *  websub-hub – WebSub-style publish/subscribe hub
 *  ------------------------------------------------
 *
 *  Intent verification + signed fan-out, subscriptions persisted as a JSON snapshot
 *
 *****************************************************************************************/

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::FmtSubscriber;

use websub_hub::persistence::JsonFileSnapshot;
use websub_hub::{build_app, AppConfig, Args, HubController, SubscriptionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    //
    // ────────────────────────────────────────────────────────
    //  Locate and load configuration
    // ────────────────────────────────────────────────────────
    //
    let args = Args::parse();
    let config_path = AppConfig::locate(args.config)?;
    let cfg = AppConfig::load_from_file(&config_path)?;

    //
    // ────────────────────────────────────────────────────────
    //  Configure logging
    // ────────────────────────────────────────────────────────
    //
    let level = match cfg.log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info"  => LevelFilter::INFO,
        "warn"  => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    tracing::info!("Loaded config from {}", config_path.display());
    tracing::info!("Starting websub-hub…");
    tracing::info!("Loaded configuration: {:?}", cfg);

    //
    // ────────────────────────────────────────────────────────
    //  Load subscriptions from the snapshot
    // ────────────────────────────────────────────────────────
    //
    let backend = Arc::new(JsonFileSnapshot::new(&cfg.snapshot_path));
    let store = SubscriptionStore::load(backend)
        .await
        .with_context(|| format!("failed to load snapshot {}", cfg.snapshot_path))?;
    let store = Arc::new(store);

    //
    // ────────────────────────────────────────────────────────
    //  Build hub + Axum app
    // ────────────────────────────────────────────────────────
    //
    let hub = Arc::new(HubController::from_config(&cfg, store.clone()));
    let app = build_app(hub, cfg.clone());

    tracing::warn!("Publish requests are not authenticated; restrict access to POST / at the network boundary");

    //
    // ────────────────────────────────────────────────────────
    //  Bind server and start listening
    // ────────────────────────────────────────────────────────
    //
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown(store))
        .await
        .context("server error")?;

    Ok(())
}

//
// ─────────────────────────────────────────────────────────────
//  Graceful shutdown handler
// ─────────────────────────────────────────────────────────────
//
async fn shutdown(store: Arc<SubscriptionStore>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }

    tracing::warn!("CTRL+C received — saving snapshot…");
    store.persist().await;
    tracing::info!("Snapshot saved. Goodbye.");
}
