pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod market;
pub mod offline;
pub mod state;

use commands::price_feed::{price_feed_status, start_price_feed, stop_price_feed};
use error::AppError;
use market::notifier::TracingNotifier;
use state::AppState;
use std::sync::Arc;

/// Boots the bridge on a single-threaded reactor and runs it until Ctrl+C.
pub fn run() -> Result<(), AppError> {
    let cfg = config::load()?;
    logging::init_tracing(&cfg.logging);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let state = AppState::new(cfg.bridge, Some(Arc::new(TracingNotifier)))?;

        let session = start_price_feed(&state).await?;
        tracing::info!(
            endpoint = %session.endpoint,
            channel = session.channel.as_str(),
            assets = session.assets.len(),
            fallback = ?session.fallback_assets,
            "live feed bridge started"
        );

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutdown signal received");

        let status = price_feed_status(&state).await?;
        stop_price_feed(&state).await?;
        let uptime_ms = u64::try_from(status.uptime_ms).unwrap_or(u64::MAX);
        tracing::info!(
            frames_applied = status.feed.frames_applied,
            frames_dropped = status.feed.frames_dropped,
            uptime_ms,
            "live feed bridge stopped"
        );
        Ok::<(), AppError>(())
    })
}
