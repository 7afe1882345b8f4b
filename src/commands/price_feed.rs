use crate::error::AppError;
use crate::market::fallback::{FallbackCoordinator, FallbackSettings};
use crate::market::pipeline::{run_bridge, BridgeRuntime};
use crate::market::store::PriceReconciler;
use crate::market::symbols::SymbolMapper;
use crate::market::types::{
    AssetRecord, BridgeStatus, FeedConnectionState, FeedSession, FeedStopResult,
};
use crate::state::{AppState, PriceFeedHandle};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn stop_existing_feed(state: &AppState) -> bool {
    let existing_handle = {
        let mut feed_slot = state.price_feed.lock().await;
        feed_slot.take()
    };

    match existing_handle {
        Some(handle) => {
            handle.cancellation_token.cancel();
            handle.fallback.shutdown();
            let _ = handle.join_handle.await;
            true
        }
        None => false,
    }
}

/// Starts the live feed, replacing any feed already running.
pub async fn start_price_feed(state: &AppState) -> Result<FeedSession, AppError> {
    stop_existing_feed(state).await;

    state.feed_status.reset().await;

    let config = Arc::clone(&state.config);
    let cancellation_token = CancellationToken::new();
    let reconciler = PriceReconciler::new(Arc::clone(&state.assets), state.notifier.clone());
    let fallback = Arc::new(FallbackCoordinator::new(
        &config.fallback_targets,
        FallbackSettings::from(config.as_ref()),
        Arc::clone(&state.price_source),
        reconciler.clone(),
        cancellation_token.child_token(),
    ));

    let runtime = BridgeRuntime {
        mapper: SymbolMapper::from_roster(&config.assets, &config.fallback_targets),
        config: Arc::clone(&config),
        reconciler,
        fallback: Arc::clone(&fallback),
        status: Arc::clone(&state.feed_status),
    };
    let endpoint = runtime.endpoint();
    let join_handle = tokio::spawn(run_bridge(runtime, cancellation_token.clone()));

    {
        let mut feed_slot = state.price_feed.lock().await;
        *feed_slot = Some(PriceFeedHandle {
            cancellation_token,
            join_handle,
            fallback,
        });
    }

    Ok(FeedSession {
        running: true,
        endpoint,
        channel: config.channel,
        assets: config.assets.iter().map(|seed| seed.id.clone()).collect(),
        fallback_assets: config
            .fallback_targets
            .iter()
            .map(|target| target.asset_id.clone())
            .collect(),
    })
}

/// Stops the feed with a normal closure; no reconnect or poll is scheduled
/// after this returns.
pub async fn stop_price_feed(state: &AppState) -> Result<FeedStopResult, AppError> {
    let stopped = stop_existing_feed(state).await;
    if stopped {
        tracing::info!("price feed stopped by command");
    } else {
        state
            .feed_status
            .publish(
                FeedConnectionState::Stopped,
                0,
                None,
                Some("feed was not running".to_string()),
            )
            .await;
    }
    Ok(FeedStopResult { stopped })
}

pub async fn price_feed_status(state: &AppState) -> Result<BridgeStatus, AppError> {
    let feed = state.feed_status.current().await;
    let fallback_active = {
        let feed_slot = state.price_feed.lock().await;
        feed_slot
            .as_ref()
            .map(|handle| handle.fallback.active_pollers())
            .unwrap_or_default()
    };

    Ok(BridgeStatus {
        feed,
        fallback_active,
        uptime_ms: state.started_at.elapsed().as_millis(),
    })
}

pub fn asset_snapshot(state: &AppState) -> Vec<AssetRecord> {
    state.assets.lock().snapshot()
}
