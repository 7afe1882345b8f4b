use crate::error::AppError;
use crate::market::fallback::FallbackCoordinator;
use crate::state::AppState;
use std::sync::Arc;

fn normalize_asset_id(asset_id: &str) -> Result<String, AppError> {
    let normalized = asset_id.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Err(AppError::InvalidArgument(
            "assetId must not be empty".to_string(),
        ));
    }
    Ok(normalized)
}

async fn running_coordinator(state: &AppState) -> Result<Arc<FallbackCoordinator>, AppError> {
    let feed_slot = state.price_feed.lock().await;
    feed_slot
        .as_ref()
        .map(|handle| Arc::clone(&handle.fallback))
        .ok_or_else(|| AppError::InvalidArgument("price feed is not running".to_string()))
}

/// Forces REST polling for one fallback asset. The poller runs until a manual
/// stop or the next live update for the asset, which hands control back to
/// the staleness policy.
pub async fn start_fallback_poller(state: &AppState, asset_id: &str) -> Result<bool, AppError> {
    let asset_id = normalize_asset_id(asset_id)?;
    let coordinator = running_coordinator(state).await?;
    coordinator.start_poller(&asset_id)
}

pub async fn stop_fallback_poller(state: &AppState, asset_id: &str) -> Result<bool, AppError> {
    let asset_id = normalize_asset_id(asset_id)?;
    let coordinator = running_coordinator(state).await?;
    coordinator.stop_poller(&asset_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::price_feed::{
        asset_snapshot, price_feed_status, start_price_feed, stop_price_feed,
    };
    use crate::commands::test_support::offline_state;
    use std::time::Duration;

    #[tokio::test]
    async fn rejects_poller_commands_without_running_feed() {
        let state = offline_state().await;

        let result = start_fallback_poller(&state, "xauusd").await;
        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
        let result = stop_fallback_poller(&state, "xauusd").await;
        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn manual_poller_applies_rest_price() {
        let state = offline_state().await;
        start_price_feed(&state).await.expect("feed should start");

        let replaced = start_fallback_poller(&state, " XAUUSD ")
            .await
            .expect("poller should start");
        assert!(!replaced);

        let mut priced = false;
        for _ in 0..50 {
            let gold = asset_snapshot(&state)
                .into_iter()
                .find(|asset| asset.id == "xauusd")
                .expect("gold should be in the roster");
            if gold.has_price() {
                assert_eq!(gold.price, 2_650.0);
                priced = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(priced, "poller should have applied a price");

        let stopped = stop_fallback_poller(&state, "xauusd")
            .await
            .expect("poller should stop");
        assert!(stopped);
        let stopped_again = stop_fallback_poller(&state, "xauusd")
            .await
            .expect("second stop is a no-op");
        assert!(!stopped_again);

        stop_price_feed(&state).await.expect("feed should stop");
    }

    #[tokio::test]
    async fn manual_poller_stays_active_across_supervisor_ticks() {
        let state = offline_state().await;
        start_price_feed(&state).await.expect("feed should start");

        start_fallback_poller(&state, "xauusd")
            .await
            .expect("poller should start");
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = price_feed_status(&state).await.expect("status should read");
        assert_eq!(status.fallback_active, vec!["xauusd".to_string()]);

        stop_fallback_poller(&state, "xauusd")
            .await
            .expect("poller should stop");
        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = price_feed_status(&state).await.expect("status should read");
        assert!(status.fallback_active.is_empty());

        stop_price_feed(&state).await.expect("feed should stop");
    }

    #[tokio::test]
    async fn unknown_or_empty_assets_are_rejected() {
        let state = offline_state().await;
        start_price_feed(&state).await.expect("feed should start");

        let unknown = start_fallback_poller(&state, "btcusd").await;
        assert!(matches!(unknown, Err(AppError::UnknownAsset(_))));
        let empty = start_fallback_poller(&state, "  ").await;
        assert!(matches!(empty, Err(AppError::InvalidArgument(_))));

        stop_price_feed(&state).await.expect("feed should stop");
    }
}
