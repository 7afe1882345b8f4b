use crate::market::store::SharedAssetStore;
use crate::market::types::{AssetRecord, PriceDirection};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Rendering collaborator. `asset_updated` follows every reconciled update,
/// `refresh` the periodic sync tick. Implementations must not block.
pub trait UiNotifier: Send + Sync {
    fn asset_updated(&self, updated: &AssetRecord, assets: &[AssetRecord]);
    fn refresh(&self, assets: &[AssetRecord]);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl UiNotifier for TracingNotifier {
    fn asset_updated(&self, updated: &AssetRecord, _assets: &[AssetRecord]) {
        tracing::info!(
            target: "live_feed_bridge::ui",
            asset = %updated.id,
            price = %format_price(updated.price),
            high = %format_price(updated.high),
            low = %format_price(updated.low),
            change = %format_change(updated),
            "{} {}",
            updated.name,
            updated.symbol
        );
    }

    fn refresh(&self, assets: &[AssetRecord]) {
        for asset in assets.iter().filter(|asset| asset.has_price()) {
            tracing::debug!(
                target: "live_feed_bridge::ui",
                asset = %asset.id,
                price = %format_price(asset.price),
                change = %format_change(asset),
                "{} {}",
                asset.name,
                asset.symbol
            );
        }
    }
}

pub fn format_price(value: f64) -> String {
    if !value.is_finite() {
        return "0.00".to_string();
    }
    format!("{value:.2}")
}

pub fn format_change(asset: &AssetRecord) -> String {
    let magnitude = asset.change().abs();
    match asset.direction() {
        PriceDirection::Up => format!("▲ +{magnitude:.2}"),
        PriceDirection::Down => format!("▼ {magnitude:.2}"),
        PriceDirection::Flat => "0.00".to_string(),
    }
}

pub async fn run_ui_sync_loop(
    store: SharedAssetStore,
    notifier: Arc<dyn UiNotifier>,
    interval_ms: u64,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                let snapshot = store.lock().snapshot();
                notifier.refresh(&snapshot);
            }
        }
    }
}
