use crate::error::AppError;
use crate::market::binance::{ws_endpoint, RestPriceSource};
use crate::market::fallback::{FallbackCoordinator, FallbackPriceSource};
use crate::market::notifier::UiNotifier;
use crate::market::pipeline::FeedStatusStore;
use crate::market::store::{AssetStore, SharedAssetStore};
use crate::market::types::BridgeConfig;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct PriceFeedHandle {
    pub cancellation_token: CancellationToken,
    pub join_handle: JoinHandle<()>,
    pub fallback: Arc<FallbackCoordinator>,
}

pub struct AppState {
    pub started_at: Instant,
    pub config: Arc<BridgeConfig>,
    pub assets: SharedAssetStore,
    pub notifier: Option<Arc<dyn UiNotifier>>,
    pub price_source: Arc<dyn FallbackPriceSource>,
    pub price_feed: Mutex<Option<PriceFeedHandle>>,
    pub feed_status: Arc<FeedStatusStore>,
}

impl AppState {
    pub fn new(
        config: BridgeConfig,
        notifier: Option<Arc<dyn UiNotifier>>,
    ) -> Result<Self, AppError> {
        let price_source = RestPriceSource::new(
            config.rest_base_url.clone(),
            config.proxy_base_url.clone(),
            config.request_timeout_ms,
        )?;
        Self::with_price_source(config, notifier, Arc::new(price_source))
    }

    pub fn with_price_source(
        config: BridgeConfig,
        notifier: Option<Arc<dyn UiNotifier>>,
        price_source: Arc<dyn FallbackPriceSource>,
    ) -> Result<Self, AppError> {
        let assets = AssetStore::new(&config.assets)?.into_shared();
        let endpoint = ws_endpoint(
            &config.stream_base_url,
            &config.stream_symbols(),
            config.channel,
            config.combined_stream,
        );

        Ok(Self {
            started_at: Instant::now(),
            config: Arc::new(config),
            assets,
            notifier,
            price_source,
            price_feed: Mutex::new(None),
            feed_status: Arc::new(FeedStatusStore::new(endpoint)),
        })
    }
}
