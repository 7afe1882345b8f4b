use crate::error::AppError;
use crate::market::store::PriceReconciler;
use crate::market::types::{BridgeConfig, FallbackTarget};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait FallbackPriceSource: Send + Sync {
    async fn fetch_price(&self, rest_symbol: &str) -> Result<f64, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackAction {
    Start,
    Stop,
    Keep,
}

pub fn fallback_action(
    last_channel_update: Instant,
    now: Instant,
    timeout: Duration,
    poller_active: bool,
) -> FallbackAction {
    let stale = now.saturating_duration_since(last_channel_update) > timeout;
    match (stale, poller_active) {
        (true, false) => FallbackAction::Start,
        (false, true) => FallbackAction::Stop,
        _ => FallbackAction::Keep,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FallbackSettings {
    pub staleness_check: Duration,
    pub staleness_timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&BridgeConfig> for FallbackSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            staleness_check: Duration::from_millis(config.staleness_check_ms),
            staleness_timeout: Duration::from_millis(config.staleness_timeout_ms),
            poll_interval: Duration::from_millis(config.fallback_poll_ms),
        }
    }
}

struct PollerHandle {
    cancellation_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

impl PollerHandle {
    fn stop(self) {
        self.cancellation_token.cancel();
        drop(self.join_handle);
    }
}

// Set by a manual start/stop; the staleness policy leaves the slot alone
// until the live channel delivers again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManualOverride {
    Started,
    Stopped,
}

struct FallbackSlot {
    target: FallbackTarget,
    last_channel_update: Instant,
    poller: Option<PollerHandle>,
    manual: Option<ManualOverride>,
}

pub struct FallbackCoordinator {
    settings: FallbackSettings,
    source: Arc<dyn FallbackPriceSource>,
    reconciler: PriceReconciler,
    slots: Mutex<HashMap<String, FallbackSlot>>,
    cancel_token: CancellationToken,
}

impl FallbackCoordinator {
    pub fn new(
        targets: &[FallbackTarget],
        settings: FallbackSettings,
        source: Arc<dyn FallbackPriceSource>,
        reconciler: PriceReconciler,
        cancel_token: CancellationToken,
    ) -> Self {
        let started_at = Instant::now();
        let slots = targets
            .iter()
            .map(|target| {
                (
                    target.asset_id.clone(),
                    FallbackSlot {
                        target: target.clone(),
                        last_channel_update: started_at,
                        poller: None,
                        manual: None,
                    },
                )
            })
            .collect();

        Self {
            settings,
            source,
            reconciler,
            slots: Mutex::new(slots),
            cancel_token,
        }
    }

    pub fn settings(&self) -> FallbackSettings {
        self.settings
    }

    pub fn record_channel_update(&self, asset_id: &str, now: Instant) {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(asset_id) else {
            return;
        };
        slot.last_channel_update = now;
        slot.manual = None;
        if let Some(poller) = slot.poller.take() {
            poller.stop();
            tracing::info!(asset = asset_id, "live channel resumed, fallback poller stopped");
        }
    }

    pub fn reconcile(&self, now: Instant) {
        if self.cancel_token.is_cancelled() {
            return;
        }

        let mut slots = self.slots.lock();
        for (asset_id, slot) in slots.iter_mut() {
            if slot.manual.is_some() {
                continue;
            }
            let action = fallback_action(
                slot.last_channel_update,
                now,
                self.settings.staleness_timeout,
                slot.poller.is_some(),
            );
            match action {
                FallbackAction::Start => {
                    let silent_ms = now
                        .saturating_duration_since(slot.last_channel_update)
                        .as_millis() as u64;
                    tracing::warn!(
                        asset = %asset_id,
                        silent_ms,
                        "live channel stale, starting fallback poller"
                    );
                    slot.poller = Some(self.spawn_poller(&slot.target));
                }
                FallbackAction::Stop => {
                    if let Some(poller) = slot.poller.take() {
                        poller.stop();
                    }
                    tracing::info!(asset = %asset_id, "live channel fresh, fallback poller stopped");
                }
                FallbackAction::Keep => {}
            }
        }
    }

    pub fn start_poller(&self, asset_id: &str) -> Result<bool, AppError> {
        if self.cancel_token.is_cancelled() {
            return Err(AppError::InvalidArgument(
                "price feed is shutting down".to_string(),
            ));
        }

        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(asset_id)
            .ok_or_else(|| AppError::UnknownAsset(asset_id.to_string()))?;

        let replaced = match slot.poller.take() {
            Some(existing) => {
                existing.stop();
                true
            }
            None => false,
        };
        slot.poller = Some(self.spawn_poller(&slot.target));
        slot.manual = Some(ManualOverride::Started);
        tracing::info!(asset = asset_id, replaced, "fallback poller started manually");
        Ok(replaced)
    }

    pub fn stop_poller(&self, asset_id: &str) -> Result<bool, AppError> {
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(asset_id)
            .ok_or_else(|| AppError::UnknownAsset(asset_id.to_string()))?;

        let stopped = match slot.poller.take() {
            Some(poller) => {
                poller.stop();
                true
            }
            None => false,
        };
        slot.manual = Some(ManualOverride::Stopped);
        if stopped {
            tracing::info!(asset = asset_id, "fallback poller stopped manually");
        }
        Ok(stopped)
    }

    pub fn active_pollers(&self) -> Vec<String> {
        let mut active: Vec<String> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.poller.is_some())
            .map(|(asset_id, _)| asset_id.clone())
            .collect();
        active.sort_unstable();
        active
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
        let mut slots = self.slots.lock();
        for slot in slots.values_mut() {
            if let Some(poller) = slot.poller.take() {
                poller.stop();
            }
        }
    }

    fn spawn_poller(&self, target: &FallbackTarget) -> PollerHandle {
        let cancellation_token = self.cancel_token.child_token();
        let join_handle = tokio::spawn(run_fallback_poll_loop(
            target.clone(),
            Arc::clone(&self.source),
            self.reconciler.clone(),
            self.settings.poll_interval,
            cancellation_token.clone(),
        ));
        PollerHandle {
            cancellation_token,
            join_handle,
        }
    }
}

async fn run_fallback_poll_loop(
    target: FallbackTarget,
    source: Arc<dyn FallbackPriceSource>,
    reconciler: PriceReconciler,
    poll_interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let fetched = tokio::select! {
            _ = cancel_token.cancelled() => break,
            fetched = source.fetch_price(&target.rest_symbol) => fetched,
        };

        match fetched {
            Ok(price) => {
                if reconciler.apply(&target.asset_id, price, None, None) {
                    tracing::debug!(asset = %target.asset_id, price, "fallback price applied");
                }
            }
            Err(error) => {
                tracing::warn!(
                    asset = %target.asset_id,
                    symbol = %target.rest_symbol,
                    %error,
                    "fallback price fetch failed, retrying next cycle"
                );
            }
        }
    }
}

pub async fn run_staleness_supervisor(
    coordinator: Arc<FallbackCoordinator>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(coordinator.settings().staleness_check);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => coordinator.reconcile(Instant::now()),
        }
    }

    coordinator.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::store::AssetStore;
    use crate::market::types::AssetSeed;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedPriceSource {
        price: f64,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FixedPriceSource {
        fn new(price: f64) -> Self {
            Self {
                price,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                price: 0.0,
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FallbackPriceSource for FixedPriceSource {
        async fn fetch_price(&self, _rest_symbol: &str) -> Result<f64, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::InvalidArgument("upstream unavailable".to_string()));
            }
            Ok(self.price)
        }
    }

    fn settings() -> FallbackSettings {
        FallbackSettings {
            staleness_check: Duration::from_secs(3),
            staleness_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
        }
    }

    fn coordinator(source: Arc<dyn FallbackPriceSource>) -> FallbackCoordinator {
        let store = AssetStore::new(&[
            AssetSeed::new("btcusd", "Bitcoin", "BTC/USD", Some("BTCUSDT")),
            AssetSeed::new("xauusd", "Gold", "XAU/USD", None),
        ])
        .expect("roster should be valid")
        .into_shared();
        FallbackCoordinator::new(
            &[FallbackTarget::new("xauusd", "PAXGUSDT")],
            settings(),
            source,
            PriceReconciler::new(store, None),
            CancellationToken::new(),
        )
    }

    fn gold_price(coordinator: &FallbackCoordinator) -> f64 {
        coordinator
            .reconciler
            .store()
            .lock()
            .get("xauusd")
            .map(|record| record.price)
            .unwrap_or_default()
    }

    #[test]
    fn policy_starts_only_past_timeout_and_stops_when_fresh() {
        let now = Instant::now();
        let timeout = Duration::from_secs(10);
        let stale = now - Duration::from_secs(11);
        let fresh = now - Duration::from_secs(2);

        assert_eq!(fallback_action(stale, now, timeout, false), FallbackAction::Start);
        assert_eq!(fallback_action(stale, now, timeout, true), FallbackAction::Keep);
        assert_eq!(fallback_action(fresh, now, timeout, true), FallbackAction::Stop);
        assert_eq!(fallback_action(fresh, now, timeout, false), FallbackAction::Keep);
        assert_eq!(
            fallback_action(now - timeout, now, timeout, false),
            FallbackAction::Keep
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_asset_is_polled_and_fresh_channel_stops_poller() {
        let source = Arc::new(FixedPriceSource::new(2_650.0));
        let coordinator = coordinator(source.clone());

        coordinator.reconcile(Instant::now());
        assert!(coordinator.active_pollers().is_empty());

        tokio::time::advance(Duration::from_secs(11)).await;
        coordinator.reconcile(Instant::now());
        assert_eq!(coordinator.active_pollers(), vec!["xauusd".to_string()]);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gold_price(&coordinator), 2_650.0);

        coordinator.record_channel_update("xauusd", Instant::now());
        assert!(coordinator.active_pollers().is_empty());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_keeps_cycling_after_failed_fetches() {
        let source = Arc::new(FixedPriceSource::failing());
        let coordinator = coordinator(source.clone());

        coordinator
            .start_poller("xauusd")
            .expect("surveilled asset should start");
        tokio::time::sleep(Duration::from_millis(10_500)).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(gold_price(&coordinator), 0.0);
        assert_eq!(coordinator.active_pollers(), vec!["xauusd".to_string()]);
        coordinator.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn manual_controls_replace_and_stop_pollers() {
        let coordinator = coordinator(Arc::new(FixedPriceSource::new(1.0)));

        assert_eq!(coordinator.start_poller("xauusd").ok(), Some(false));
        assert_eq!(coordinator.start_poller("xauusd").ok(), Some(true));
        assert_eq!(coordinator.active_pollers().len(), 1);
        assert_eq!(coordinator.stop_poller("xauusd").ok(), Some(true));
        assert_eq!(coordinator.stop_poller("xauusd").ok(), Some(false));
        assert!(matches!(
            coordinator.start_poller("btcusd"),
            Err(AppError::UnknownAsset(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_start_survives_supervisor_until_live_channel_resumes() {
        let coordinator = coordinator(Arc::new(FixedPriceSource::new(2_650.0)));

        coordinator
            .start_poller("xauusd")
            .expect("surveilled asset should start");
        tokio::time::advance(Duration::from_secs(3)).await;
        coordinator.reconcile(Instant::now());
        assert_eq!(coordinator.active_pollers(), vec!["xauusd".to_string()]);

        coordinator.record_channel_update("xauusd", Instant::now());
        assert!(coordinator.active_pollers().is_empty());

        // back under automatic control: fresh stays off, stale starts again
        coordinator.reconcile(Instant::now());
        assert!(coordinator.active_pollers().is_empty());
        tokio::time::advance(Duration::from_secs(11)).await;
        coordinator.reconcile(Instant::now());
        assert_eq!(coordinator.active_pollers(), vec!["xauusd".to_string()]);
        coordinator.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn manual_stop_on_stale_asset_is_not_undone_by_supervisor() {
        let coordinator = coordinator(Arc::new(FixedPriceSource::new(2_650.0)));

        tokio::time::advance(Duration::from_secs(11)).await;
        coordinator.reconcile(Instant::now());
        assert_eq!(coordinator.active_pollers().len(), 1);

        assert_eq!(coordinator.stop_poller("xauusd").ok(), Some(true));
        tokio::time::advance(Duration::from_secs(30)).await;
        coordinator.reconcile(Instant::now());
        assert!(coordinator.active_pollers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_activates_within_one_tick_and_shuts_down() {
        let source = Arc::new(FixedPriceSource::new(2_000.0));
        let coordinator = Arc::new(coordinator(source.clone()));
        let supervisor_token = CancellationToken::new();
        let supervisor = tokio::spawn(run_staleness_supervisor(
            Arc::clone(&coordinator),
            supervisor_token.clone(),
        ));

        // timeout 10s, ticks every 3s: the 12s tick is the first past it
        tokio::time::sleep(Duration::from_millis(11_000)).await;
        assert!(coordinator.active_pollers().is_empty());
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(coordinator.active_pollers(), vec!["xauusd".to_string()]);

        supervisor_token.cancel();
        supervisor.await.expect("supervisor should exit cleanly");
        assert!(coordinator.active_pollers().is_empty());
        assert!(coordinator.start_poller("xauusd").is_err());
    }
}
