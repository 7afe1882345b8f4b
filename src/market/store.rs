use crate::error::AppError;
use crate::market::notifier::UiNotifier;
use crate::market::types::{AssetRecord, AssetSeed};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub type SharedAssetStore = Arc<Mutex<AssetStore>>;

#[derive(Debug, Clone)]
pub struct AssetStore {
    records: Vec<AssetRecord>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceUpdate {
    pub price: f64,
    pub high: Option<f64>,
    pub low: Option<f64>,
}

impl PriceUpdate {
    pub fn last_price(price: f64) -> Self {
        Self {
            price,
            high: None,
            low: None,
        }
    }
}

impl AssetStore {
    pub fn new(seeds: &[AssetSeed]) -> Result<Self, AppError> {
        let mut records = Vec::with_capacity(seeds.len());
        let mut index = HashMap::with_capacity(seeds.len());
        for seed in seeds {
            if index.insert(seed.id.clone(), records.len()).is_some() {
                return Err(AppError::DuplicateAsset(seed.id.clone()));
            }
            records.push(AssetRecord::from_seed(seed));
        }
        Ok(Self { records, index })
    }

    pub fn into_shared(self) -> SharedAssetStore {
        Arc::new(Mutex::new(self))
    }

    pub fn get(&self, asset_id: &str) -> Option<&AssetRecord> {
        self.index
            .get(asset_id)
            .and_then(|position| self.records.get(*position))
    }

    pub fn records(&self) -> &[AssetRecord] {
        &self.records
    }

    pub fn snapshot(&self) -> Vec<AssetRecord> {
        self.records.clone()
    }

    // The first update seeds prev_price and the range from the new price.
    pub fn apply(
        &mut self,
        asset_id: &str,
        update: PriceUpdate,
        now_unix_ms: i64,
    ) -> Option<&AssetRecord> {
        if !update.price.is_finite() {
            return None;
        }
        let position = *self.index.get(asset_id)?;
        let record = self.records.get_mut(position)?;

        let first_update = !record.has_price();
        record.prev_price = if first_update {
            update.price
        } else {
            record.price
        };
        record.price = update.price;

        record.high = match update.high.filter(|value| value.is_finite()) {
            Some(explicit) => explicit,
            None if first_update => update.price,
            None => record.high.max(update.price),
        };
        record.low = match update.low.filter(|value| value.is_finite()) {
            Some(explicit) => explicit,
            None if first_update => update.price,
            None => record.low.min(update.price),
        };
        record.last_updated = Some(now_unix_ms);

        Some(&*record)
    }
}

#[derive(Clone)]
pub struct PriceReconciler {
    store: SharedAssetStore,
    notifier: Option<Arc<dyn UiNotifier>>,
}

impl PriceReconciler {
    pub fn new(store: SharedAssetStore, notifier: Option<Arc<dyn UiNotifier>>) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &SharedAssetStore {
        &self.store
    }

    pub fn notifier(&self) -> Option<&Arc<dyn UiNotifier>> {
        self.notifier.as_ref()
    }

    pub fn apply(
        &self,
        asset_id: &str,
        price: f64,
        high: Option<f64>,
        low: Option<f64>,
    ) -> bool {
        let update = PriceUpdate { price, high, low };
        let notification = {
            let mut writable = self.store.lock();
            let Some(updated) = writable.apply(asset_id, update, now_unix_ms()).cloned() else {
                return false;
            };
            self.notifier
                .as_ref()
                .map(|_| (updated, writable.snapshot()))
        };

        if let (Some(notifier), Some((updated, assets))) = (self.notifier.as_ref(), notification) {
            notifier.asset_updated(&updated, &assets);
        }
        true
    }
}

pub fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}
