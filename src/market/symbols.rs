use crate::market::types::{AssetSeed, FallbackTarget};
use std::collections::HashMap;

// longest first: FDUSD must not match as a bare USD quote
const QUOTE_SUFFIXES: &[(&str, &str)] = &[
    ("FDUSD", "usd"),
    ("USDT", "usd"),
    ("BUSD", "usd"),
    ("USDC", "usd"),
    ("USD", "usd"),
];

#[derive(Debug, Clone, Default)]
pub struct SymbolMapper {
    pairs: HashMap<String, String>,
}

impl SymbolMapper {
    pub fn from_roster(assets: &[AssetSeed], fallback_targets: &[FallbackTarget]) -> Self {
        let mut mapper = Self::default();
        for seed in assets {
            if let Some(stream_symbol) = seed.stream_symbol.as_deref() {
                mapper.insert(stream_symbol, &seed.id);
            }
        }
        for target in fallback_targets {
            mapper.insert(&target.rest_symbol, &target.asset_id);
        }
        mapper
    }

    pub fn insert(&mut self, exchange_symbol: &str, asset_id: &str) {
        self.pairs.insert(
            exchange_symbol.trim().to_ascii_uppercase(),
            asset_id.to_string(),
        );
    }

    pub fn resolve(&self, exchange_symbol: &str) -> Option<String> {
        let pair = exchange_symbol.trim().to_ascii_uppercase();
        if pair.is_empty() {
            return None;
        }

        if let Some(asset_id) = self.pairs.get(&pair) {
            return Some(asset_id.clone());
        }

        derive_asset_id(&pair)
    }
}

fn derive_asset_id(pair: &str) -> Option<String> {
    QUOTE_SUFFIXES.iter().find_map(|(suffix, replacement)| {
        let base = pair.strip_suffix(suffix)?;
        if base.is_empty() || !base.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return None;
        }
        Some(format!("{}{replacement}", base.to_ascii_lowercase()))
    })
}
