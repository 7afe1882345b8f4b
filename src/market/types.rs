use crate::error::AppError;
use crate::market::backoff::BackoffPolicy;
use serde::{Deserialize, Serialize};

pub const DEFAULT_STREAM_BASE_URL: &str = "wss://stream.binance.com:9443";
pub const DEFAULT_REST_BASE_URL: &str = "https://api.binance.com";
pub const DEFAULT_PROXY_BASE_URL: &str = "https://api.allorigins.win/raw";
pub const DEFAULT_CHANNEL: StreamChannel = StreamChannel::Ticker;
pub const DEFAULT_COMBINED_STREAM: bool = true;
pub const DEFAULT_RECONNECT_BASE_MS: u64 = 1_000;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;
pub const DEFAULT_RECONNECT_MULTIPLIER: f64 = 1.8;
pub const DEFAULT_STALENESS_CHECK_MS: u64 = 3_000;
pub const DEFAULT_STALENESS_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_FALLBACK_POLL_MS: u64 = 5_000;
pub const DEFAULT_UI_SYNC_MS: u64 = 2_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 8_000;
pub const MIN_RECONNECT_BASE_MS: u64 = 10;
pub const MAX_RECONNECT_BASE_MS: u64 = 60_000;
pub const MAX_RECONNECT_MAX_MS: u64 = 300_000;
pub const MIN_RECONNECT_MULTIPLIER: f64 = 1.0;
pub const MAX_RECONNECT_MULTIPLIER: f64 = 4.0;
pub const MIN_TIMER_MS: u64 = 50;
pub const MAX_TIMER_MS: u64 = 600_000;
pub const MIN_REQUEST_TIMEOUT_MS: u64 = 100;
pub const MAX_REQUEST_TIMEOUT_MS: u64 = 60_000;

/// Price moves smaller than this render as unchanged.
pub const PRICE_CHANGE_EPSILON: f64 = 0.001;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
    Errored,
    Stopped,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamChannel {
    Ticker,
    Trade,
}

impl StreamChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Trade => "trade",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ticker" => Ok(Self::Ticker),
            "trade" => Ok(Self::Trade),
            other => Err(AppError::InvalidArgument(format!(
                "unknown stream channel '{other}' (expected ticker or trade)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PriceDirection {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetSeed {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub stream_symbol: Option<String>,
}

impl AssetSeed {
    pub fn new(id: &str, name: &str, symbol: &str, stream_symbol: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            symbol: symbol.to_string(),
            stream_symbol: stream_symbol.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FallbackTarget {
    pub asset_id: String,
    pub rest_symbol: String,
}

impl FallbackTarget {
    pub fn new(asset_id: &str, rest_symbol: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            rest_symbol: rest_symbol.to_string(),
        }
    }
}

pub fn default_roster() -> Vec<AssetSeed> {
    vec![
        AssetSeed::new("btcusd", "Bitcoin", "BTC/USD", Some("BTCUSDT")),
        AssetSeed::new("ethusd", "Ethereum", "ETH/USD", Some("ETHUSDT")),
        AssetSeed::new("xauusd", "Gold", "XAU/USD", Some("PAXGUSDT")),
        AssetSeed::new("bnbusd", "BNB", "BNB/USD", Some("BNBUSDT")),
        AssetSeed::new("solusd", "Solana", "SOL/USD", Some("SOLUSDT")),
        AssetSeed::new("xrpusd", "XRP", "XRP/USD", Some("XRPUSDT")),
        AssetSeed::new("adausd", "Cardano", "ADA/USD", Some("ADAUSDT")),
        AssetSeed::new("dogeusd", "Dogecoin", "DOGE/USD", Some("DOGEUSDT")),
    ]
}

pub fn default_fallback_targets() -> Vec<FallbackTarget> {
    vec![FallbackTarget::new("xauusd", "PAXGUSDT")]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub price: f64,
    pub prev_price: f64,
    pub high: f64,
    pub low: f64,
    pub last_updated: Option<i64>,
}

impl AssetRecord {
    pub fn from_seed(seed: &AssetSeed) -> Self {
        Self {
            id: seed.id.clone(),
            name: seed.name.clone(),
            symbol: seed.symbol.clone(),
            price: 0.0,
            prev_price: 0.0,
            high: 0.0,
            low: 0.0,
            last_updated: None,
        }
    }

    pub fn has_price(&self) -> bool {
        self.last_updated.is_some()
    }

    pub fn change(&self) -> f64 {
        self.price - self.prev_price
    }

    pub fn direction(&self) -> PriceDirection {
        let change = self.change();
        if change.abs() <= PRICE_CHANGE_EPSILON {
            PriceDirection::Flat
        } else if change > 0.0 {
            PriceDirection::Up
        } else {
            PriceDirection::Down
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatusSnapshot {
    pub state: FeedConnectionState,
    pub endpoint: String,
    pub reconnect_attempt: u32,
    pub next_retry_ms: Option<u64>,
    pub last_frame_at: Option<i64>,
    pub frames_applied: u64,
    pub frames_dropped: u64,
    pub reason: Option<String>,
}

impl FeedStatusSnapshot {
    pub fn disconnected(endpoint: String, reason: Option<String>) -> Self {
        Self {
            state: FeedConnectionState::Disconnected,
            endpoint,
            reconnect_attempt: 0,
            next_retry_ms: None,
            last_frame_at: None,
            frames_applied: 0,
            frames_dropped: 0,
            reason,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BridgeArgs {
    pub stream_base_url: Option<String>,
    pub rest_base_url: Option<String>,
    pub proxy_base_url: Option<String>,
    pub channel: Option<StreamChannel>,
    pub combined_stream: Option<bool>,
    pub assets: Option<Vec<AssetSeed>>,
    pub fallback_targets: Option<Vec<FallbackTarget>>,
    pub reconnect_base_ms: Option<u64>,
    pub reconnect_max_ms: Option<u64>,
    pub reconnect_multiplier: Option<f64>,
    pub staleness_check_ms: Option<u64>,
    pub staleness_timeout_ms: Option<u64>,
    pub fallback_poll_ms: Option<u64>,
    pub ui_sync_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub stream_base_url: String,
    pub rest_base_url: String,
    pub proxy_base_url: Option<String>,
    pub channel: StreamChannel,
    pub combined_stream: bool,
    pub assets: Vec<AssetSeed>,
    pub fallback_targets: Vec<FallbackTarget>,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub reconnect_multiplier: f64,
    pub staleness_check_ms: u64,
    pub staleness_timeout_ms: u64,
    pub fallback_poll_ms: u64,
    pub ui_sync_ms: u64,
    pub request_timeout_ms: u64,
}

impl BridgeConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.reconnect_base_ms,
            self.reconnect_multiplier,
            self.reconnect_max_ms,
        )
    }

    pub fn stream_symbols(&self) -> Vec<String> {
        self.assets
            .iter()
            .filter_map(|seed| seed.stream_symbol.clone())
            .collect()
    }
}

fn validate_range(name: &str, value: u64, min: u64, max: u64) -> Result<u64, AppError> {
    if !(min..=max).contains(&value) {
        return Err(AppError::InvalidArgument(format!(
            "{name} must be between {min} and {max}"
        )));
    }
    Ok(value)
}

fn normalize_url(name: &str, value: String, schemes: &[&str]) -> Result<String, AppError> {
    let trimmed = value.trim().trim_end_matches('/').to_string();
    if !schemes
        .iter()
        .any(|scheme| trimmed.starts_with(&format!("{scheme}://")))
    {
        return Err(AppError::InvalidArgument(format!(
            "{name} must use one of the schemes: {}",
            schemes.join(", ")
        )));
    }
    Ok(trimmed)
}

fn normalize_pair(value: &str) -> Result<String, AppError> {
    let pair = value.trim().to_ascii_uppercase();
    if pair.is_empty() || !pair.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(AppError::InvalidArgument(format!(
            "exchange symbol '{value}' must be non-empty alphanumeric ASCII"
        )));
    }
    Ok(pair)
}

fn normalize_roster(assets: Vec<AssetSeed>) -> Result<Vec<AssetSeed>, AppError> {
    if assets.is_empty() {
        return Err(AppError::InvalidArgument(
            "asset roster must not be empty".to_string(),
        ));
    }

    let mut normalized: Vec<AssetSeed> = Vec::with_capacity(assets.len());
    for seed in assets {
        let id = seed.id.trim().to_ascii_lowercase();
        if id.is_empty() || !id.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(AppError::InvalidArgument(format!(
                "asset id '{}' must be non-empty alphanumeric ASCII",
                seed.id
            )));
        }
        if normalized.iter().any(|existing| existing.id == id) {
            return Err(AppError::DuplicateAsset(id));
        }
        let stream_symbol = seed
            .stream_symbol
            .as_deref()
            .map(normalize_pair)
            .transpose()?;
        normalized.push(AssetSeed {
            id,
            name: seed.name,
            symbol: seed.symbol,
            stream_symbol,
        });
    }
    Ok(normalized)
}

fn normalize_fallback_targets(
    targets: Vec<FallbackTarget>,
    assets: &[AssetSeed],
) -> Result<Vec<FallbackTarget>, AppError> {
    let mut normalized: Vec<FallbackTarget> = Vec::with_capacity(targets.len());
    for target in targets {
        let asset_id = target.asset_id.trim().to_ascii_lowercase();
        if !assets.iter().any(|seed| seed.id == asset_id) {
            return Err(AppError::UnknownAsset(asset_id));
        }
        if normalized.iter().any(|existing| existing.asset_id == asset_id) {
            return Err(AppError::DuplicateAsset(asset_id));
        }
        normalized.push(FallbackTarget {
            asset_id,
            rest_symbol: normalize_pair(&target.rest_symbol)?,
        });
    }
    Ok(normalized)
}

impl BridgeArgs {
    pub fn normalize(self) -> Result<BridgeConfig, AppError> {
        let stream_base_url = normalize_url(
            "streamBaseUrl",
            self.stream_base_url
                .unwrap_or_else(|| DEFAULT_STREAM_BASE_URL.to_string()),
            &["ws", "wss"],
        )?;
        let rest_base_url = normalize_url(
            "restBaseUrl",
            self.rest_base_url
                .unwrap_or_else(|| DEFAULT_REST_BASE_URL.to_string()),
            &["http", "https"],
        )?;
        let proxy_base_url = match self.proxy_base_url {
            Some(value) if value.trim().is_empty() => None,
            Some(value) => Some(normalize_url(
                "proxyBaseUrl",
                value,
                &["http", "https"],
            )?),
            None => Some(DEFAULT_PROXY_BASE_URL.to_string()),
        };

        let channel = self.channel.unwrap_or(DEFAULT_CHANNEL);
        let combined_stream = self.combined_stream.unwrap_or(DEFAULT_COMBINED_STREAM);

        let assets = normalize_roster(self.assets.unwrap_or_else(default_roster))?;
        let fallback_targets = normalize_fallback_targets(
            self.fallback_targets
                .unwrap_or_else(default_fallback_targets),
            &assets,
        )?;
        if assets.iter().all(|seed| seed.stream_symbol.is_none()) && fallback_targets.is_empty()
        {
            return Err(AppError::InvalidArgument(
                "at least one asset needs a stream symbol or a fallback target".to_string(),
            ));
        }

        let reconnect_base_ms = validate_range(
            "reconnectBaseMs",
            self.reconnect_base_ms.unwrap_or(DEFAULT_RECONNECT_BASE_MS),
            MIN_RECONNECT_BASE_MS,
            MAX_RECONNECT_BASE_MS,
        )?;
        let reconnect_max_ms = validate_range(
            "reconnectMaxMs",
            self.reconnect_max_ms.unwrap_or(DEFAULT_RECONNECT_MAX_MS),
            reconnect_base_ms,
            MAX_RECONNECT_MAX_MS,
        )?;
        let reconnect_multiplier = self
            .reconnect_multiplier
            .unwrap_or(DEFAULT_RECONNECT_MULTIPLIER);
        if !reconnect_multiplier.is_finite()
            || !(MIN_RECONNECT_MULTIPLIER..=MAX_RECONNECT_MULTIPLIER)
                .contains(&reconnect_multiplier)
        {
            return Err(AppError::InvalidArgument(format!(
                "reconnectMultiplier must be between {MIN_RECONNECT_MULTIPLIER} and {MAX_RECONNECT_MULTIPLIER}"
            )));
        }

        let staleness_check_ms = validate_range(
            "stalenessCheckMs",
            self.staleness_check_ms.unwrap_or(DEFAULT_STALENESS_CHECK_MS),
            MIN_TIMER_MS,
            MAX_TIMER_MS,
        )?;
        let staleness_timeout_ms = validate_range(
            "stalenessTimeoutMs",
            self.staleness_timeout_ms
                .unwrap_or(DEFAULT_STALENESS_TIMEOUT_MS),
            MIN_TIMER_MS,
            MAX_TIMER_MS,
        )?;
        let fallback_poll_ms = validate_range(
            "fallbackPollMs",
            self.fallback_poll_ms.unwrap_or(DEFAULT_FALLBACK_POLL_MS),
            MIN_TIMER_MS,
            MAX_TIMER_MS,
        )?;
        let ui_sync_ms = validate_range(
            "uiSyncMs",
            self.ui_sync_ms.unwrap_or(DEFAULT_UI_SYNC_MS),
            MIN_TIMER_MS,
            MAX_TIMER_MS,
        )?;
        let request_timeout_ms = validate_range(
            "requestTimeoutMs",
            self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            MIN_REQUEST_TIMEOUT_MS,
            MAX_REQUEST_TIMEOUT_MS,
        )?;

        Ok(BridgeConfig {
            stream_base_url,
            rest_base_url,
            proxy_base_url,
            channel,
            combined_stream,
            assets,
            fallback_targets,
            reconnect_base_ms,
            reconnect_max_ms,
            reconnect_multiplier,
            staleness_check_ms,
            staleness_timeout_ms,
            fallback_poll_ms,
            ui_sync_ms,
            request_timeout_ms,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSession {
    pub running: bool,
    pub endpoint: String,
    pub channel: StreamChannel,
    pub assets: Vec<String>,
    pub fallback_assets: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStopResult {
    pub stopped: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub feed: FeedStatusSnapshot,
    pub fallback_active: Vec<String>,
    pub uptime_ms: u128,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NumericField {
    Text(String),
    Number(f64),
}

impl NumericField {
    pub fn to_finite_f64(&self) -> Result<f64, AppError> {
        let value = match self {
            Self::Text(text) => text.trim().parse::<f64>()?,
            Self::Number(number) => *number,
        };
        if !value.is_finite() {
            return Err(AppError::InvalidArgument(
                "numeric field must be finite".to_string(),
            ));
        }
        Ok(value)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TickerWire {
    pub stream: Option<String>,
    pub data: Option<Box<TickerWire>>,
    pub s: Option<String>,
    pub symbol: Option<String>,
    pub c: Option<NumericField>,
    pub price: Option<NumericField>,
    pub p: Option<NumericField>,
    pub h: Option<NumericField>,
    pub high: Option<NumericField>,
    pub l: Option<NumericField>,
    pub low: Option<NumericField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickerUpdate {
    pub symbol: String,
    pub price: f64,
    pub high: Option<f64>,
    pub low: Option<f64>,
}

impl TryFrom<TickerWire> for TickerUpdate {
    type Error = AppError;

    fn try_from(value: TickerWire) -> Result<Self, Self::Error> {
        let wire = match value.data {
            Some(inner) => *inner,
            None => value,
        };

        let symbol = wire
            .s
            .or(wire.symbol)
            .map(|symbol| symbol.trim().to_string())
            .filter(|symbol| !symbol.is_empty())
            .ok_or_else(|| {
                AppError::InvalidArgument("ticker frame is missing a symbol".to_string())
            })?;

        let price = wire
            .c
            .or(wire.price)
            .or(wire.p)
            .ok_or_else(|| {
                AppError::InvalidArgument(format!("ticker frame for {symbol} has no price"))
            })?
            .to_finite_f64()?;

        let high = wire
            .h
            .or(wire.high)
            .and_then(|field| field.to_finite_f64().ok());
        let low = wire
            .l
            .or(wire.low)
            .and_then(|field| field.to_finite_f64().ok());

        Ok(Self {
            symbol,
            price,
            high,
            low,
        })
    }
}

pub fn parse_ticker_payload(payload: &mut [u8]) -> Result<TickerUpdate, AppError> {
    let wire: TickerWire = simd_json::serde::from_slice(payload)?;
    wire.try_into()
}

#[derive(Debug, Deserialize)]
pub struct TickerPriceWire {
    pub symbol: Option<String>,
    pub price: NumericField,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<TickerUpdate, AppError> {
        let mut payload = raw.as_bytes().to_vec();
        parse_ticker_payload(&mut payload)
    }

    #[test]
    fn parses_bare_ticker_frame() {
        let update = parse(
            r#"{"e":"24hrTicker","E":1700000000000,"s":"BTCUSDT","p":"-120.00","P":"-0.24","c":"50000.5","h":"51000.0","l":"48000.0"}"#,
        )
        .expect("ticker frame should parse");

        assert_eq!(update.symbol, "BTCUSDT");
        assert_eq!(update.price, 50000.5);
        assert_eq!(update.high, Some(51000.0));
        assert_eq!(update.low, Some(48000.0));
    }

    #[test]
    fn unwraps_combined_stream_envelope() {
        let update = parse(
            r#"{"stream":"ethusdt@ticker","data":{"s":"ETHUSDT","c":"3000.25"}}"#,
        )
        .expect("enveloped frame should parse");

        assert_eq!(update.symbol, "ETHUSDT");
        assert_eq!(update.price, 3000.25);
        assert_eq!(update.high, None);
    }

    #[test]
    fn reads_trade_price_and_long_field_names() {
        let trade = parse(r#"{"e":"trade","s":"SOLUSDT","p":"150.5","q":"2"}"#)
            .expect("trade frame should parse");
        assert_eq!(trade.price, 150.5);

        let long_names = parse(r#"{"symbol":"XRPUSDT","price":0.52,"high":0.6,"low":"0.5"}"#)
            .expect("long field names should parse");
        assert_eq!(long_names.symbol, "XRPUSDT");
        assert_eq!(long_names.price, 0.52);
        assert_eq!(long_names.high, Some(0.6));
        assert_eq!(long_names.low, Some(0.5));
    }

    #[test]
    fn prefers_last_price_over_price_change() {
        let update = parse(r#"{"s":"BTCUSDT","p":"-12.0","price":"1.0","c":"42.0"}"#)
            .expect("frame should parse");
        assert_eq!(update.price, 42.0);
    }

    #[test]
    fn rejects_frames_without_symbol_or_numeric_price() {
        assert!(parse(r#"{"c":"100.0"}"#).is_err());
        assert!(parse(r#"{"s":"BTCUSDT","c":"not-a-number"}"#).is_err());
        assert!(parse(r#"{"s":"BTCUSDT"}"#).is_err());
        assert!(parse(r#"{"result":null,"id":1}"#).is_err());
        assert!(parse("not json").is_err());
    }

    #[test]
    fn ignores_unparsable_high_low() {
        let update = parse(r#"{"s":"BTCUSDT","c":"10","h":"n/a"}"#).expect("frame should parse");
        assert_eq!(update.high, None);
    }

    #[test]
    fn record_direction_uses_dead_band() {
        let mut record = AssetRecord::from_seed(&AssetSeed::new("btcusd", "Bitcoin", "BTC/USD", None));
        record.prev_price = 100.0;
        record.price = 100.0005;
        assert_eq!(record.direction(), PriceDirection::Flat);
        record.price = 101.0;
        assert_eq!(record.direction(), PriceDirection::Up);
        record.price = 99.0;
        assert_eq!(record.direction(), PriceDirection::Down);
    }

    #[test]
    fn normalizes_bridge_args_defaults() {
        let config = BridgeArgs::default()
            .normalize()
            .expect("defaults should be valid");

        assert_eq!(config.stream_base_url, DEFAULT_STREAM_BASE_URL);
        assert_eq!(config.rest_base_url, DEFAULT_REST_BASE_URL);
        assert_eq!(config.proxy_base_url.as_deref(), Some(DEFAULT_PROXY_BASE_URL));
        assert_eq!(config.channel, DEFAULT_CHANNEL);
        assert_eq!(config.reconnect_base_ms, DEFAULT_RECONNECT_BASE_MS);
        assert_eq!(config.reconnect_max_ms, DEFAULT_RECONNECT_MAX_MS);
        assert_eq!(config.staleness_check_ms, DEFAULT_STALENESS_CHECK_MS);
        assert_eq!(config.staleness_timeout_ms, DEFAULT_STALENESS_TIMEOUT_MS);
        assert_eq!(config.fallback_poll_ms, DEFAULT_FALLBACK_POLL_MS);
        assert_eq!(config.assets.len(), default_roster().len());
        assert_eq!(config.fallback_targets, default_fallback_targets());
        // gold rides the live stream too, so live frames keep its poller idle
        assert!(config.stream_symbols().contains(&"PAXGUSDT".to_string()));
        assert!(config
            .fallback_targets
            .iter()
            .all(|target| config.stream_symbols().contains(&target.rest_symbol)));
    }

    #[test]
    fn empty_proxy_url_disables_proxy() {
        let config = BridgeArgs {
            proxy_base_url: Some("  ".to_string()),
            ..Default::default()
        }
        .normalize()
        .expect("empty proxy should be accepted");

        assert_eq!(config.proxy_base_url, None);
    }

    #[test]
    fn rejects_duplicate_asset_ids() {
        let result = BridgeArgs {
            assets: Some(vec![
                AssetSeed::new("btcusd", "Bitcoin", "BTC/USD", Some("BTCUSDT")),
                AssetSeed::new("BTCUSD", "Bitcoin again", "BTC/USD", Some("BTCBUSD")),
            ]),
            fallback_targets: Some(Vec::new()),
            ..Default::default()
        }
        .normalize();

        assert!(matches!(result, Err(AppError::DuplicateAsset(id)) if id == "btcusd"));
    }

    #[test]
    fn rejects_fallback_target_outside_roster() {
        let result = BridgeArgs {
            assets: Some(vec![AssetSeed::new("btcusd", "Bitcoin", "BTC/USD", Some("BTCUSDT"))]),
            fallback_targets: Some(vec![FallbackTarget::new("xagusd", "XAGUSDT")]),
            ..Default::default()
        }
        .normalize();

        assert!(matches!(result, Err(AppError::UnknownAsset(_))));
    }

    #[test]
    fn validates_reconnect_bounds() {
        let base_too_small = BridgeArgs {
            reconnect_base_ms: Some(1),
            ..Default::default()
        }
        .normalize();
        assert!(base_too_small.is_err());

        let max_below_base = BridgeArgs {
            reconnect_base_ms: Some(5_000),
            reconnect_max_ms: Some(1_000),
            ..Default::default()
        }
        .normalize();
        assert!(max_below_base.is_err());

        let bad_multiplier = BridgeArgs {
            reconnect_multiplier: Some(f64::NAN),
            ..Default::default()
        }
        .normalize();
        assert!(bad_multiplier.is_err());
    }

    #[test]
    fn validates_stream_url_scheme() {
        let result = BridgeArgs {
            stream_base_url: Some("https://stream.binance.com".to_string()),
            ..Default::default()
        }
        .normalize();

        assert!(result.is_err());
    }

    #[test]
    fn parses_stream_channel_names() {
        assert_eq!(StreamChannel::parse(" Trade ").ok(), Some(StreamChannel::Trade));
        assert_eq!(StreamChannel::parse("ticker").ok(), Some(StreamChannel::Ticker));
        assert!(StreamChannel::parse("kline").is_err());
    }
}
