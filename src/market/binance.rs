use crate::error::AppError;
use crate::market::fallback::FallbackPriceSource;
use crate::market::types::{StreamChannel, TickerPriceWire};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

pub type BinanceWsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn channel_names(symbols: &[String], channel: StreamChannel) -> String {
    symbols
        .iter()
        .map(|symbol| format!("{}@{}", symbol.to_ascii_lowercase(), channel.as_str()))
        .collect::<Vec<_>>()
        .join("/")
}

pub fn ws_endpoint(
    base_url: &str,
    symbols: &[String],
    channel: StreamChannel,
    combined: bool,
) -> String {
    let base = base_url.trim_end_matches('/');
    let streams = channel_names(symbols, channel);
    if combined {
        format!("{base}/stream?streams={streams}")
    } else {
        format!("{base}/ws/{streams}")
    }
}

pub fn ticker_price_endpoint(rest_base_url: &str, symbol: &str) -> String {
    format!("{}/api/v3/ticker/price", rest_base_url.trim_end_matches('/'))
        + &format!("?symbol={}", symbol.to_ascii_uppercase())
}

pub fn proxied_endpoint(proxy_base_url: &str, target: &str) -> Result<String, AppError> {
    let url = Url::parse_with_params(proxy_base_url, &[("url", target)]).map_err(|error| {
        AppError::InvalidArgument(format!("invalid proxy url '{proxy_base_url}': {error}"))
    })?;
    Ok(url.into())
}

pub async fn connect_ticker_stream(endpoint: &str) -> Result<BinanceWsStream, AppError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(16 << 20),
        max_frame_size: Some(4 << 20),
        ..Default::default()
    };

    let (stream, _) = connect_async_with_config(endpoint, Some(ws_config), true).await?;
    Ok(stream)
}

pub async fn fetch_ticker_price(client: &Client, endpoint: &str) -> Result<f64, AppError> {
    let response = client.get(endpoint).send().await?.error_for_status()?;
    let payload = response.json::<TickerPriceWire>().await?;
    payload.price.to_finite_f64()
}

#[derive(Debug, Clone)]
pub struct RestPriceSource {
    client: Client,
    rest_base_url: String,
    proxy_base_url: Option<String>,
}

impl RestPriceSource {
    pub fn new(
        rest_base_url: String,
        proxy_base_url: Option<String>,
        request_timeout_ms: u64,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            rest_base_url,
            proxy_base_url,
        })
    }
}

#[async_trait]
impl FallbackPriceSource for RestPriceSource {
    async fn fetch_price(&self, rest_symbol: &str) -> Result<f64, AppError> {
        let direct = ticker_price_endpoint(&self.rest_base_url, rest_symbol);
        let direct_error = match fetch_ticker_price(&self.client, &direct).await {
            Ok(price) => return Ok(price),
            Err(error) => error,
        };

        let Some(proxy_base_url) = self.proxy_base_url.as_deref() else {
            return Err(direct_error);
        };
        tracing::debug!(
            symbol = rest_symbol,
            error = %direct_error,
            "direct price fetch failed, retrying through proxy"
        );

        let proxied = proxied_endpoint(proxy_base_url, &direct)?;
        fetch_ticker_price(&self.client, &proxied)
            .await
            .map_err(|proxy_error| AppError::FallbackExhausted {
                direct: direct_error.to_string(),
                proxy: proxy_error.to_string(),
            })
    }
}
