use crate::market::binance::{connect_ticker_stream, ws_endpoint, BinanceWsStream};
use crate::market::fallback::{run_staleness_supervisor, FallbackCoordinator};
use crate::market::notifier::run_ui_sync_loop;
use crate::market::store::{now_unix_ms, PriceReconciler};
use crate::market::symbols::SymbolMapper;
use crate::market::types::{
    parse_ticker_payload, BridgeConfig, FeedConnectionState, FeedStatusSnapshot,
};
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct FeedTelemetryAtomics {
    has_last_frame_at: AtomicBool,
    last_frame_at: AtomicI64,
    frames_applied: AtomicU64,
    frames_dropped: AtomicU64,
}

impl FeedTelemetryAtomics {
    fn record_applied(&self, now_unix_ms: i64) {
        self.last_frame_at.store(now_unix_ms, Ordering::Relaxed);
        self.has_last_frame_at.store(true, Ordering::Relaxed);
        self.frames_applied.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.has_last_frame_at.store(false, Ordering::Relaxed);
        self.last_frame_at.store(0, Ordering::Relaxed);
        self.frames_applied.store(0, Ordering::Relaxed);
        self.frames_dropped.store(0, Ordering::Relaxed);
    }

    fn overlay(&self, snapshot: &mut FeedStatusSnapshot) {
        snapshot.last_frame_at = if self.has_last_frame_at.load(Ordering::Relaxed) {
            Some(self.last_frame_at.load(Ordering::Relaxed))
        } else {
            None
        };
        snapshot.frames_applied = self.frames_applied.load(Ordering::Relaxed);
        snapshot.frames_dropped = self.frames_dropped.load(Ordering::Relaxed);
    }
}

const STATUS_LOG_THROTTLE_MS: u64 = 5_000;

#[derive(Debug, Default)]
struct StatusLogThrottle {
    last_state: Option<FeedConnectionState>,
    last_reason: Option<String>,
    last_emit: Option<Instant>,
}

impl StatusLogThrottle {
    fn allow(&mut self, state: FeedConnectionState, reason: &Option<String>) -> bool {
        let now = Instant::now();
        let should_throttle = matches!(
            state,
            FeedConnectionState::Closed | FeedConnectionState::Errored
        );

        if should_throttle
            && self.last_state == Some(state)
            && self.last_reason == *reason
            && self
                .last_emit
                .map(|instant| {
                    now.duration_since(instant) < Duration::from_millis(STATUS_LOG_THROTTLE_MS)
                })
                .unwrap_or(false)
        {
            return false;
        }

        if should_throttle {
            self.last_state = Some(state);
            self.last_reason = reason.clone();
            self.last_emit = Some(now);
        }
        true
    }
}

#[derive(Debug)]
pub struct FeedStatusStore {
    snapshot: RwLock<FeedStatusSnapshot>,
    telemetry: FeedTelemetryAtomics,
    log_throttle: Mutex<StatusLogThrottle>,
}

impl FeedStatusStore {
    pub fn new(endpoint: String) -> Self {
        Self {
            snapshot: RwLock::new(FeedStatusSnapshot::disconnected(
                endpoint,
                Some("feed idle".to_string()),
            )),
            telemetry: FeedTelemetryAtomics::default(),
            log_throttle: Mutex::new(StatusLogThrottle::default()),
        }
    }

    pub async fn current(&self) -> FeedStatusSnapshot {
        let mut snapshot = self.snapshot.read().await.clone();
        self.telemetry.overlay(&mut snapshot);
        snapshot
    }

    /// Clears counters and status from a previous feed session.
    pub async fn reset(&self) {
        let mut writable = self.snapshot.write().await;
        let endpoint = writable.endpoint.clone();
        *writable = FeedStatusSnapshot::disconnected(endpoint, Some("feed starting".to_string()));
        self.telemetry.reset();
        *self.log_throttle.lock() = StatusLogThrottle::default();
    }

    pub async fn state(&self) -> FeedConnectionState {
        self.snapshot.read().await.state
    }

    pub async fn publish(
        &self,
        state: FeedConnectionState,
        reconnect_attempt: u32,
        next_retry_ms: Option<u64>,
        reason: Option<String>,
    ) {
        let snapshot = {
            let mut writable = self.snapshot.write().await;
            writable.state = state;
            writable.reconnect_attempt = reconnect_attempt;
            writable.next_retry_ms = next_retry_ms;
            writable.reason = reason;
            let mut published = writable.clone();
            self.telemetry.overlay(&mut published);
            published
        };

        let loud = self.log_throttle.lock().allow(state, &snapshot.reason);
        let reason = snapshot.reason.as_deref().unwrap_or_default();
        match state {
            FeedConnectionState::Closed | FeedConnectionState::Errored if !loud => tracing::debug!(
                state = ?state,
                attempt = reconnect_attempt,
                retry_ms = next_retry_ms,
                "{reason}"
            ),
            FeedConnectionState::Closed | FeedConnectionState::Errored => tracing::warn!(
                state = ?state,
                attempt = reconnect_attempt,
                retry_ms = next_retry_ms,
                "{reason}"
            ),
            _ => tracing::info!(
                state = ?state,
                endpoint = %snapshot.endpoint,
                frames = snapshot.frames_applied,
                "{reason}"
            ),
        }
    }
}

pub struct BridgeRuntime {
    pub config: Arc<BridgeConfig>,
    pub mapper: SymbolMapper,
    pub reconciler: PriceReconciler,
    pub fallback: Arc<FallbackCoordinator>,
    pub status: Arc<FeedStatusStore>,
}

impl BridgeRuntime {
    pub fn endpoint(&self) -> String {
        ws_endpoint(
            &self.config.stream_base_url,
            &self.config.stream_symbols(),
            self.config.channel,
            self.config.combined_stream,
        )
    }
}

struct FeedRuntimeContext<'a> {
    runtime: &'a BridgeRuntime,
    endpoint: &'a str,
    cancel_token: &'a CancellationToken,
}

#[derive(Debug, PartialEq)]
enum StreamDirective {
    Continue,
    Disconnect(String),
}

enum StreamOutcome {
    Cancelled,
    Closed(String),
    Errored(String),
}

pub async fn run_bridge(runtime: BridgeRuntime, cancel_token: CancellationToken) {
    let supervisor_handle = tokio::spawn(run_staleness_supervisor(
        Arc::clone(&runtime.fallback),
        cancel_token.clone(),
    ));

    let ui_sync_handle = runtime.reconciler.notifier().cloned().map(|notifier| {
        tokio::spawn(run_ui_sync_loop(
            Arc::clone(runtime.reconciler.store()),
            notifier,
            runtime.config.ui_sync_ms,
            cancel_token.clone(),
        ))
    });

    let endpoint = runtime.endpoint();
    let context = FeedRuntimeContext {
        runtime: &runtime,
        endpoint: &endpoint,
        cancel_token: &cancel_token,
    };

    if runtime.config.stream_symbols().is_empty() {
        runtime
            .status
            .publish(
                FeedConnectionState::Disconnected,
                0,
                None,
                Some("no live channels configured, fallback polling only".to_string()),
            )
            .await;
        cancel_token.cancelled().await;
    } else {
        run_price_feed(&context).await;
    }

    cancel_token.cancel();
    runtime.fallback.shutdown();
    let _ = supervisor_handle.await;
    if let Some(handle) = ui_sync_handle {
        let _ = handle.await;
    }

    runtime
        .status
        .publish(
            FeedConnectionState::Stopped,
            0,
            None,
            Some("feed stopped".to_string()),
        )
        .await;
}

async fn run_price_feed(context: &FeedRuntimeContext<'_>) {
    let backoff = context.runtime.config.backoff();
    let status = &context.runtime.status;
    let mut reconnect_attempt = 0_u32;

    while !context.cancel_token.is_cancelled() {
        let reason = if reconnect_attempt == 0 {
            "opening websocket stream".to_string()
        } else {
            format!("reconnect attempt {reconnect_attempt}")
        };
        status
            .publish(
                FeedConnectionState::Connecting,
                reconnect_attempt,
                None,
                Some(reason),
            )
            .await;

        let connected = tokio::select! {
            _ = context.cancel_token.cancelled() => break,
            connected = connect_ticker_stream(context.endpoint) => connected,
        };

        let (state, reason) = match connected {
            Ok(mut websocket_stream) => {
                reconnect_attempt = 0;
                status
                    .publish(
                        FeedConnectionState::Open,
                        0,
                        None,
                        Some("websocket connected".to_string()),
                    )
                    .await;

                match read_until_disconnect(&mut websocket_stream, context).await {
                    StreamOutcome::Cancelled => {
                        close_normally(&mut websocket_stream).await;
                        break;
                    }
                    StreamOutcome::Closed(reason) => (FeedConnectionState::Closed, reason),
                    StreamOutcome::Errored(reason) => (FeedConnectionState::Errored, reason),
                }
            }
            Err(error) => (
                FeedConnectionState::Errored,
                format!("websocket connect error: {error}"),
            ),
        };

        // a deliberate stop must never race into a reconnect
        if context.cancel_token.is_cancelled() {
            break;
        }

        reconnect_attempt = reconnect_attempt.saturating_add(1);
        let delay = backoff.delay_for(reconnect_attempt);
        status
            .publish(
                state,
                reconnect_attempt,
                Some(delay.as_millis() as u64),
                Some(reason),
            )
            .await;

        tokio::select! {
            _ = context.cancel_token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn read_until_disconnect(
    websocket_stream: &mut BinanceWsStream,
    context: &FeedRuntimeContext<'_>,
) -> StreamOutcome {
    loop {
        let frame = tokio::select! {
            _ = context.cancel_token.cancelled() => return StreamOutcome::Cancelled,
            next_message = websocket_stream.next() => next_message,
        };

        let Some(frame_result) = frame else {
            return StreamOutcome::Closed("websocket stream ended".to_string());
        };

        match frame_result {
            Ok(message) => {
                if let StreamDirective::Disconnect(reason) = handle_message(message, context.runtime)
                {
                    return StreamOutcome::Closed(reason);
                }
            }
            Err(error) => {
                return StreamOutcome::Errored(format!("websocket frame error: {error}"));
            }
        }
    }
}

async fn close_normally(websocket_stream: &mut BinanceWsStream) {
    let close_frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "feed stopped".into(),
    };
    if let Err(error) = websocket_stream.close(Some(close_frame)).await {
        tracing::debug!(%error, "websocket close handshake failed");
    }
}

fn handle_message(message: Message, runtime: &BridgeRuntime) -> StreamDirective {
    let mut owned_payload = match message {
        Message::Text(text_payload) => text_payload.into_bytes(),
        Message::Binary(binary_payload) => binary_payload,
        Message::Close(close_frame) => {
            let reason = match close_frame {
                Some(frame) => format!("server closed stream ({}): {}", frame.code, frame.reason),
                None => "server closed stream".to_string(),
            };
            return StreamDirective::Disconnect(reason);
        }
        _ => return StreamDirective::Continue,
    };

    let update = match parse_ticker_payload(owned_payload.as_mut_slice()) {
        Ok(update) => update,
        Err(error) => {
            runtime.status.telemetry.record_dropped();
            tracing::debug!(%error, "dropping malformed ticker frame");
            return StreamDirective::Continue;
        }
    };

    let Some(asset_id) = runtime.mapper.resolve(&update.symbol) else {
        runtime.status.telemetry.record_dropped();
        return StreamDirective::Continue;
    };

    if !runtime
        .reconciler
        .apply(&asset_id, update.price, update.high, update.low)
    {
        runtime.status.telemetry.record_dropped();
        tracing::trace!(symbol = %update.symbol, asset = %asset_id, "dropping frame for asset outside roster");
        return StreamDirective::Continue;
    }

    runtime.status.telemetry.record_applied(now_unix_ms());
    runtime
        .fallback
        .record_channel_update(&asset_id, Instant::now());
    StreamDirective::Continue
}
