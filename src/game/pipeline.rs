use crate::error::ChartError;
use crate::game::engine::ChartEngine;
use crate::game::feed::connect_game_stream;
use crate::game::protocol::decode_server_message;
use crate::game::types::{FeedConfig, FeedConnectionState, FeedStatusSnapshot, FrameSnapshot};
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const STATUS_ERROR_THROTTLE_MS: u64 = 500;

/// Receives one frame per render tick. Drawing lives behind this trait.
pub trait FrameSink: Send + 'static {
    fn present(&mut self, frame: &FrameSnapshot);
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn present(&mut self, frame: &FrameSnapshot) {
        (**self).present(frame);
    }
}

impl FrameSink for watch::Sender<Option<FrameSnapshot>> {
    fn present(&mut self, frame: &FrameSnapshot) {
        self.send_replace(Some(frame.clone()));
    }
}

/// Feed counters shared between the network task and status readers.
#[derive(Debug, Default)]
pub struct FeedTelemetry {
    messages_applied: AtomicU64,
    messages_dropped: AtomicU64,
    reconnect_attempt: AtomicU32,
}

impl FeedTelemetry {
    fn record_applied(&self) {
        self.messages_applied.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn set_reconnect_attempt(&self, attempt: u32) {
        self.reconnect_attempt.store(attempt, Ordering::Relaxed);
    }

    pub fn messages_applied(&self) -> u64 {
        self.messages_applied.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt.load(Ordering::Relaxed)
    }

    /// Overlays the live counters onto a published snapshot.
    pub fn apply_to(&self, snapshot: &mut FeedStatusSnapshot) {
        snapshot.messages_applied = self.messages_applied();
        snapshot.messages_dropped = self.messages_dropped();
        snapshot.reconnect_attempt = self.reconnect_attempt();
    }
}

#[derive(Debug, Default)]
struct StatusPublishThrottle {
    last_state: Option<FeedConnectionState>,
    last_reason: Option<String>,
    last_emit: Option<Instant>,
}

struct FeedRuntimeContext<'a> {
    config: &'a FeedConfig,
    engine: &'a Arc<Mutex<ChartEngine>>,
    status_store: &'a Arc<RwLock<FeedStatusSnapshot>>,
    status_throttle: &'a Mutex<StatusPublishThrottle>,
    telemetry: &'a Arc<FeedTelemetry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamDirective {
    Continue,
    Reconnect,
    /// Server closed the feed normally; there is nothing to reconnect to.
    Finished,
}

/// Network clock: keeps one websocket feed applied to `engine` until
/// cancelled, the server closes normally, or a drop happens with
/// reconnection disabled.
pub async fn run_game_feed(
    config: FeedConfig,
    engine: Arc<Mutex<ChartEngine>>,
    status_store: Arc<RwLock<FeedStatusSnapshot>>,
    telemetry: Arc<FeedTelemetry>,
    cancel_token: CancellationToken,
) {
    let status_throttle = Mutex::new(StatusPublishThrottle::default());
    let context = FeedRuntimeContext {
        config: &config,
        engine: &engine,
        status_store: &status_store,
        status_throttle: &status_throttle,
        telemetry: &telemetry,
    };

    let mut reconnect_attempt: u32 = 0;
    let mut stop_reason = "feed stopped".to_string();
    while !cancel_token.is_cancelled() {
        telemetry.set_reconnect_attempt(reconnect_attempt);
        let (state, reason) = if reconnect_attempt == 0 {
            (
                FeedConnectionState::Connecting,
                "opening websocket feed".to_string(),
            )
        } else {
            (
                FeedConnectionState::Reconnecting,
                format!("reconnect attempt {reconnect_attempt}"),
            )
        };
        publish_status(&context, state, Some(reason)).await;

        match connect_game_stream(&config).await {
            Ok(mut websocket_stream) => {
                reconnect_attempt = 0;
                telemetry.set_reconnect_attempt(0);
                publish_status(
                    &context,
                    FeedConnectionState::Live,
                    Some("websocket connected".to_string()),
                )
                .await;

                let mut directive = StreamDirective::Reconnect;
                loop {
                    let frame = tokio::select! {
                        _ = cancel_token.cancelled() => {
                            break;
                        }
                        next_message = websocket_stream.next() => next_message,
                    };

                    let Some(frame_result) = frame else {
                        break;
                    };

                    match frame_result {
                        Ok(message) => match handle_message(message, &context).await {
                            StreamDirective::Continue => {}
                            other => {
                                directive = other;
                                break;
                            }
                        },
                        Err(error) => {
                            publish_status_throttled(
                                &context,
                                FeedConnectionState::Reconnecting,
                                Some(format!("websocket frame error: {error}")),
                            )
                            .await;
                            break;
                        }
                    }
                }

                if cancel_token.is_cancelled() {
                    break;
                }
                if directive == StreamDirective::Finished {
                    stop_reason = "server closed feed".to_string();
                    break;
                }

                engine.lock().disconnect();
            }
            Err(error) => {
                publish_status_throttled(
                    &context,
                    FeedConnectionState::Reconnecting,
                    Some(format!("websocket connect error: {error}")),
                )
                .await;
            }
        }

        if !config.reconnect {
            stop_reason = "feed dropped; reconnect disabled".to_string();
            break;
        }

        reconnect_attempt = reconnect_attempt.saturating_add(1);
        let delay = reconnect_delay(reconnect_attempt);
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    publish_status(&context, FeedConnectionState::Stopped, Some(stop_reason)).await;
}

async fn handle_message(message: Message, context: &FeedRuntimeContext<'_>) -> StreamDirective {
    let decoded = match message {
        Message::Text(text_payload) => {
            let mut owned_payload = text_payload.into_bytes();
            decode_server_message(owned_payload.as_mut_slice())
        }
        Message::Binary(mut binary_payload) => decode_server_message(binary_payload.as_mut_slice()),
        Message::Close(close_frame) => {
            let normal = close_frame
                .map(|frame| frame.code == CloseCode::Normal)
                .unwrap_or(false);
            return if normal {
                StreamDirective::Finished
            } else {
                StreamDirective::Reconnect
            };
        }
        _ => return StreamDirective::Continue,
    };

    let event = match decoded {
        Ok(event) => event,
        Err(ChartError::UnknownMessage(kind)) => {
            context.telemetry.record_dropped();
            tracing::debug!(
                room = ?context.config.room_id,
                kind = kind.as_str(),
                "unknown message dropped"
            );
            return StreamDirective::Continue;
        }
        Err(error) => {
            context.telemetry.record_dropped();
            tracing::warn!(room = ?context.config.room_id, %error, "malformed message dropped");
            return StreamDirective::Continue;
        }
    };

    let kind = event.kind();
    let now_ms = now_unix_ms();
    let outcome = {
        let mut writable = context.engine.lock();
        writable.apply_event(event, now_ms)
    };
    if outcome.is_ignored() {
        context.telemetry.record_dropped();
        tracing::debug!(room = ?context.config.room_id, kind, "event not applied");
    } else {
        context.telemetry.record_applied();
    }
    StreamDirective::Continue
}

/// Frame clock: steps `engine` once per interval and hands the frame to
/// `sink`, until cancelled.
pub async fn run_render_loop<S: FrameSink>(
    engine: Arc<Mutex<ChartEngine>>,
    frame_interval_ms: u64,
    mut sink: S,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(frame_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                break;
            }
            _ = ticker.tick() => {
                let frame = {
                    let mut writable = engine.lock();
                    writable.step_frame()
                };
                sink.present(&frame);
            }
        }
    }
}

async fn publish_status(
    context: &FeedRuntimeContext<'_>,
    state: FeedConnectionState,
    reason: Option<String>,
) {
    let mut snapshot = FeedStatusSnapshot {
        state,
        room_id: context.config.room_id.clone(),
        messages_applied: 0,
        messages_dropped: 0,
        reconnect_attempt: 0,
        reason,
    };
    context.telemetry.apply_to(&mut snapshot);

    match state {
        FeedConnectionState::Reconnecting | FeedConnectionState::Error => tracing::warn!(
            room = ?snapshot.room_id,
            reason = snapshot.reason.as_deref().unwrap_or(""),
            "feed {}",
            state.as_str()
        ),
        _ => tracing::info!(
            room = ?snapshot.room_id,
            reason = snapshot.reason.as_deref().unwrap_or(""),
            "feed {}",
            state.as_str()
        ),
    }

    let mut writable = context.status_store.write().await;
    *writable = snapshot;
}

fn allow_status_publish(
    throttle: &Mutex<StatusPublishThrottle>,
    state: FeedConnectionState,
    reason: &Option<String>,
) -> bool {
    let mut writable = throttle.lock();
    let now = Instant::now();
    let should_throttle = matches!(
        state,
        FeedConnectionState::Error | FeedConnectionState::Reconnecting
    );

    if should_throttle
        && writable.last_state == Some(state)
        && writable.last_reason == *reason
        && writable
            .last_emit
            .map(|instant| {
                now.duration_since(instant) < Duration::from_millis(STATUS_ERROR_THROTTLE_MS)
            })
            .unwrap_or(false)
    {
        return false;
    }

    writable.last_state = Some(state);
    writable.last_reason = reason.clone();
    writable.last_emit = Some(now);
    true
}

async fn publish_status_throttled(
    context: &FeedRuntimeContext<'_>,
    state: FeedConnectionState,
    reason: Option<String>,
) {
    if !allow_status_publish(context.status_throttle, state, &reason) {
        return;
    }
    publish_status(context, state, reason).await;
}

fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.min(6);
    let base_ms = 200_u64.saturating_mul(1_u64 << exponent);
    let jitter_ms = (now_unix_ms().unsigned_abs() % 250).min(249);
    Duration::from_millis((base_ms + jitter_ms).min(5_000))
}

pub(crate) fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}
