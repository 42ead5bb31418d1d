use crate::error::ChartError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CANDLE_CAPACITY: usize = 100;
pub const DEFAULT_SMOOTHING_FACTOR: f64 = 120.0;
pub const DEFAULT_BASELINE_VALUE: f64 = 1.0;
pub const DEFAULT_BAND_FRACTION: f64 = 0.5;
pub const DEFAULT_EXPAND_THRESHOLD: f64 = 0.15;
pub const DEFAULT_EXPAND_FRACTION: f64 = 0.2;
pub const DEFAULT_MIN_RANGE_SPAN: f64 = 0.4;
pub const DEFAULT_MAX_VISIBLE_CANDLES: usize = 50;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;
pub const DEFAULT_LIVE_SNAP_EPSILON: f64 = 0.0001;
pub const DEFAULT_CHANNEL: &str = "crash";
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;
pub const DEFAULT_RECONNECT: bool = true;
pub const MIN_CANDLE_CAPACITY: usize = 1;
pub const MAX_CANDLE_CAPACITY: usize = 10_000;
pub const MIN_SMOOTHING_FACTOR: f64 = 1.0;
pub const MAX_SMOOTHING_FACTOR: f64 = 10_000.0;
pub const MIN_MAX_VISIBLE_CANDLES: usize = 1;
pub const MAX_MAX_VISIBLE_CANDLES: usize = 1_000;
pub const MIN_TICK_INTERVAL_MS: u64 = 1;
pub const MAX_TICK_INTERVAL_MS: u64 = 60_000;
pub const MIN_FRAME_INTERVAL_MS: u64 = 8;
pub const MAX_FRAME_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Connecting,
    Countdown,
    Running,
    Crashed,
}

impl RoundPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Countdown => "countdown",
            Self::Running => "running",
            Self::Crashed => "crashed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoundState {
    pub phase: RoundPhase,
    pub round_id: Option<String>,
    pub baseline_value: f64,
    pub countdown_remaining: Option<f64>,
    pub terminal_value: Option<f64>,
    pub peak_value: Option<f64>,
    pub abnormal_termination: bool,
}

impl RoundState {
    pub fn connecting(baseline_value: f64) -> Self {
        Self {
            phase: RoundPhase::Connecting,
            round_id: None,
            baseline_value,
            countdown_remaining: None,
            terminal_value: None,
            peak_value: None,
            abnormal_termination: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CandleKind {
    Regular,
    /// Synthesized on abnormal termination; always closes at zero.
    Crash,
}

/// One fixed slice of the price series.
///
/// `close` stays `None` until the slice is complete; readers that need the
/// in-progress close use [`Candle::display_close`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub id: u64,
    pub open: f64,
    pub close: Option<f64>,
    pub high: f64,
    pub low: f64,
    pub sample_values: Vec<f64>,
    pub start_time_ms: i64,
    pub duration_ms: i64,
    pub is_complete: bool,
    pub kind: CandleKind,
}

impl Candle {
    pub fn from_sample(id: u64, value: f64, start_time_ms: i64, tick_interval_ms: u64) -> Self {
        Self {
            id,
            open: value,
            close: None,
            high: value,
            low: value,
            sample_values: vec![value],
            start_time_ms,
            duration_ms: tick_interval_ms.min(i64::MAX as u64) as i64,
            is_complete: false,
            kind: CandleKind::Regular,
        }
    }

    pub fn crash(id: u64, last_known_value: f64, start_time_ms: i64) -> Self {
        Self {
            id,
            open: last_known_value,
            close: Some(0.0),
            high: last_known_value,
            low: 0.0,
            sample_values: Vec::new(),
            start_time_ms,
            duration_ms: 0,
            is_complete: true,
            kind: CandleKind::Crash,
        }
    }

    pub fn push_sample(&mut self, value: f64, tick_interval_ms: u64) {
        self.high = self.high.max(value);
        self.low = self.low.min(value);
        self.sample_values.push(value);
        self.duration_ms = self
            .duration_ms
            .saturating_add(tick_interval_ms.min(i64::MAX as u64) as i64);
    }

    pub fn latest_value(&self) -> f64 {
        self.sample_values.last().copied().unwrap_or(self.open)
    }

    pub fn display_close(&self) -> f64 {
        self.close.unwrap_or_else(|| self.latest_value())
    }

    pub fn sample_count(&self) -> usize {
        self.sample_values.len()
    }

    pub fn finalize(&mut self) {
        self.close = Some(self.latest_value());
        self.is_complete = true;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewRange {
    pub min: f64,
    pub max: f64,
}

impl ViewRange {
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn contains(&self, low: f64, high: f64) -> bool {
        low >= self.min && high <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EngineArgs {
    pub candle_capacity: Option<usize>,
    pub smoothing_factor: Option<f64>,
    pub baseline_value: Option<f64>,
    pub default_band_fraction: Option<f64>,
    pub expand_threshold: Option<f64>,
    pub expand_fraction: Option<f64>,
    pub min_range_span: Option<f64>,
    pub max_visible_candles: Option<usize>,
    pub tick_interval_ms: Option<u64>,
    pub live_snap_epsilon: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub candle_capacity: usize,
    pub smoothing_factor: f64,
    pub baseline_value: f64,
    pub default_band_fraction: f64,
    pub expand_threshold: f64,
    pub expand_fraction: f64,
    pub min_range_span: f64,
    pub max_visible_candles: usize,
    pub tick_interval_ms: u64,
    pub live_snap_epsilon: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            candle_capacity: DEFAULT_CANDLE_CAPACITY,
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            baseline_value: DEFAULT_BASELINE_VALUE,
            default_band_fraction: DEFAULT_BAND_FRACTION,
            expand_threshold: DEFAULT_EXPAND_THRESHOLD,
            expand_fraction: DEFAULT_EXPAND_FRACTION,
            min_range_span: DEFAULT_MIN_RANGE_SPAN,
            max_visible_candles: DEFAULT_MAX_VISIBLE_CANDLES,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            live_snap_epsilon: DEFAULT_LIVE_SNAP_EPSILON,
        }
    }
}

fn positive_finite(name: &str, value: f64) -> Result<f64, ChartError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ChartError::InvalidArgument(format!(
            "{name} must be a finite positive number"
        )));
    }
    Ok(value)
}

impl EngineArgs {
    pub fn normalize(self) -> Result<EngineConfig, ChartError> {
        let candle_capacity = self.candle_capacity.unwrap_or(DEFAULT_CANDLE_CAPACITY);
        if !(MIN_CANDLE_CAPACITY..=MAX_CANDLE_CAPACITY).contains(&candle_capacity) {
            return Err(ChartError::InvalidArgument(format!(
                "candleCapacity must be between {MIN_CANDLE_CAPACITY} and {MAX_CANDLE_CAPACITY}"
            )));
        }

        let smoothing_factor = self.smoothing_factor.unwrap_or(DEFAULT_SMOOTHING_FACTOR);
        if !smoothing_factor.is_finite()
            || !(MIN_SMOOTHING_FACTOR..=MAX_SMOOTHING_FACTOR).contains(&smoothing_factor)
        {
            return Err(ChartError::InvalidArgument(format!(
                "smoothingFactor must be between {MIN_SMOOTHING_FACTOR} and {MAX_SMOOTHING_FACTOR}"
            )));
        }

        let baseline_value = self.baseline_value.unwrap_or(DEFAULT_BASELINE_VALUE);
        if !baseline_value.is_finite() || baseline_value < 0.0 {
            return Err(ChartError::InvalidArgument(
                "baselineValue must be a finite non-negative number".to_string(),
            ));
        }

        let default_band_fraction = positive_finite(
            "defaultBandFraction",
            self.default_band_fraction.unwrap_or(DEFAULT_BAND_FRACTION),
        )?;

        let expand_threshold = positive_finite(
            "expandThreshold",
            self.expand_threshold.unwrap_or(DEFAULT_EXPAND_THRESHOLD),
        )?;
        if expand_threshold >= 0.5 {
            return Err(ChartError::InvalidArgument(
                "expandThreshold must be below 0.5".to_string(),
            ));
        }

        let expand_fraction = positive_finite(
            "expandFraction",
            self.expand_fraction.unwrap_or(DEFAULT_EXPAND_FRACTION),
        )?;
        if expand_fraction <= expand_threshold {
            return Err(ChartError::InvalidArgument(
                "expandFraction must exceed expandThreshold".to_string(),
            ));
        }

        let min_range_span = positive_finite(
            "minRangeSpan",
            self.min_range_span.unwrap_or(DEFAULT_MIN_RANGE_SPAN),
        )?;

        let max_visible_candles = self
            .max_visible_candles
            .unwrap_or(DEFAULT_MAX_VISIBLE_CANDLES);
        if !(MIN_MAX_VISIBLE_CANDLES..=MAX_MAX_VISIBLE_CANDLES).contains(&max_visible_candles) {
            return Err(ChartError::InvalidArgument(format!(
                "maxVisibleCandles must be between {MIN_MAX_VISIBLE_CANDLES} and {MAX_MAX_VISIBLE_CANDLES}"
            )));
        }

        let tick_interval_ms = self.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS);
        if !(MIN_TICK_INTERVAL_MS..=MAX_TICK_INTERVAL_MS).contains(&tick_interval_ms) {
            return Err(ChartError::InvalidArgument(format!(
                "tickIntervalMs must be between {MIN_TICK_INTERVAL_MS} and {MAX_TICK_INTERVAL_MS}"
            )));
        }

        let live_snap_epsilon = self.live_snap_epsilon.unwrap_or(DEFAULT_LIVE_SNAP_EPSILON);
        if !live_snap_epsilon.is_finite() || live_snap_epsilon < 0.0 {
            return Err(ChartError::InvalidArgument(
                "liveSnapEpsilon must be a finite non-negative number".to_string(),
            ));
        }

        Ok(EngineConfig {
            candle_capacity,
            smoothing_factor,
            baseline_value,
            default_band_fraction,
            expand_threshold,
            expand_fraction,
            min_range_span,
            max_visible_candles,
            tick_interval_ms,
            live_snap_epsilon,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeedArgs {
    pub url: Option<String>,
    pub room_id: Option<String>,
    pub channel: Option<String>,
    pub frame_interval_ms: Option<u64>,
    pub reconnect: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub url: String,
    pub room_id: Option<String>,
    pub channel: String,
    pub frame_interval_ms: u64,
    pub reconnect: bool,
}

fn valid_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

impl FeedArgs {
    pub fn normalize(self) -> Result<FeedConfig, ChartError> {
        let url = self.url.unwrap_or_default().trim().to_string();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ChartError::InvalidArgument(
                "url must be a ws:// or wss:// endpoint".to_string(),
            ));
        }

        let room_id = self
            .room_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        if let Some(room_id) = room_id.as_deref() {
            if !valid_identifier(room_id) {
                return Err(ChartError::InvalidArgument(
                    "roomId must be alphanumeric ASCII (dashes and underscores allowed)"
                        .to_string(),
                ));
            }
        }

        let channel = self
            .channel
            .unwrap_or_else(|| DEFAULT_CHANNEL.to_string())
            .trim()
            .to_ascii_lowercase();
        if !valid_identifier(&channel) {
            return Err(ChartError::InvalidArgument(
                "channel must be non-empty alphanumeric ASCII".to_string(),
            ));
        }

        let frame_interval_ms = self.frame_interval_ms.unwrap_or(DEFAULT_FRAME_INTERVAL_MS);
        if !(MIN_FRAME_INTERVAL_MS..=MAX_FRAME_INTERVAL_MS).contains(&frame_interval_ms) {
            return Err(ChartError::InvalidArgument(format!(
                "frameIntervalMs must be between {MIN_FRAME_INTERVAL_MS} and {MAX_FRAME_INTERVAL_MS}"
            )));
        }

        Ok(FeedConfig {
            url,
            room_id,
            channel,
            frame_interval_ms,
            reconnect: self.reconnect.unwrap_or(DEFAULT_RECONNECT),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedConnectionState {
    Connecting,
    Live,
    Reconnecting,
    Stopped,
    Error,
}

impl FeedConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Live => "live",
            Self::Reconnecting => "reconnecting",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatusSnapshot {
    pub state: FeedConnectionState,
    pub room_id: Option<String>,
    pub messages_applied: u64,
    pub messages_dropped: u64,
    pub reconnect_attempt: u32,
    pub reason: Option<String>,
}

impl FeedStatusSnapshot {
    pub fn stopped(room_id: Option<String>, reason: Option<String>) -> Self {
        Self {
            state: FeedConnectionState::Stopped,
            room_id,
            messages_applied: 0,
            messages_dropped: 0,
            reconnect_attempt: 0,
            reason,
        }
    }
}

/// Displayed (smoothed) OHLC for one visible candle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayCandle {
    pub id: u64,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub is_complete: bool,
    pub kind: CandleKind,
}

impl DisplayCandle {
    /// Renderers draw zero-height bodies as a thin line instead of a rectangle.
    pub fn is_doji(&self) -> bool {
        self.open == self.close
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrameSnapshot {
    pub candles: Vec<DisplayCandle>,
    pub view_range: ViewRange,
    pub phase: RoundPhase,
    pub round_id: Option<String>,
    pub live_value: f64,
    pub countdown_remaining: Option<f64>,
    pub abnormal_termination: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub round: RoundState,
    pub view_range: ViewRange,
    pub candles: Vec<Candle>,
}

pub const DEFAULT_SESSION_KEY: &str = "main";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartRoomSessionArgs {
    pub room_id: Option<String>,
    pub engine: Option<EngineArgs>,
    pub feed: Option<FeedArgs>,
    pub frame_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomSessionConfig {
    pub session_key: String,
    pub engine: EngineConfig,
    pub feed: Option<FeedConfig>,
    pub frame_interval_ms: u64,
}

impl StartRoomSessionArgs {
    /// A room session without an explicit feed room id subscribes to the
    /// feed for its own key; the main session uses the bare feed url.
    /// A top-level frame interval wins over the feed's.
    pub fn normalize(self) -> Result<RoomSessionConfig, ChartError> {
        let session_key = self
            .room_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_KEY.to_string());
        if !valid_identifier(&session_key) {
            return Err(ChartError::InvalidArgument(
                "roomId must be alphanumeric ASCII (dashes and underscores allowed)".to_string(),
            ));
        }

        let engine = self.engine.unwrap_or_default().normalize()?;
        let feed = match self.feed {
            Some(mut feed_args) => {
                if feed_args.room_id.is_none() && session_key != DEFAULT_SESSION_KEY {
                    feed_args.room_id = Some(session_key.clone());
                }
                Some(feed_args.normalize()?)
            }
            None => None,
        };
        let frame_interval_ms = match self.frame_interval_ms {
            Some(value) => {
                if !(MIN_FRAME_INTERVAL_MS..=MAX_FRAME_INTERVAL_MS).contains(&value) {
                    return Err(ChartError::InvalidArgument(format!(
                        "frameIntervalMs must be between {MIN_FRAME_INTERVAL_MS} and {MAX_FRAME_INTERVAL_MS}"
                    )));
                }
                value
            }
            None => feed
                .as_ref()
                .map(|feed| feed.frame_interval_ms)
                .unwrap_or(DEFAULT_FRAME_INTERVAL_MS),
        };

        Ok(RoomSessionConfig {
            session_key,
            engine,
            feed,
            frame_interval_ms,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSessionInfo {
    pub room_id: String,
    pub candle_capacity: usize,
    pub smoothing_factor: f64,
    pub frame_interval_ms: u64,
    pub feed_url: Option<String>,
}

impl RoomSessionInfo {
    pub fn from_config(config: &RoomSessionConfig) -> Self {
        Self {
            room_id: config.session_key.clone(),
            candle_capacity: config.engine.candle_capacity,
            smoothing_factor: config.engine.smoothing_factor,
            frame_interval_ms: config.frame_interval_ms,
            feed_url: config.feed.as_ref().map(|feed| feed.url.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSessionStopResult {
    pub room_id: String,
    pub stopped: bool,
}
