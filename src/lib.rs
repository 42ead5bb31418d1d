pub mod commands;
pub mod error;
pub mod game;
pub mod logging;
pub mod state;

pub use commands::health::health;
pub use commands::room_session::{
    push_room_event, room_session_status, room_snapshot, start_room_session, stop_room_session,
    subscribe_room_frames,
};
pub use error::ChartError;
pub use game::candles::merge_for_history;
pub use game::engine::{ApplyOutcome, ChartEngine};
pub use game::pipeline::{run_game_feed, run_render_loop, FeedTelemetry, FrameSink};
pub use game::protocol::{decode_server_message, GameEvent};
pub use game::types::{
    Candle, CandleKind, DisplayCandle, EngineArgs, EngineConfig, EngineSnapshot, FeedArgs,
    FeedConfig, FeedStatusSnapshot, FrameSnapshot, RoundPhase, RoundState, StartRoomSessionArgs,
    ViewRange,
};
pub use logging::init_logging;
pub use state::SessionRegistry;
