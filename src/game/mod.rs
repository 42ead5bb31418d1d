pub mod axis;
pub mod candles;
pub mod engine;
pub mod feed;
pub mod lifecycle;
pub mod pipeline;
pub mod protocol;
pub mod smoothing;
pub mod types;

pub const GAME_START_MESSAGE: &str = "game_start";
pub const COUNTDOWN_MESSAGE: &str = "countdown";
pub const PRICE_UPDATE_MESSAGE: &str = "price_update";
pub const GAME_END_MESSAGE: &str = "game_end";
pub const SUBSCRIBE_MESSAGE: &str = "subscribe";
