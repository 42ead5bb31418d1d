pub mod health;
pub mod room_session;
