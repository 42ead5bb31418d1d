use crate::game::engine::ChartEngine;
use crate::game::pipeline::FeedTelemetry;
use crate::game::types::{FeedStatusSnapshot, FrameSnapshot};
use parking_lot::Mutex as EngineMutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Everything one chart instance owns. Nothing here is shared with other
/// rooms; cancelling the token stops only this room's tasks.
pub struct RoomSession {
    pub engine: Arc<EngineMutex<ChartEngine>>,
    pub status: Arc<RwLock<FeedStatusSnapshot>>,
    pub telemetry: Arc<FeedTelemetry>,
    pub frames: watch::Receiver<Option<FrameSnapshot>>,
    pub cancellation_token: CancellationToken,
    pub join_handles: Vec<JoinHandle<()>>,
}

impl RoomSession {
    pub async fn shutdown(self) {
        self.cancellation_token.cancel();
        for handle in self.join_handles {
            let _ = handle.await;
        }
    }
}

/// Explicitly constructed owner of all running room sessions.
pub struct SessionRegistry {
    pub started_at: Instant,
    pub sessions: Mutex<HashMap<String, RoomSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Stops every session. Used when the owning view is torn down.
    pub async fn shutdown(&self) {
        let drained: Vec<RoomSession> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().map(|(_, session)| session).collect()
        };
        for session in drained {
            session.shutdown().await;
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
