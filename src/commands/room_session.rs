use crate::error::ChartError;
use crate::game::engine::{ApplyOutcome, ChartEngine};
use crate::game::pipeline::{now_unix_ms, run_game_feed, run_render_loop, FeedTelemetry};
use crate::game::protocol::GameEvent;
use crate::game::types::{
    EngineSnapshot, FeedStatusSnapshot, FrameSnapshot, RoomSessionInfo,
    RoomSessionStopResult, StartRoomSessionArgs, DEFAULT_SESSION_KEY,
};
use crate::state::{RoomSession, SessionRegistry};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;

fn session_key(room_id: Option<&str>) -> String {
    room_id
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_SESSION_KEY)
        .to_string()
}

/// Starts (or restarts) one room's engine, render loop and optional feed.
pub async fn start_room_session(
    registry: &SessionRegistry,
    args: Option<StartRoomSessionArgs>,
) -> Result<RoomSessionInfo, ChartError> {
    let config = args.unwrap_or_default().normalize()?;

    let existing = {
        let mut sessions = registry.sessions.lock().await;
        sessions.remove(&config.session_key)
    };
    if let Some(session) = existing {
        tracing::info!(room = %config.session_key, "replacing room session");
        session.shutdown().await;
    }

    let engine = Arc::new(Mutex::new(ChartEngine::new(config.engine.clone())));
    let idle_reason = if config.feed.is_some() {
        "feed starting"
    } else {
        "no feed attached"
    };
    let status = Arc::new(RwLock::new(FeedStatusSnapshot::stopped(
        config.feed.as_ref().and_then(|feed| feed.room_id.clone()),
        Some(idle_reason.to_string()),
    )));
    let telemetry = Arc::new(FeedTelemetry::default());
    let (frame_sender, frames) = watch::channel(None);
    let cancellation_token = CancellationToken::new();

    let mut join_handles = Vec::with_capacity(2);
    join_handles.push(tokio::spawn(run_render_loop(
        Arc::clone(&engine),
        config.frame_interval_ms,
        frame_sender,
        cancellation_token.clone(),
    )));
    if let Some(feed_config) = config.feed.clone() {
        join_handles.push(tokio::spawn(run_game_feed(
            feed_config,
            Arc::clone(&engine),
            Arc::clone(&status),
            Arc::clone(&telemetry),
            cancellation_token.clone(),
        )));
    }

    {
        let mut sessions = registry.sessions.lock().await;
        sessions.insert(
            config.session_key.clone(),
            RoomSession {
                engine,
                status,
                telemetry,
                frames,
                cancellation_token,
                join_handles,
            },
        );
    }

    tracing::info!(room = %config.session_key, "room session started");
    Ok(RoomSessionInfo::from_config(&config))
}

/// Stops one room. Sibling rooms keep running.
pub async fn stop_room_session(
    registry: &SessionRegistry,
    room_id: Option<&str>,
) -> Result<RoomSessionStopResult, ChartError> {
    let key = session_key(room_id);
    let existing = {
        let mut sessions = registry.sessions.lock().await;
        sessions.remove(&key)
    };

    let stopped = match existing {
        Some(session) => {
            session.shutdown().await;
            tracing::info!(room = %key, "room session stopped");
            true
        }
        None => false,
    };

    Ok(RoomSessionStopResult {
        room_id: key,
        stopped,
    })
}

pub async fn room_session_status(
    registry: &SessionRegistry,
    room_id: Option<&str>,
) -> Result<FeedStatusSnapshot, ChartError> {
    let key = session_key(room_id);
    let sessions = registry.sessions.lock().await;
    let session = sessions
        .get(&key)
        .ok_or_else(|| ChartError::SessionNotFound(key.clone()))?;

    let mut snapshot = session.status.read().await.clone();
    session.telemetry.apply_to(&mut snapshot);
    Ok(snapshot)
}

pub async fn room_snapshot(
    registry: &SessionRegistry,
    room_id: Option<&str>,
) -> Result<EngineSnapshot, ChartError> {
    let key = session_key(room_id);
    let sessions = registry.sessions.lock().await;
    let session = sessions
        .get(&key)
        .ok_or(ChartError::SessionNotFound(key))?;
    let snapshot = session.engine.lock().snapshot();
    Ok(snapshot)
}

/// Pushes one already-decoded event into a room, for adapters that own
/// their transport.
pub async fn push_room_event(
    registry: &SessionRegistry,
    room_id: Option<&str>,
    event: GameEvent,
) -> Result<ApplyOutcome, ChartError> {
    let key = session_key(room_id);
    let sessions = registry.sessions.lock().await;
    let session = sessions
        .get(&key)
        .ok_or(ChartError::SessionNotFound(key))?;
    let outcome = session.engine.lock().apply_event(event, now_unix_ms());
    Ok(outcome)
}

pub async fn subscribe_room_frames(
    registry: &SessionRegistry,
    room_id: Option<&str>,
) -> Result<watch::Receiver<Option<FrameSnapshot>>, ChartError> {
    let key = session_key(room_id);
    let sessions = registry.sessions.lock().await;
    let session = sessions
        .get(&key)
        .ok_or(ChartError::SessionNotFound(key))?;
    Ok(session.frames.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::types::{EngineArgs, FeedConnectionState, RoundPhase, ViewRange};
    use std::time::Duration;

    fn room_args(room_id: &str) -> StartRoomSessionArgs {
        StartRoomSessionArgs {
            room_id: Some(room_id.to_string()),
            engine: Some(EngineArgs {
                candle_capacity: Some(2),
                ..EngineArgs::default()
            }),
            feed: None,
            frame_interval_ms: None,
        }
    }

    #[tokio::test]
    async fn sessions_are_isolated_per_room() {
        let registry = SessionRegistry::new();
        start_room_session(&registry, Some(room_args("room-a")))
            .await
            .expect("room-a should start");
        start_room_session(&registry, Some(room_args("room-b")))
            .await
            .expect("room-b should start");

        push_room_event(
            &registry,
            Some("room-a"),
            GameEvent::RoundStarted {
                round_id: "g-1".to_string(),
                baseline_value: Some(1.0),
            },
        )
        .await
        .expect("room-a should accept events");
        for value in [1.0, 1.4, 1.9] {
            push_room_event(
                &registry,
                Some("room-a"),
                GameEvent::PriceTick {
                    value,
                    round_id: None,
                    round_ended: false,
                },
            )
            .await
            .expect("room-a should accept ticks");
        }

        let room_a = room_snapshot(&registry, Some("room-a"))
            .await
            .expect("room-a snapshot should exist");
        let room_b = room_snapshot(&registry, Some("room-b"))
            .await
            .expect("room-b snapshot should exist");
        assert_eq!(room_a.round.phase, RoundPhase::Running);
        assert_eq!(room_a.candles.len(), 2);
        assert_eq!(room_b.round.phase, RoundPhase::Connecting);
        assert!(room_b.candles.is_empty());
        assert_eq!(room_b.view_range, ViewRange { min: 0.5, max: 1.5 });

        let stopped = stop_room_session(&registry, Some("room-a"))
            .await
            .expect("stop should succeed");
        assert!(stopped.stopped);
        assert!(room_snapshot(&registry, Some("room-a")).await.is_err());
        assert!(room_snapshot(&registry, Some("room-b")).await.is_ok());

        registry.shutdown().await;
        assert!(registry.sessions.lock().await.is_empty());
    }

    #[tokio::test]
    async fn restarting_a_room_replaces_its_engine() {
        let registry = SessionRegistry::new();
        start_room_session(&registry, Some(room_args("room-a")))
            .await
            .expect("room should start");
        push_room_event(
            &registry,
            Some("room-a"),
            GameEvent::PriceTick {
                value: 2.0,
                round_id: Some("g-4".to_string()),
                round_ended: false,
            },
        )
        .await
        .expect("tick should apply");

        let info = start_room_session(&registry, Some(room_args("room-a")))
            .await
            .expect("room should restart");
        assert_eq!(info.room_id, "room-a");
        assert_eq!(info.candle_capacity, 2);

        let snapshot = room_snapshot(&registry, Some("room-a"))
            .await
            .expect("snapshot should exist");
        assert!(snapshot.candles.is_empty());
        assert_eq!(registry.sessions.lock().await.len(), 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn frames_flow_to_subscribers() {
        let registry = SessionRegistry::new();
        start_room_session(&registry, None)
            .await
            .expect("main session should start");
        let mut frames = subscribe_room_frames(&registry, None)
            .await
            .expect("main session should have frames");

        tokio::time::timeout(Duration::from_secs(2), frames.changed())
            .await
            .expect("a frame should arrive")
            .expect("render loop should be alive");
        let frame = frames
            .borrow()
            .clone()
            .expect("frame should be populated");
        assert_eq!(frame.phase, RoundPhase::Connecting);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn session_without_feed_uses_requested_frame_interval() {
        let registry = SessionRegistry::new();
        let info = start_room_session(
            &registry,
            Some(StartRoomSessionArgs {
                frame_interval_ms: Some(40),
                ..room_args("room-f")
            }),
        )
        .await
        .expect("room should start");

        assert_eq!(info.frame_interval_ms, 40);
        assert_eq!(info.feed_url, None);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn reports_missing_sessions() {
        let registry = SessionRegistry::new();

        let status = room_session_status(&registry, Some("ghost")).await;
        assert!(matches!(status, Err(ChartError::SessionNotFound(key)) if key == "ghost"));

        let stopped = stop_room_session(&registry, Some("ghost"))
            .await
            .expect("stopping a missing room should not fail");
        assert!(!stopped.stopped);
    }

    #[tokio::test]
    async fn session_without_feed_reports_idle_status() {
        let registry = SessionRegistry::new();
        start_room_session(&registry, Some(room_args("room-z")))
            .await
            .expect("room should start");

        let status = room_session_status(&registry, Some("room-z"))
            .await
            .expect("status should exist");
        assert_eq!(status.state, FeedConnectionState::Stopped);
        assert_eq!(status.reason.as_deref(), Some("no feed attached"));
        registry.shutdown().await;
    }
}
