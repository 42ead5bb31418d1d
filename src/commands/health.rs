use crate::{error::ChartError, state::SessionRegistry};
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u128,
    pub active_sessions: usize,
}

pub fn build_health_response(started_at: Instant, active_sessions: usize) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_ms: started_at.elapsed().as_millis(),
        active_sessions,
    }
}

pub async fn health(registry: &SessionRegistry) -> Result<HealthResponse, ChartError> {
    let active_sessions = registry.sessions.lock().await.len();
    Ok(build_health_response(registry.started_at, active_sessions))
}
