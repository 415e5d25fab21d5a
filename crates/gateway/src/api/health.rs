//! `GET /v1/health`: pipeline load and backend readiness for probes.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub queue_depth: usize,
    pub admission_available: usize,
    pub sessions: usize,
    pub backends: Vec<BackendHealth>,
}

#[derive(Debug, Serialize)]
pub struct BackendHealth {
    pub id: String,
    /// Milliseconds until the backend may be called again; 0 when ready.
    pub ready_in_ms: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let backends = state
        .governor
        .backend_ids()
        .into_iter()
        .map(|id| BackendHealth {
            id: id.to_owned(),
            ready_in_ms: state
                .governor
                .ready_in(id)
                .map_or(0, |d| d.as_millis() as u64),
        })
        .collect::<Vec<_>>();

    let status = if state.queue.is_closed() {
        "shutting_down"
    } else if backends.is_empty() {
        "degraded"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        queue_depth: state.queue.len(),
        admission_available: state.admission.available_permits(),
        sessions: state.sessions.len(),
        backends,
    })
}
