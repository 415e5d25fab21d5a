//! Inbound channel contract: the normalized envelope that connectors post.
//!
//! `POST /v1/inbound` takes exactly one of `text`, `voice_base64` or
//! `action` for a session. Work is accepted, not awaited: replies reach the
//! user through the outbound transport, so the response is `202 Accepted`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use base64::Engine;
use serde::{Deserialize, Serialize};

use cr_domain::envelope::Envelope;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct InboundRequest {
    pub session_id: String,
    /// Where replies for this session go.
    pub chat_id: String,
    #[serde(default)]
    pub message_id: Option<String>,
    /// Client language, e.g. `"ru-RU"`.
    #[serde(default)]
    pub language_hint: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Recorded audio, standard base64.
    #[serde(default)]
    pub voice_base64: Option<String>,
    /// Keyboard callback such as `set_mode:web`.
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Voice(Vec<u8>),
    Action(String),
}

impl InboundRequest {
    pub fn envelope(&self) -> Envelope {
        let mut envelope = Envelope::new(self.session_id.clone(), self.chat_id.clone());
        envelope.message_id = self.message_id.clone();
        envelope.language_hint = self.language_hint.clone();
        envelope
    }

    /// The single payload this request carries.
    pub fn payload(&self) -> Result<Payload, String> {
        if self.session_id.trim().is_empty() || self.chat_id.trim().is_empty() {
            return Err("session_id and chat_id must not be empty".into());
        }
        match (&self.text, &self.voice_base64, &self.action) {
            (Some(text), None, None) => Ok(Payload::Text(text.clone())),
            (None, Some(b64), None) => base64::engine::general_purpose::STANDARD
                .decode(b64.trim())
                .map(Payload::Voice)
                .map_err(|e| format!("voice_base64 is not valid base64: {e}")),
            (None, None, Some(action)) => Ok(Payload::Action(action.clone())),
            _ => Err("exactly one of text, voice_base64 or action is required".into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InboundResponse {
    pub status: &'static str,
    pub session_id: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/inbound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn inbound(
    State(state): State<AppState>,
    Json(body): Json<InboundRequest>,
) -> Response {
    let payload = match body.payload() {
        Ok(p) => p,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e })),
            )
                .into_response();
        }
    };

    if state.queue.is_closed() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "shutting down" })),
        )
            .into_response();
    }

    let envelope = body.envelope();
    let result = match payload {
        Payload::Text(text) => state.relay.on_text(envelope, &text).await,
        Payload::Voice(audio) => state.relay.on_voice(envelope, &audio).await,
        Payload::Action(action) => state.relay.on_action(envelope, &action).await,
    };

    if let Err(e) = result {
        tracing::error!(session_id = %body.session_id, error = %e, "inbound handling failed");
        return (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response();
    }

    (
        StatusCode::ACCEPTED,
        Json(InboundResponse {
            status: "accepted",
            session_id: body.session_id,
        }),
    )
        .into_response()
}
