use serde::Serialize;

/// Structured trace events emitted across all chatrelay crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    JobFlushed {
        session_id: String,
        job_id: String,
        fragments: usize,
        query_chars: usize,
    },
    JobRejected {
        session_id: String,
        reason: String,
        query_chars: usize,
    },
    JobDispatched {
        session_id: String,
        job_id: String,
        mode: String,
        priority: u8,
        worker: usize,
        queued_ms: u64,
    },
    JobFinished {
        session_id: String,
        job_id: String,
        outcome: String,
        duration_ms: u64,
    },
    LlmRequest {
        backend: String,
        model: String,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    LlmFallback {
        from_backend: String,
        to_backend: String,
        reason: String,
    },
    BackendPaced {
        backend: String,
        delay_ms: u64,
        exhausted: bool,
    },
    RenderDegraded {
        session_id: String,
        frame_index: usize,
        stage: String,
    },
    AttachmentEmitted {
        session_id: String,
        name: String,
        bytes: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "cr_event");
    }
}
