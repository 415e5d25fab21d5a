use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::Envelope;
use crate::mode::Mode;

/// One coalesced unit of work, produced when a session's debounce timer
/// fires and consumed exactly once by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub session_id: String,
    /// Buffered fragments joined in arrival order.
    pub query: String,
    /// How many fragments were coalesced into `query`.
    pub fragments: usize,
    pub envelope: Envelope,
    /// Mode in effect when the buffer was flushed.
    pub mode: Mode,
    pub locale: String,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        envelope: Envelope,
        query: String,
        fragments: usize,
        mode: Mode,
        locale: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: envelope.session_id.clone(),
            query,
            fragments,
            envelope,
            mode,
            locale: locale.into(),
            created_at: Utc::now(),
        }
    }
}
