use serde::{Deserialize, Serialize};

/// Opaque addressing information for replies.
///
/// Captured from the latest inbound message of a session and carried by
/// the [`Job`](crate::job::Job) so the worker knows where the answer goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub session_id: String,
    /// Transport-level chat/conversation address.
    pub chat_id: String,
    /// Inbound message being answered, when the transport has one.
    #[serde(default)]
    pub message_id: Option<String>,
    /// Language code reported by the client, used to seed the session locale.
    #[serde(default)]
    pub language_hint: Option<String>,
}

impl Envelope {
    pub fn new(session_id: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            chat_id: chat_id.into(),
            message_id: None,
            language_hint: None,
        }
    }
}
