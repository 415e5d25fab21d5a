use cr_domain::ratelimit::RateLimit;
use cr_domain::Result;
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A backend-agnostic completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    /// Sampling temperature. `None` uses the backend's configured default.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` uses the backend's default.
    pub max_tokens: Option<u32>,
}

/// Token usage reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: Option<Usage>,
    /// Rate-limit metadata read off the response.
    pub rate_limit: RateLimit,
    /// Backend that produced the answer (may differ from the preferred one
    /// after failover).
    pub backend: String,
    pub model: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core backend trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A text-generation service identity the governor can pace and fail over
/// between.
///
/// Throttling must surface as [`Error::RateLimited`](cr_domain::Error::RateLimited)
/// and transient unavailability as [`Error::Unavailable`](cr_domain::Error::Unavailable),
/// both carrying whatever rate-limit headers came back.
#[async_trait::async_trait]
pub trait CompletionBackend: Send + Sync {
    fn id(&self) -> &str;

    fn model(&self) -> &str;

    async fn complete(&self, req: &CompletionRequest) -> Result<Completion>;
}
