use crate::ratelimit::RateLimit;

/// Shared error type used across all chatrelay crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("backend {backend} throttled the request")]
    RateLimited { backend: String, limits: RateLimit },

    #[error("backend {backend} unavailable (HTTP {status})")]
    Unavailable {
        backend: String,
        status: u16,
        limits: RateLimit,
    },

    #[error("backend {backend}: {message}")]
    Provider { backend: String, message: String },

    #[error("query too long: {len} > {max} characters")]
    InputTooLarge { len: usize, max: usize },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Throttling, unavailability, timeouts and connection failures.
    /// These are the errors the governor fails over on and the retry
    /// decorator retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. }
                | Error::Unavailable { .. }
                | Error::Timeout(_)
                | Error::Http(_)
        )
    }

    pub fn is_throttle(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    /// Rate-limit metadata carried by a failed response, if any.
    pub fn rate_limit(&self) -> Option<&RateLimit> {
        match self {
            Error::RateLimited { limits, .. } | Error::Unavailable { limits, .. } => Some(limits),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
