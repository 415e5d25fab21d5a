mod debounce;
mod delivery;
mod dispatch;
mod governor;
mod locale;
mod observability;
mod server;

pub use debounce::*;
pub use delivery::*;
pub use dispatch::*;
pub use governor::*;
pub use locale::*;
pub use observability::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Smallest message ceiling the splitter can work with sensibly.
pub const MIN_MESSAGE_CHARS: usize = 64;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub debounce: DebounceConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub locale: LocaleConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.server.outbound_url.is_none() {
            errors.push(ConfigError::warning(
                "server.outbound_url",
                "no outbound webhook configured; `serve` cannot deliver replies",
            ));
        }

        if self.debounce.max_query_chars == 0 {
            errors.push(ConfigError::error(
                "debounce.max_query_chars",
                "must be greater than 0",
            ));
        }

        if self.dispatch.workers == 0 {
            errors.push(ConfigError::error("dispatch.workers", "need at least one worker"));
        }
        if self.dispatch.admission_limit == 0 {
            errors.push(ConfigError::error(
                "dispatch.admission_limit",
                "admission limit must be greater than 0",
            ));
        }

        // ── Governor ──────────────────────────────────────────────────
        let backends = &self.governor.backends;
        if backends.is_empty() {
            errors.push(ConfigError::error(
                "governor.backends",
                "at least one backend is required",
            ));
        } else if backends.len() == 1 {
            errors.push(ConfigError::warning(
                "governor.backends",
                "only one backend configured; failover is disabled",
            ));
        }

        let mut seen = HashSet::new();
        for (i, backend) in backends.iter().enumerate() {
            if backend.id.is_empty() {
                errors.push(ConfigError::error(
                    format!("governor.backends[{i}].id"),
                    "backend id must not be empty",
                ));
            } else if !seen.insert(backend.id.as_str()) {
                errors.push(ConfigError::error(
                    format!("governor.backends[{i}].id"),
                    format!("duplicate backend id '{}'", backend.id),
                ));
            }
            if backend.base_url.is_empty() {
                errors.push(ConfigError::error(
                    format!("governor.backends[{i}].base_url"),
                    "backend base_url must not be empty",
                ));
            }
        }

        let rps = self.governor.default_limit_rps;
        if rps.is_nan() || rps <= 0.0 {
            errors.push(ConfigError::error(
                "governor.default_limit_rps",
                "must be a positive number",
            ));
        }
        if self.governor.retry.attempts == 0 {
            errors.push(ConfigError::error(
                "governor.retry.attempts",
                "must allow at least one attempt",
            ));
        }

        // ── Delivery ──────────────────────────────────────────────────
        if self.delivery.max_message_chars < MIN_MESSAGE_CHARS {
            errors.push(ConfigError::error(
                "delivery.max_message_chars",
                format!("must be at least {MIN_MESSAGE_CHARS}"),
            ));
        }
        if self.delivery.code_attachment_threshold >= self.delivery.max_message_chars {
            errors.push(ConfigError::warning(
                "delivery.code_attachment_threshold",
                "threshold is not below the message ceiling; large code blocks will be split instead of attached",
            ));
        }

        errors.extend(self.observability.validate());

        errors
    }
}
