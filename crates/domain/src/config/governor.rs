use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound call governor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Interchangeable generation backends, in preference order.
    #[serde(default = "d_backends")]
    pub backends: Vec<BackendConfig>,
    /// Pacing rate used when a backend advertises none.
    #[serde(default = "d_default_limit_rps")]
    pub default_limit_rps: f64,
    /// How long a backend stays ineligible after a failed call.
    #[serde(default = "d_failover_penalty_ms")]
    pub failover_penalty_ms: u64,
    #[serde(default = "d_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            backends: d_backends(),
            default_limit_rps: d_default_limit_rps(),
            failover_penalty_ms: d_failover_penalty_ms(),
            request_timeout_ms: d_request_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub id: String,
    /// OpenAI-compatible API root, e.g. `https://api.together.xyz/v1`.
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the bearer key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Retry decorator wrapped around whole logical operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "d_attempts")]
    pub attempts: u32,
    #[serde(default = "d_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "d_backoff")]
    pub backoff: f64,
    /// Shared cool-down applied after throttling.
    #[serde(default = "d_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: d_attempts(),
            base_delay_ms: d_base_delay_ms(),
            backoff: d_backoff(),
            cooldown_ms: d_cooldown_ms(),
        }
    }
}

fn d_backends() -> Vec<BackendConfig> {
    let together = |id: &str, model: &str| BackendConfig {
        id: id.into(),
        base_url: "https://api.together.xyz/v1".into(),
        model: model.into(),
        api_key_env: Some("TOGETHER_API_KEY".into()),
        temperature: Some(0.3),
        max_tokens: Some(1024),
    };
    vec![
        together("primary", "ServiceNow-AI/Apriel-1.6-15b-Thinker"),
        together("secondary", "ServiceNow-AI/Apriel-1.5-15b-Thinker"),
    ]
}

fn d_default_limit_rps() -> f64 {
    0.5
}

fn d_failover_penalty_ms() -> u64 {
    3_000
}

fn d_request_timeout_ms() -> u64 {
    120_000
}

fn d_attempts() -> u32 {
    4
}

fn d_base_delay_ms() -> u64 {
    2_000
}

fn d_backoff() -> f64 {
    2.0
}

fn d_cooldown_ms() -> u64 {
    60_000
}
