use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_3310")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Environment variable holding the bearer token for `/v1/inbound`.
    /// If unset, the server logs a warning and allows unauthenticated access.
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
    /// Connector webhook that receives outbound frames, documents and
    /// presence signals.
    #[serde(default)]
    pub outbound_url: Option<String>,
    /// Upper bound on concurrently handled HTTP requests.
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_3310(),
            host: d_host(),
            api_token_env: d_api_token_env(),
            outbound_url: None,
            max_concurrent_requests: d_max_concurrent(),
        }
    }
}

fn d_3310() -> u16 {
    3310
}

fn d_host() -> String {
    "127.0.0.1".into()
}

fn d_api_token_env() -> String {
    "CR_API_TOKEN".into()
}

fn d_max_concurrent() -> usize {
    256
}
