use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Debounce
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-session input coalescing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Quiet interval after the last fragment before the buffer is flushed.
    #[serde(default = "d_quiet_ms")]
    pub quiet_ms: u64,
    /// Coalesced queries longer than this (in characters) are rejected.
    #[serde(default = "d_max_query_chars")]
    pub max_query_chars: usize,
    /// Joins buffered fragments.
    #[serde(default = "d_separator")]
    pub separator: String,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            quiet_ms: d_quiet_ms(),
            max_query_chars: d_max_query_chars(),
            separator: d_separator(),
        }
    }
}

fn d_quiet_ms() -> u64 {
    800
}

fn d_max_query_chars() -> usize {
    12_000
}

fn d_separator() -> String {
    " ".into()
}
