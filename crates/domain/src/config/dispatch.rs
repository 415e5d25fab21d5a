use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatch queue & worker pool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Number of workers draining the priority queue.
    #[serde(default = "d_workers")]
    pub workers: usize,
    /// Max jobs with an in-flight generation call at once.
    #[serde(default = "d_admission_limit")]
    pub admission_limit: usize,
    /// Interval of the "processing" presence signal.
    #[serde(default = "d_presence_interval_ms")]
    pub presence_interval_ms: u64,
    /// Wait after a failed presence signal before trying again.
    #[serde(default = "d_presence_retry_ms")]
    pub presence_retry_ms: u64,
    /// Priority for mode names without a static mapping.
    #[serde(default = "d_default_priority")]
    pub default_priority: u8,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: d_workers(),
            admission_limit: d_admission_limit(),
            presence_interval_ms: d_presence_interval_ms(),
            presence_retry_ms: d_presence_retry_ms(),
            default_priority: d_default_priority(),
        }
    }
}

fn d_workers() -> usize {
    3
}

fn d_admission_limit() -> usize {
    5
}

fn d_presence_interval_ms() -> u64 {
    8_000
}

fn d_presence_retry_ms() -> u64 {
    15_000
}

fn d_default_priority() -> u8 {
    crate::mode::DEFAULT_PRIORITY
}
