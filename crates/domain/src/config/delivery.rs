use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Formatting & delivery
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Transport's single-message ceiling, in characters.
    #[serde(default = "d_max_message_chars")]
    pub max_message_chars: usize,
    /// Fenced code blocks at least this long are sent as files.
    #[serde(default = "d_code_attachment_threshold")]
    pub code_attachment_threshold: usize,
    #[serde(default = "d_true")]
    pub disable_link_preview: bool,
    /// When set, extracted attachments are also written here (write-once,
    /// content-addressed).
    #[serde(default)]
    pub attachments_dir: Option<PathBuf>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_message_chars: d_max_message_chars(),
            code_attachment_threshold: d_code_attachment_threshold(),
            disable_link_preview: true,
            attachments_dir: None,
        }
    }
}

fn d_max_message_chars() -> usize {
    4096
}

fn d_code_attachment_threshold() -> usize {
    2000
}

fn d_true() -> bool {
    true
}
