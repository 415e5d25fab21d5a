use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocaleConfig {
    #[serde(default = "d_default_locale")]
    pub default: String,
    /// JSON string table replacing the built-in one.
    #[serde(default)]
    pub translations_path: Option<PathBuf>,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            default: d_default_locale(),
            translations_path: None,
        }
    }
}

fn d_default_locale() -> String {
    "en".into()
}
