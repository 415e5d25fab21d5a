use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Priority given to mode names that are not part of [`Mode`].
pub const DEFAULT_PRIORITY: u8 = 3;

/// Processing modes a session can select.
///
/// Each mode maps to a static dispatch priority (lower is more urgent) and
/// to one registered handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    FastReply,
    Web,
    Reasoning,
    DeepSearch,
    DeepResearch,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::FastReply,
        Mode::Web,
        Mode::Reasoning,
        Mode::DeepSearch,
        Mode::DeepResearch,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Mode::FastReply => "fast_reply",
            Mode::Web => "web",
            Mode::Reasoning => "reasoning",
            Mode::DeepSearch => "deep_search",
            Mode::DeepResearch => "deep_research",
        }
    }

    pub fn priority(self) -> u8 {
        match self {
            Mode::FastReply => 1,
            Mode::Web => 2,
            Mode::Reasoning => 3,
            Mode::DeepSearch => 4,
            Mode::DeepResearch => 5,
        }
    }

    /// Localization key of the mode's display name.
    pub fn label_key(self) -> String {
        format!("mode_{}", self.key())
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.key() == s.trim())
            .ok_or_else(|| format!("unknown mode: {s}"))
    }
}

/// Dispatch priority for a mode name, `default` for names outside [`Mode`].
pub fn priority_for(name: &str, default: u8) -> u8 {
    name.parse::<Mode>().map(Mode::priority).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fastest_mode_is_most_urgent() {
        let mut modes = Mode::ALL.to_vec();
        modes.sort_by_key(|m| m.priority());
        assert_eq!(modes.first(), Some(&Mode::FastReply));
        assert_eq!(modes.last(), Some(&Mode::DeepResearch));
    }

    #[test]
    fn unknown_mode_gets_mid_range_default() {
        assert_eq!(priority_for("web", DEFAULT_PRIORITY), 2);
        assert_eq!(priority_for("summarize", DEFAULT_PRIORITY), 3);
    }

    #[test]
    fn keys_roundtrip_through_from_str() {
        for mode in Mode::ALL {
            assert_eq!(mode.key().parse::<Mode>().unwrap(), mode);
        }
        assert!("nope".parse::<Mode>().is_err());
    }

    #[test]
    fn serde_uses_snake_case_keys() {
        let json = serde_json::to_string(&Mode::DeepResearch).unwrap();
        assert_eq!(json, "\"deep_research\"");
    }
}
