use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Rate-limit metadata reported by a generation backend alongside a response.
///
/// All values are optional; backends that do not advertise limits leave
/// them unset and the governor falls back to its configured default rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Advertised steady-state rate in requests per second.
    pub limit_rps: Option<f64>,
    /// Requests left in the current window.
    pub remaining: Option<f64>,
    /// Seconds until the window resets.
    pub reset_secs: Option<f64>,
    /// Explicit retry hint, in seconds.
    pub retry_after_secs: Option<f64>,
}

/// Extra slack added on top of a reset hint once the quota is exhausted.
const RESET_SLACK_SECS: f64 = 0.5;

/// Reset used when neither a reset hint nor a usable rate is known.
const UNKNOWN_RESET_SECS: f64 = 2.0;

impl RateLimit {
    /// Parse from `(name, value)` header pairs. Header names are matched
    /// case-insensitively; unparsable values are ignored.
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut out = RateLimit::default();
        for (name, value) in headers {
            let parsed = value.trim().parse::<f64>().ok().filter(|v| v.is_finite());
            match name.to_ascii_lowercase().as_str() {
                "x-ratelimit-limit" => out.limit_rps = parsed,
                "x-ratelimit-remaining" => out.remaining = parsed,
                "x-ratelimit-reset" => out.reset_secs = parsed,
                "retry-after" => out.retry_after_secs = parsed,
                _ => {}
            }
        }
        out
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.remaining, Some(r) if r <= 0.0)
    }

    /// Delay before the backend may be called again.
    ///
    /// Exhausted quota waits for the larger of the (rounded-up) reset hint
    /// and the retry hint. Otherwise the delay paces calls at the advertised
    /// rate, or at `default_rps` when none is advertised.
    pub fn next_delay(&self, default_rps: f64) -> Duration {
        let rps = self
            .limit_rps
            .filter(|l| *l > 0.0)
            .unwrap_or(default_rps);

        let secs = if self.is_exhausted() {
            let reset = self.reset_secs.unwrap_or(if rps > 0.0 {
                1.0 / rps
            } else {
                UNKNOWN_RESET_SECS
            });
            let by_reset = reset.max(0.0).ceil() + RESET_SLACK_SECS;
            by_reset.max(self.retry_after_secs.unwrap_or(0.0))
        } else if rps > 0.0 {
            1.0 / rps
        } else {
            0.0
        };

        secs_to_duration(secs)
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}
