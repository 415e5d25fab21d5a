//! Retry decorator for whole logical operations.
//!
//! The governor handles single calls (pacing plus one failover). An
//! operation such as "answer this query" may issue several calls; wrapping
//! it in a [`RetryPolicy`] retries the whole operation on transient errors:
//!
//! - throttling starts a cool-down shared by every caller of the policy,
//! - other transient errors back off exponentially,
//! - the second-to-last attempt waits a full cool-down,
//! - the last attempt's error propagates unchanged.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cr_domain::config::RetryConfig;
use cr_domain::Result;
use tokio::time::Instant;

#[derive(Clone)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
    backoff: f64,
    cooldown: Duration,
    /// End of the shared throttling cool-down; clones share it.
    cooldown_until: Arc<parking_lot::Mutex<Option<Instant>>>,
}

impl RetryPolicy {
    pub fn new(cfg: &RetryConfig) -> Self {
        Self {
            attempts: cfg.attempts.max(1),
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            backoff: if cfg.backoff.is_finite() && cfg.backoff >= 1.0 {
                cfg.backoff
            } else {
                1.0
            },
            cooldown: Duration::from_millis(cfg.cooldown_ms),
            cooldown_until: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    /// Remaining shared cool-down, zero when none is active.
    pub fn cooldown_remaining(&self) -> Duration {
        self.cooldown_until
            .lock()
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or_default()
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.base_delay;
        let mut attempt: u32 = 0;

        loop {
            self.wait_for_cooldown().await;

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let is_last = attempt + 1 >= self.attempts;
            if !err.is_transient() || is_last {
                if err.is_transient() {
                    tracing::warn!(
                        operation,
                        attempts = attempt + 1,
                        error = %err,
                        "retries exhausted"
                    );
                }
                return Err(err);
            }

            let wait = if err.is_throttle() {
                self.start_cooldown();
                self.cooldown
            } else if attempt + 2 == self.attempts {
                self.cooldown
            } else {
                delay
            };

            tracing::warn!(
                operation,
                attempt = attempt + 1,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );

            // Throttling waits on the shared cool-down at the top of the loop.
            if !err.is_throttle() {
                tokio::time::sleep(wait).await;
            }

            if attempt + 2 < self.attempts {
                delay = delay.mul_f64(self.backoff);
            }
            attempt += 1;
        }
    }

    fn start_cooldown(&self) {
        let until = Instant::now() + self.cooldown;
        let mut shared = self.cooldown_until.lock();
        *shared = Some(shared.map_or(until, |current| current.max(until)));
    }

    async fn wait_for_cooldown(&self) {
        loop {
            let remaining = self.cooldown_remaining();
            if remaining.is_zero() {
                return;
            }
            tracing::debug!(
                wait_ms = remaining.as_millis() as u64,
                "waiting for shared throttling cool-down"
            );
            tokio::time::sleep(remaining).await;
        }
    }
}
