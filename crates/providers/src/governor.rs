//! Outbound call governor.
//!
//! Paces calls against a small fixed set of interchangeable generation
//! backends and fails over once to the alternate backend when the chosen
//! one throttles, is unavailable, or cannot be reached.
//!
//! Each backend identity owns its own state lock, so pacing of one backend
//! never blocks or skews the other. Quota is global to the backend, so the
//! state is shared by every caller of the governor.

use std::sync::Arc;
use std::time::Duration;

use cr_domain::config::GovernorConfig;
use cr_domain::ratelimit::RateLimit;
use cr_domain::trace::TraceEvent;
use cr_domain::{Error, Result};
use tokio::time::Instant;

use crate::traits::{Completion, CompletionBackend, CompletionRequest};

/// Per-backend pacing record.
#[derive(Debug, Clone, Copy)]
pub struct ProviderState {
    /// The backend must not be called before this instant.
    pub next_eligible: Instant,
    /// Metadata from the most recent response that carried any.
    pub last_limits: Option<RateLimit>,
}

struct BackendSlot {
    backend: Arc<dyn CompletionBackend>,
    state: parking_lot::Mutex<ProviderState>,
    /// Serializes callers waiting for this backend's eligibility window.
    gate: tokio::sync::Mutex<()>,
}

pub struct Governor {
    /// In configuration order; ties in eligibility favor earlier slots.
    slots: Vec<BackendSlot>,
    default_limit_rps: f64,
    failover_penalty: Duration,
    request_timeout: Duration,
}

impl Governor {
    pub fn new(backends: Vec<Arc<dyn CompletionBackend>>, cfg: &GovernorConfig) -> Self {
        let now = Instant::now();
        let slots = backends
            .into_iter()
            .map(|backend| BackendSlot {
                backend,
                state: parking_lot::Mutex::new(ProviderState {
                    next_eligible: now,
                    last_limits: None,
                }),
                gate: tokio::sync::Mutex::new(()),
            })
            .collect();

        Self {
            slots,
            default_limit_rps: cfg.default_limit_rps,
            failover_penalty: Duration::from_millis(cfg.failover_penalty_ms),
            request_timeout: Duration::from_millis(cfg.request_timeout_ms),
        }
    }

    pub fn backend_ids(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.backend.id()).collect()
    }

    /// Snapshot of a backend's pacing state.
    pub fn state(&self, backend_id: &str) -> Option<ProviderState> {
        self.index_of(backend_id).map(|i| *self.slots[i].state.lock())
    }

    /// Time until the backend becomes eligible (zero if it already is).
    pub fn ready_in(&self, backend_id: &str) -> Option<Duration> {
        self.state(backend_id)
            .map(|s| s.next_eligible.saturating_duration_since(Instant::now()))
    }

    /// Issue one logical call.
    ///
    /// With no preference, the backend whose eligibility window opens
    /// soonest is used. A transient failure penalizes that backend and
    /// retries once on the alternate; the alternate's outcome is final.
    pub async fn call(
        &self,
        preferred: Option<&str>,
        req: &CompletionRequest,
    ) -> Result<Completion> {
        if self.slots.is_empty() {
            return Err(Error::Config("no generation backends configured".into()));
        }

        let primary = match preferred {
            Some(id) => self
                .index_of(id)
                .ok_or_else(|| Error::Config(format!("unknown backend '{id}'")))?,
            None => self.choose(),
        };

        let err = match self.attempt(primary, req).await {
            Ok(completion) => return Ok(completion),
            Err(e) => e,
        };

        if !err.is_transient() {
            return Err(err);
        }
        self.penalize(primary);
        let Some(alternate) = self.alternate(primary) else {
            return Err(err);
        };

        let from = self.slots[primary].backend.id();
        let to = self.slots[alternate].backend.id();
        tracing::warn!(
            from_backend = %from,
            to_backend = %to,
            error = %err,
            "backend failed with transient error, failing over"
        );
        TraceEvent::LlmFallback {
            from_backend: from.to_owned(),
            to_backend: to.to_owned(),
            reason: err.to_string(),
        }
        .emit();

        self.attempt(alternate, req).await
    }

    /// Index of the backend whose eligibility window opens soonest.
    fn choose(&self) -> usize {
        self.slots
            .iter()
            .enumerate()
            .min_by_key(|(_, slot)| slot.state.lock().next_eligible)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn alternate(&self, index: usize) -> Option<usize> {
        (self.slots.len() > 1).then(|| (index + 1) % self.slots.len())
    }

    fn index_of(&self, backend_id: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.backend.id() == backend_id)
    }

    async fn attempt(&self, index: usize, req: &CompletionRequest) -> Result<Completion> {
        let slot = &self.slots[index];
        let backend_id = slot.backend.id();

        Self::wait_until_eligible(slot).await;

        let started = Instant::now();
        let call = tokio::time::timeout(self.request_timeout, slot.backend.complete(req));
        let result = match call.await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "backend '{backend_id}' timed out after {}ms",
                self.request_timeout.as_millis()
            ))),
        };

        match &result {
            Ok(completion) => {
                self.observe(slot, completion.rate_limit);
                TraceEvent::LlmRequest {
                    backend: backend_id.to_owned(),
                    model: completion.model.clone(),
                    duration_ms: started.elapsed().as_millis() as u64,
                    prompt_tokens: completion.usage.map(|u| u.prompt_tokens),
                    completion_tokens: completion.usage.map(|u| u.completion_tokens),
                }
                .emit();
            }
            Err(e) => {
                if let Some(limits) = e.rate_limit() {
                    self.observe(slot, *limits);
                }
                tracing::debug!(backend = %backend_id, error = %e, "backend call failed");
            }
        }

        result
    }

    /// Block until the slot's next-eligible time has passed. Re-checks after
    /// every sleep because a concurrent response may have pushed it out.
    async fn wait_until_eligible(slot: &BackendSlot) {
        let _gate = slot.gate.lock().await;
        loop {
            let wait = slot
                .state
                .lock()
                .next_eligible
                .saturating_duration_since(Instant::now());
            if wait.is_zero() {
                return;
            }
            tracing::debug!(
                backend = %slot.backend.id(),
                wait_ms = wait.as_millis() as u64,
                "waiting for backend eligibility"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Fold a response's rate-limit metadata into the backend's state.
    fn observe(&self, slot: &BackendSlot, limits: RateLimit) {
        let delay = limits.next_delay(self.default_limit_rps);
        let mut state = slot.state.lock();
        state.last_limits = Some(limits);
        state.next_eligible = state.next_eligible.max(Instant::now() + delay);
        drop(state);

        TraceEvent::BackendPaced {
            backend: slot.backend.id().to_owned(),
            delay_ms: delay.as_millis() as u64,
            exhausted: limits.is_exhausted(),
        }
        .emit();
    }

    /// Make a failed backend briefly ineligible. A later deadline already
    /// set from exhausted quota is kept.
    fn penalize(&self, index: usize) {
        let mut state = self.slots[index].state.lock();
        state.next_eligible = state
            .next_eligible
            .max(Instant::now() + self.failover_penalty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Usage;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Backend that replays scripted outcomes and counts calls.
    struct Scripted {
        id: String,
        script: Mutex<VecDeque<Result<RateLimit>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl Scripted {
        fn new(id: &str, script: Vec<Result<RateLimit>>) -> Arc<Self> {
            Arc::new(Self {
                id: id.into(),
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait::async_trait]
    impl CompletionBackend for Scripted {
        fn id(&self) -> &str {
            &self.id
        }

        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _req: &CompletionRequest) -> Result<Completion> {
            self.calls.lock().push(Instant::now());
            let next = self
                .script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(RateLimit::default()));
            next.map(|rate_limit| Completion {
                content: format!("answer from {}", self.id),
                usage: Some(Usage::default()),
                rate_limit,
                backend: self.id.clone(),
                model: "scripted".into(),
            })
        }
    }

    fn fast_cfg() -> GovernorConfig {
        GovernorConfig {
            default_limit_rps: 1000.0,
            ..GovernorConfig::default()
        }
    }

    fn governor(backends: Vec<Arc<Scripted>>) -> Governor {
        let backends = backends
            .into_iter()
            .map(|b| b as Arc<dyn CompletionBackend>)
            .collect();
        Governor::new(backends, &fast_cfg())
    }

    fn throttled(id: &str, reset_secs: f64) -> Error {
        Error::RateLimited {
            backend: id.into(),
            limits: RateLimit {
                remaining: Some(0.0),
                reset_secs: Some(reset_secs),
                ..Default::default()
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_paces_by_advertised_rate() {
        let a = Scripted::new(
            "a",
            vec![Ok(RateLimit {
                limit_rps: Some(0.5),
                remaining: Some(10.0),
                ..Default::default()
            })],
        );
        let gov = governor(vec![a.clone()]);

        gov.call(Some("a"), &CompletionRequest::default()).await.unwrap();
        assert_eq!(gov.ready_in("a"), Some(Duration::from_secs(2)));

        let started = Instant::now();
        gov.call(Some("a"), &CompletionRequest::default()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(a.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_error_does_not_fail_over() {
        let a = Scripted::new(
            "a",
            vec![Err(Error::Provider {
                backend: "a".into(),
                message: "HTTP 400 - bad request".into(),
            })],
        );
        let b = Scripted::new("b", vec![]);
        let gov = governor(vec![a.clone(), b.clone()]);

        let err = gov.call(Some("a"), &CompletionRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::Provider { .. }));
        assert_eq!(b.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connection_failure_penalizes_for_three_seconds() {
        let a = Scripted::new("a", vec![Err(Error::Http("connection reset".into()))]);
        let b = Scripted::new("b", vec![]);
        let gov = governor(vec![a.clone(), b.clone()]);

        let out = gov.call(Some("a"), &CompletionRequest::default()).await.unwrap();
        assert_eq!(out.backend, "b");
        let ready = gov.ready_in("a").unwrap();
        assert!(ready > Duration::from_millis(2900) && ready <= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn failover_is_not_recursive() {
        let a = Scripted::new("a", vec![Err(throttled("a", 5.0))]);
        let b = Scripted::new("b", vec![Err(throttled("b", 5.0))]);
        let gov = governor(vec![a.clone(), b.clone()]);

        let err = gov.call(Some("a"), &CompletionRequest::default()).await.unwrap_err();
        assert!(err.is_throttle());
        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn single_backend_surfaces_transient_error_and_is_penalized() {
        let a = Scripted::new("a", vec![Err(Error::Timeout("slow".into()))]);
        let gov = governor(vec![a.clone()]);
        let err = gov.call(None, &CompletionRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));

        let ready = gov.ready_in("a").unwrap();
        assert!(ready > Duration::from_millis(2900) && ready <= Duration::from_secs(3));

        // The next call waits out the penalty.
        let started = Instant::now();
        gov.call(None, &CompletionRequest::default()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(2900));
        assert_eq!(a.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_preference_picks_soonest_eligible() {
        let a = Scripted::new("a", vec![Err(throttled("a", 10.0))]);
        let b = Scripted::new("b", vec![]);
        let gov = governor(vec![a.clone(), b.clone()]);

        // Both idle: configuration order wins the tie.
        assert_eq!(gov.choose(), 0);

        gov.call(Some("a"), &CompletionRequest::default()).await.unwrap();
        assert_eq!(gov.choose(), 1);

        let out = gov.call(None, &CompletionRequest::default()).await.unwrap();
        assert_eq!(out.backend, "b");
        assert_eq!(a.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_preference_is_config_error() {
        let gov = governor(vec![Scripted::new("a", vec![])]);
        let err = gov.call(Some("zzz"), &CompletionRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out_and_fails_over() {
        struct Hanging;

        #[async_trait::async_trait]
        impl CompletionBackend for Hanging {
            fn id(&self) -> &str {
                "hang"
            }
            fn model(&self) -> &str {
                "hang"
            }
            async fn complete(&self, _req: &CompletionRequest) -> Result<Completion> {
                std::future::pending().await
            }
        }

        let b = Scripted::new("b", vec![]);
        let gov = Governor::new(
            vec![
                Arc::new(Hanging) as Arc<dyn CompletionBackend>,
                b.clone() as Arc<dyn CompletionBackend>,
            ],
            &fast_cfg(),
        );
        let out = gov.call(Some("hang"), &CompletionRequest::default()).await.unwrap();
        assert_eq!(out.backend, "b");
    }
}
