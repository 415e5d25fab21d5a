//! Integration tests for the governor and retry decorator working together.
//!
//! Backends are in-memory fakes; time is paused so pacing and cool-down
//! waits are exact and instantaneous.

use std::sync::Arc;
use std::time::Duration;

use cr_domain::config::{GovernorConfig, RetryConfig};
use cr_domain::ratelimit::RateLimit;
use cr_domain::{Error, Result};
use cr_providers::{
    Completion, CompletionBackend, CompletionRequest, Governor, Message, RetryPolicy,
};
use parking_lot::Mutex;
use tokio::time::Instant;

/// Throttles every call with the given reset hint.
struct Throttling {
    id: &'static str,
    reset_secs: f64,
    calls: Mutex<u32>,
}

/// Always answers; records call times.
struct Healthy {
    id: &'static str,
    calls: Mutex<Vec<Instant>>,
}

#[async_trait::async_trait]
impl CompletionBackend for Throttling {
    fn id(&self) -> &str {
        self.id
    }

    fn model(&self) -> &str {
        "throttling"
    }

    async fn complete(&self, _req: &CompletionRequest) -> Result<Completion> {
        *self.calls.lock() += 1;
        Err(Error::RateLimited {
            backend: self.id.into(),
            limits: RateLimit {
                limit_rps: Some(1.0),
                remaining: Some(0.0),
                reset_secs: Some(self.reset_secs),
                retry_after_secs: None,
            },
        })
    }
}

#[async_trait::async_trait]
impl CompletionBackend for Healthy {
    fn id(&self) -> &str {
        self.id
    }

    fn model(&self) -> &str {
        "healthy"
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<Completion> {
        self.calls.lock().push(Instant::now());
        Ok(Completion {
            content: format!("{} answered {}", self.id, req.messages.len()),
            usage: None,
            rate_limit: RateLimit {
                limit_rps: Some(10.0),
                remaining: Some(99.0),
                ..Default::default()
            },
            backend: self.id.into(),
            model: "healthy".into(),
        })
    }
}

fn request() -> CompletionRequest {
    CompletionRequest {
        messages: vec![Message::system("be brief"), Message::user("hello")],
        ..Default::default()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Throttling with failover
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn throttled_backend_fails_over_and_stays_parked_for_reset() {
    let a = Arc::new(Throttling {
        id: "a",
        reset_secs: 30.0,
        calls: Mutex::new(0),
    });
    let b = Arc::new(Healthy {
        id: "b",
        calls: Mutex::new(Vec::new()),
    });
    let gov = Governor::new(
        vec![
            a.clone() as Arc<dyn CompletionBackend>,
            b.clone() as Arc<dyn CompletionBackend>,
        ],
        &GovernorConfig::default(),
    );

    let started = Instant::now();
    let out = gov.call(Some("a"), &request()).await.unwrap();

    // The caller only sees B's answer, retried immediately.
    assert_eq!(out.backend, "b");
    assert_eq!(out.content, "b answered 2");
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(*a.calls.lock(), 1);

    // A is parked for the full reset (ceil(30) + 0.5s), not the 3s penalty.
    let parked = gov.ready_in("a").unwrap();
    assert!(parked >= Duration::from_secs(30), "{parked:?}");
    assert_eq!(parked, Duration::from_millis(30_500));
    let state = gov.state("a").unwrap();
    assert!(state.last_limits.unwrap().is_exhausted());

    // A caller insisting on A waits out the window.
    let a_started = Instant::now();
    let _ = gov.call(Some("a"), &request()).await;
    assert!(a_started.elapsed() >= Duration::from_secs(30));
    assert_eq!(*a.calls.lock(), 2);
}

#[tokio::test(start_paused = true)]
async fn short_reset_still_gets_the_failover_penalty() {
    let a = Arc::new(Throttling {
        id: "a",
        reset_secs: 0.0,
        calls: Mutex::new(0),
    });
    let b = Arc::new(Healthy {
        id: "b",
        calls: Mutex::new(Vec::new()),
    });
    let gov = Governor::new(
        vec![
            a.clone() as Arc<dyn CompletionBackend>,
            b.clone() as Arc<dyn CompletionBackend>,
        ],
        &GovernorConfig::default(),
    );

    gov.call(None, &request()).await.unwrap();
    // ceil(0) + 0.5s from the headers loses to the 3s penalty.
    assert_eq!(gov.ready_in("a"), Some(Duration::from_secs(3)));
}

#[tokio::test(start_paused = true)]
async fn unpreferred_calls_route_around_parked_backend() {
    let a = Arc::new(Throttling {
        id: "a",
        reset_secs: 30.0,
        calls: Mutex::new(0),
    });
    let b = Arc::new(Healthy {
        id: "b",
        calls: Mutex::new(Vec::new()),
    });
    let gov = Governor::new(
        vec![
            a.clone() as Arc<dyn CompletionBackend>,
            b.clone() as Arc<dyn CompletionBackend>,
        ],
        &GovernorConfig::default(),
    );

    for _ in 0..5 {
        let out = gov.call(None, &request()).await.unwrap();
        assert_eq!(out.backend, "b");
    }
    assert_eq!(*a.calls.lock(), 1);

    // B is paced at its advertised 10 rps.
    let calls = b.calls.lock().clone();
    assert_eq!(calls.len(), 5);
    for pair in calls.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(100));
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retry decorator around governed calls
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn retry_policy_cools_down_when_every_backend_throttles() {
    let a = Arc::new(Throttling {
        id: "a",
        reset_secs: 5.0,
        calls: Mutex::new(0),
    });
    let b = Arc::new(Throttling {
        id: "b",
        reset_secs: 5.0,
        calls: Mutex::new(0),
    });
    let gov = Governor::new(
        vec![
            a.clone() as Arc<dyn CompletionBackend>,
            b.clone() as Arc<dyn CompletionBackend>,
        ],
        &GovernorConfig::default(),
    );
    let policy = RetryPolicy::new(&RetryConfig {
        attempts: 2,
        ..RetryConfig::default()
    });

    let req = request();
    let started = Instant::now();
    let err = policy
        .run("answer", || gov.call(None, &req))
        .await
        .unwrap_err();

    assert!(err.is_throttle());
    // One failover per attempt, one 60s shared cool-down in between.
    assert_eq!(*a.calls.lock() + *b.calls.lock(), 4);
    assert!(started.elapsed() >= Duration::from_secs(60));
}
