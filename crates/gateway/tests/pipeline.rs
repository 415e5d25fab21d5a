//! Integration tests for the relay, dispatch queue and worker pool working
//! together.
//!
//! Transports, backends and handlers are in-memory fakes; time is paused so
//! the quiet interval, presence refreshes and handler delays are exact.

use std::sync::Arc;
use std::time::Duration;

use cr_domain::config::{Config, DeliveryConfig, GovernorConfig, RetryConfig};
use cr_domain::envelope::Envelope;
use cr_domain::job::Job;
use cr_domain::mode::Mode;
use cr_domain::ratelimit::RateLimit;
use cr_gateway::bootstrap;
use cr_gateway::delivery::Deliverer;
use cr_gateway::handlers::{HandlerError, HandlerRegistry, JobContext, ModeHandler, Reply};
use cr_gateway::i18n::Translator;
use cr_gateway::runtime::{spawn_workers, DispatchQueue, WorkerShared};
use cr_gateway::sessions::SessionRegistry;
use cr_gateway::state::AppState;
use cr_gateway::transport::{
    MemoryTransport, OutboundDocument, OutboundMessage, Transport, TransportError,
};
use cr_gateway::voice::Transcriber;
use cr_providers::{Completion, CompletionBackend, CompletionRequest, Governor, RetryPolicy};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fakes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Answers with the query, optionally after a delay.
struct Echo {
    delay: Duration,
}

#[async_trait::async_trait]
impl ModeHandler for Echo {
    async fn handle(&self, _ctx: &JobContext, job: &Job) -> Result<Reply, HandlerError> {
        tokio::time::sleep(self.delay).await;
        Ok(Reply::text(format!("echo {}", job.query)))
    }
}

struct Failing;

#[async_trait::async_trait]
impl ModeHandler for Failing {
    async fn handle(&self, _ctx: &JobContext, _job: &Job) -> Result<Reply, HandlerError> {
        Err(HandlerError::Timeout)
    }
}

struct Panicking;

#[async_trait::async_trait]
impl ModeHandler for Panicking {
    async fn handle(&self, _ctx: &JobContext, _job: &Job) -> Result<Reply, HandlerError> {
        panic!("handler blew up");
    }
}

/// Backend that thinks out loud before answering.
struct Thinking;

#[async_trait::async_trait]
impl CompletionBackend for Thinking {
    fn id(&self) -> &str {
        "thinking"
    }

    fn model(&self) -> &str {
        "thinking-model"
    }

    async fn complete(&self, _req: &CompletionRequest) -> cr_domain::Result<Completion> {
        Ok(Completion {
            content: "<think>let me see</think>Forty two".into(),
            usage: None,
            rate_limit: RateLimit::default(),
            backend: "thinking".into(),
            model: "thinking-model".into(),
        })
    }
}

struct FixedTranscript(&'static str);

#[async_trait::async_trait]
impl Transcriber for FixedTranscript {
    async fn transcribe(&self, _audio: &[u8], _locale: &str) -> cr_domain::Result<String> {
        Ok(self.0.into())
    }
}

/// Connector that is down: every message fails.
struct Offline;

#[async_trait::async_trait]
impl Transport for Offline {
    async fn send_message(&self, _msg: &OutboundMessage) -> Result<(), TransportError> {
        Err(TransportError::Network("connection refused".into()))
    }

    async fn send_document(&self, _doc: &OutboundDocument) -> Result<(), TransportError> {
        Err(TransportError::Network("connection refused".into()))
    }

    async fn send_presence(&self, _chat_id: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harnesses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Pool {
    shared: Arc<WorkerShared>,
    transport: Arc<MemoryTransport>,
}

fn pool(
    handlers: HandlerRegistry,
    backends: Vec<Arc<dyn CompletionBackend>>,
    admission: usize,
) -> Pool {
    let transport = Arc::new(MemoryTransport::new());
    let shared = Arc::new(WorkerShared {
        queue: Arc::new(DispatchQueue::new()),
        sessions: Arc::new(SessionRegistry::new()),
        handlers: Arc::new(handlers),
        governor: Arc::new(Governor::new(backends, &GovernorConfig::default())),
        retry: RetryPolicy::new(&RetryConfig::default()),
        admission: Arc::new(Semaphore::new(admission)),
        translator: Arc::new(Translator::builtin()),
        deliverer: Arc::new(Deliverer::new(transport.clone(), DeliveryConfig::default())),
        presence_interval: Duration::from_secs(8),
        presence_retry: Duration::from_secs(15),
    });
    Pool { shared, transport }
}

fn job(session: &str, query: &str, mode: Mode) -> Job {
    Job::new(
        Envelope::new(session, format!("chat-{session}")),
        query.into(),
        1,
        mode,
        "en",
    )
}

fn en(key: &str) -> String {
    Translator::builtin().get(key, "en")
}

/// Poll until `cond` holds; paused time makes each sleep instantaneous.
async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

async fn shut_down(queue: &DispatchQueue, workers: Vec<JoinHandle<()>>) {
    queue.close();
    for w in workers {
        w.await.unwrap();
    }
}

fn relay_state(
    transport: Arc<MemoryTransport>,
    handlers: HandlerRegistry,
    transcriber: Option<Arc<dyn Transcriber>>,
) -> AppState {
    bootstrap::build_app_state(Arc::new(Config::default()), transport, handlers, transcriber)
        .unwrap()
}

fn echo_registry() -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();
    handlers.register(
        Mode::FastReply,
        Arc::new(Echo {
            delay: Duration::ZERO,
        }),
    );
    handlers
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Worker pool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn successful_reply_carries_the_mode_menu() {
    let p = pool(echo_registry(), vec![], 5);
    p.shared.queue.submit(1, job("s", "hello", Mode::FastReply));
    let workers = spawn_workers(p.shared.clone(), 1);

    wait_until(|| !p.transport.messages().is_empty()).await;
    shut_down(&p.shared.queue, workers).await;

    let messages = p.transport.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "echo hello");
    let keyboard = messages[0].keyboard.as_ref().expect("mode menu");
    let actions: Vec<_> = keyboard.buttons().map(|b| b.action.as_str()).collect();
    assert!(actions.contains(&"change_mode"));
}

#[tokio::test(start_paused = true)]
async fn completion_handler_strips_hidden_reasoning() {
    let backend: Arc<dyn CompletionBackend> = Arc::new(Thinking);
    let p = pool(HandlerRegistry::with_builtin(), vec![backend], 5);
    p.shared.queue.submit(1, job("s", "meaning of life?", Mode::FastReply));
    let workers = spawn_workers(p.shared.clone(), 1);

    wait_until(|| !p.transport.messages().is_empty()).await;
    shut_down(&p.shared.queue, workers).await;

    assert_eq!(p.transport.texts(), ["Forty two"]);
    assert_eq!(p.shared.admission.available_permits(), 5);
}

#[tokio::test(start_paused = true)]
async fn handler_failure_sends_error_then_menu() {
    let mut handlers = HandlerRegistry::new();
    handlers.register(Mode::Web, Arc::new(Failing));
    let p = pool(handlers, vec![], 5);
    p.shared.queue.submit(2, job("s", "news", Mode::Web));
    let workers = spawn_workers(p.shared.clone(), 1);

    wait_until(|| p.transport.messages().len() >= 2).await;
    shut_down(&p.shared.queue, workers).await;

    let messages = p.transport.messages();
    assert_eq!(messages[0].text, en("error_timeout"));
    assert!(messages[0].keyboard.is_none());
    assert_eq!(messages[1].text, en("choose_your_mode"));
    assert!(messages[1].keyboard.is_some());
}

#[tokio::test(start_paused = true)]
async fn panicking_handler_does_not_kill_the_worker() {
    let mut handlers = echo_registry();
    handlers.register(Mode::Web, Arc::new(Panicking));
    let p = pool(handlers, vec![], 5);
    p.shared.queue.submit(2, job("s1", "boom", Mode::Web));
    p.shared.queue.submit(2, job("s2", "still alive", Mode::FastReply));
    let workers = spawn_workers(p.shared.clone(), 1);

    wait_until(|| p.transport.messages().len() >= 3).await;
    shut_down(&p.shared.queue, workers).await;

    assert_eq!(
        p.transport.texts(),
        [en("error_generic"), en("choose_your_mode"), "echo still alive".into()]
    );
}

#[tokio::test(start_paused = true)]
async fn unregistered_mode_is_not_an_error() {
    let p = pool(HandlerRegistry::new(), vec![], 5);
    p.shared.queue.submit(4, job("s", "dig", Mode::DeepSearch));
    let workers = spawn_workers(p.shared.clone(), 1);

    wait_until(|| !p.transport.messages().is_empty()).await;
    shut_down(&p.shared.queue, workers).await;

    let messages = p.transport.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, en("mode_not_implemented"));
    assert!(messages[0].keyboard.is_some());
}

#[tokio::test(start_paused = true)]
async fn presence_refreshes_while_working_and_stops_after() {
    let mut handlers = HandlerRegistry::new();
    handlers.register(
        Mode::FastReply,
        Arc::new(Echo {
            delay: Duration::from_secs(20),
        }),
    );
    let p = pool(handlers, vec![], 5);
    p.shared.queue.submit(1, job("s", "slow", Mode::FastReply));
    let workers = spawn_workers(p.shared.clone(), 1);

    wait_until(|| !p.transport.messages().is_empty()).await;
    // Sent at 0 s, 8 s and 16 s.
    assert_eq!(p.transport.presence_count(), 3);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(p.transport.presence_count(), 3);
    shut_down(&p.shared.queue, workers).await;
}

#[tokio::test(start_paused = true)]
async fn saturated_admission_sends_waiting_notice_first() {
    let p = pool(echo_registry(), vec![], 1);
    let held = p.shared.admission.clone().acquire_owned().await.unwrap();
    p.shared.queue.submit(1, job("s", "hello", Mode::FastReply));
    let workers = spawn_workers(p.shared.clone(), 1);

    wait_until(|| p.transport.messages().len() >= 2).await;
    drop(held);
    shut_down(&p.shared.queue, workers).await;

    assert_eq!(
        p.transport.texts(),
        [en("waiting_in_queue"), "echo hello".into()]
    );
}

#[tokio::test(start_paused = true)]
async fn queued_jobs_run_by_priority_then_arrival() {
    let mut handlers = echo_registry();
    handlers.register(
        Mode::DeepResearch,
        Arc::new(Echo {
            delay: Duration::ZERO,
        }),
    );
    let p = pool(handlers, vec![], 5);
    p.shared.queue.submit(5, job("a", "research", Mode::DeepResearch));
    p.shared.queue.submit(1, job("b", "first", Mode::FastReply));
    p.shared.queue.submit(1, job("c", "second", Mode::FastReply));
    let workers = spawn_workers(p.shared.clone(), 1);

    wait_until(|| p.transport.messages().len() >= 3).await;
    shut_down(&p.shared.queue, workers).await;

    assert_eq!(
        p.transport.texts(),
        ["echo first", "echo second", "echo research"]
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Relay
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test(start_paused = true)]
async fn burst_of_fragments_becomes_one_job() {
    let transport = Arc::new(MemoryTransport::new());
    let state = relay_state(transport.clone(), echo_registry(), None);
    let envelope = Envelope::new("s", "chat-s");

    for i in 0..100 {
        state
            .relay
            .on_text(envelope.clone(), &format!("part{i}"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(state.queue.len(), 1);
    let queued = state.queue.next().await.unwrap();
    assert_eq!(queued.job.fragments, 100);
    assert!(queued.job.query.starts_with("part0 part1 "));
    // Only the first contact greeted the user.
    assert_eq!(transport.texts(), [en("welcome_new_user")]);
}

#[tokio::test(start_paused = true)]
async fn over_length_burst_is_rejected_with_notice() {
    let transport = Arc::new(MemoryTransport::new());
    let state = relay_state(transport.clone(), echo_registry(), None);
    let envelope = Envelope::new("s", "chat-s");
    let chunk = "x".repeat(5_000);

    for _ in 0..3 {
        state.relay.on_text(envelope.clone(), &chunk).await.unwrap();
    }
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(state.queue.is_empty());
    assert_eq!(
        transport.texts(),
        [en("welcome_new_user"), en("error_message_too_long")]
    );
}

#[tokio::test(start_paused = true)]
async fn slash_commands_never_become_jobs() {
    let transport = Arc::new(MemoryTransport::new());
    let state = relay_state(transport.clone(), echo_registry(), None);
    let envelope = Envelope::new("s", "chat-s");

    state.relay.on_text(envelope.clone(), "/mode web").await.unwrap();
    state.relay.on_text(envelope.clone(), "/frobnicate").await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(state.queue.is_empty());
    assert_eq!(state.sessions.mode("s"), Mode::Web);
    assert_eq!(transport.texts(), [en("choose_your_mode")]);
}

#[tokio::test(start_paused = true)]
async fn first_message_is_buffered_even_if_welcome_fails() {
    let state = bootstrap::build_app_state(
        Arc::new(Config::default()),
        Arc::new(Offline),
        echo_registry(),
        None,
    )
    .unwrap();

    state
        .relay
        .on_text(Envelope::new("s", "chat-s"), "hello")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(state.queue.len(), 1);
    let queued = state.queue.next().await.unwrap();
    assert_eq!(queued.job.query, "hello");
}

#[tokio::test(start_paused = true)]
async fn voice_without_transcriber_gets_a_notice() {
    let transport = Arc::new(MemoryTransport::new());
    let state = relay_state(transport.clone(), echo_registry(), None);

    state
        .relay
        .on_voice(Envelope::new("s", "chat-s"), &[1, 2, 3])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(state.queue.is_empty());
    assert_eq!(transport.texts(), [en("voice_unsupported")]);
}

#[tokio::test(start_paused = true)]
async fn voice_transcript_is_echoed_then_buffered() {
    let transport = Arc::new(MemoryTransport::new());
    let state = relay_state(
        transport.clone(),
        echo_registry(),
        Some(Arc::new(FixedTranscript("what time is it"))),
    );
    let envelope = Envelope::new("s", "chat-s");

    state.relay.on_voice(envelope.clone(), &[0u8; 16]).await.unwrap();
    state.relay.on_text(envelope, "in Tokyo").await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(
        transport.texts(),
        [en("welcome_new_user"), "🎙 what time is it".to_owned()]
    );
    let queued = state.queue.next().await.unwrap();
    assert_eq!(queued.job.query, "what time is it in Tokyo");
}

#[tokio::test(start_paused = true)]
async fn text_is_answered_end_to_end() {
    let transport = Arc::new(MemoryTransport::new());
    let state = relay_state(transport.clone(), echo_registry(), None);
    let workers = bootstrap::spawn_background_tasks(&state);
    let mut envelope = Envelope::new("s", "chat-s");
    envelope.language_hint = Some("ru-RU".into());

    state.relay.on_text(envelope, "hello").await.unwrap();
    wait_until(|| transport.messages().len() >= 2).await;
    shut_down(&state.queue, workers).await;

    let ru_welcome = Translator::builtin().get("welcome_new_user", "ru");
    assert_eq!(transport.texts(), [ru_welcome, "echo hello".into()]);
    assert_eq!(state.sessions.locale("s").as_deref(), Some("ru"));
}
