//! AppState construction and worker spawning extracted from `main.rs`.
//!
//! `serve` and `chat` share this boot path; they differ only in the
//! transport replies go out on.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cr_domain::config::{Config, ConfigSeverity, GovernorConfig, ServerConfig};
use cr_providers::{CompletionBackend, Governor, OpenAiCompatBackend, RetryPolicy};

use crate::commands::SessionControl;
use crate::delivery::Deliverer;
use crate::handlers::HandlerRegistry;
use crate::i18n::Translator;
use crate::runtime::{spawn_workers, Debouncer, DispatchQueue, Relay, WorkerShared};
use crate::sessions::SessionRegistry;
use crate::state::AppState;
use crate::transport::{ConsoleTransport, Transport, WebhookTransport};
use crate::voice::Transcriber;

/// Timeout for a single outbound webhook call.
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(30);

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`]. Workers are not started; see [`spawn_background_tasks`].
pub fn build_app_state(
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    handlers: HandlerRegistry,
    transcriber: Option<Arc<dyn Transcriber>>,
) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Translations ─────────────────────────────────────────────────
    let translator = Arc::new(Translator::load(&config.locale).context("loading translations")?);
    tracing::info!(
        languages = ?translator.languages(),
        default = translator.default_locale(),
        "translations ready"
    );

    // ── Generation backends ──────────────────────────────────────────
    let governor = Arc::new(build_governor(&config.governor));
    if governor.backend_ids().is_empty() {
        tracing::warn!("no generation backends initialized; every job will fail");
    } else {
        tracing::info!(backends = ?governor.backend_ids(), "governor ready");
    }
    let retry = RetryPolicy::new(&config.governor.retry);

    // ── Delivery ─────────────────────────────────────────────────────
    let deliverer = Arc::new(Deliverer::new(transport, config.delivery.clone()));
    if let Some(dir) = &config.delivery.attachments_dir {
        tracing::info!(path = %dir.display(), "attachments are persisted");
    }

    // ── Sessions, queue, admission ───────────────────────────────────
    let sessions = Arc::new(SessionRegistry::new());
    let queue = Arc::new(DispatchQueue::new());
    let admission = Arc::new(Semaphore::new(config.dispatch.admission_limit));
    tracing::info!(
        workers = config.dispatch.workers,
        admission_limit = config.dispatch.admission_limit,
        "dispatch ready"
    );

    // ── Inbound relay ────────────────────────────────────────────────
    let debouncer = Arc::new(Debouncer::new(
        &config.debounce,
        config.dispatch.default_priority,
        sessions.clone(),
        queue.clone(),
        deliverer.clone(),
        translator.clone(),
    ));
    let control = Arc::new(SessionControl::new(
        sessions.clone(),
        translator.clone(),
        deliverer.clone(),
    ));
    if transcriber.is_none() {
        tracing::info!("no transcriber configured; voice input is answered with a notice");
    }
    let relay = Arc::new(Relay::new(
        debouncer,
        control,
        deliverer.clone(),
        translator.clone(),
        transcriber,
    ));
    tracing::info!(
        quiet_ms = config.debounce.quiet_ms,
        handled_modes = ?handlers.modes(),
        "relay ready"
    );

    let workers = Arc::new(WorkerShared {
        queue: queue.clone(),
        sessions: sessions.clone(),
        handlers: Arc::new(handlers),
        governor: governor.clone(),
        retry,
        admission: admission.clone(),
        translator: translator.clone(),
        deliverer,
        presence_interval: Duration::from_millis(config.dispatch.presence_interval_ms),
        presence_retry: Duration::from_millis(config.dispatch.presence_retry_ms),
    });

    // ── API token (read once, hash for constant-time comparison) ────
    let api_token_hash = {
        let env_var = &config.server.api_token_env;
        match std::env::var(env_var).ok().filter(|t| !t.is_empty()) {
            Some(t) => {
                tracing::info!(source = %format!("env:{env_var}"), "API bearer-token auth enabled");
                Some(Sha256::digest(t.as_bytes()).to_vec())
            }
            None => {
                tracing::warn!("API bearer-token auth DISABLED; set the {env_var} env var");
                None
            }
        }
    };

    Ok(AppState {
        config,
        translator,
        governor,
        relay,
        sessions,
        queue,
        admission,
        workers,
        api_token_hash,
        shutdown: CancellationToken::new(),
    })
}

/// One OpenAI-compatible backend per configured entry, in config order.
/// Entries that fail to initialize are skipped.
pub fn build_governor(cfg: &GovernorConfig) -> Governor {
    let timeout = Duration::from_millis(cfg.request_timeout_ms);
    let backends: Vec<Arc<dyn CompletionBackend>> = cfg
        .backends
        .iter()
        .filter_map(|b| match OpenAiCompatBackend::from_config(b, timeout) {
            Ok(backend) => Some(Arc::new(backend) as Arc<dyn CompletionBackend>),
            Err(e) => {
                tracing::warn!(backend = %b.id, error = %e, "skipping backend");
                None
            }
        })
        .collect();
    Governor::new(backends, cfg)
}

/// The webhook transport when an outbound URL is configured, stdout
/// otherwise.
pub fn build_transport(cfg: &ServerConfig) -> anyhow::Result<Arc<dyn Transport>> {
    match &cfg.outbound_url {
        Some(url) => {
            let transport = WebhookTransport::new(url.clone(), OUTBOUND_TIMEOUT)
                .context("building outbound webhook client")?;
            tracing::info!(url = %url, "outbound webhook transport ready");
            Ok(Arc::new(transport))
        }
        None => {
            tracing::warn!("no outbound_url configured; replies are printed to stdout");
            Ok(Arc::new(ConsoleTransport::new()))
        }
    }
}

/// Start the worker pool. Workers exit after `state.queue` is closed.
pub fn spawn_background_tasks(state: &AppState) -> Vec<JoinHandle<()>> {
    let count = state.config.dispatch.workers;
    let handles = spawn_workers(state.workers.clone(), count);
    tracing::info!(workers = count, "worker pool started");
    handles
}
