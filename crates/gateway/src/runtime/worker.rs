//! Worker pool draining the dispatch queue.
//!
//! Each worker takes the most urgent job, keeps a presence signal running
//! while the mode handler works, and delivers the reply or a localized
//! failure. Handler errors and panics end the job, never the worker.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use cr_domain::job::Job;
use cr_domain::trace::TraceEvent;
use cr_providers::{Governor, RetryPolicy};
use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use crate::commands::mode_menu;
use crate::delivery::{Deliverer, RenderOptions};
use crate::handlers::{HandlerError, HandlerRegistry, JobContext, Reply};
use crate::i18n::Translator;
use crate::runtime::dispatch::{DispatchQueue, Queued};
use crate::runtime::presence::PresenceGuard;
use crate::sessions::SessionRegistry;
use crate::transport::Keyboard;

/// Everything a worker needs to run jobs.
pub struct WorkerShared {
    pub queue: Arc<DispatchQueue>,
    pub sessions: Arc<SessionRegistry>,
    pub handlers: Arc<HandlerRegistry>,
    pub governor: Arc<Governor>,
    pub retry: RetryPolicy,
    pub admission: Arc<Semaphore>,
    pub translator: Arc<Translator>,
    pub deliverer: Arc<Deliverer>,
    pub presence_interval: Duration,
    pub presence_retry: Duration,
}

/// Spawn `count` workers. They exit once the queue is closed.
pub fn spawn_workers(shared: Arc<WorkerShared>, count: usize) -> Vec<JoinHandle<()>> {
    (1..=count)
        .map(|n| {
            let shared = shared.clone();
            tokio::spawn(
                async move { shared.run(n).await }
                    .instrument(tracing::info_span!("worker", worker = n)),
            )
        })
        .collect()
}

/// How a job ended, as reported in `JobFinished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    NotImplemented,
    HandlerFailed,
    Panicked,
    DeliveryFailed,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Delivered => "delivered",
            Outcome::NotImplemented => "not_implemented",
            Outcome::HandlerFailed => "handler_failed",
            Outcome::Panicked => "panicked",
            Outcome::DeliveryFailed => "delivery_failed",
        }
    }
}

impl WorkerShared {
    async fn run(self: Arc<Self>, worker: usize) {
        tracing::info!("worker started");
        while let Some(queued) = self.queue.next().await {
            let job_id = queued.job.id;
            let processed = AssertUnwindSafe(self.process(worker, queued))
                .catch_unwind()
                .await;
            if let Err(panic) = processed {
                tracing::error!(
                    job_id = %job_id,
                    panic = %panic_message(&*panic),
                    "job processing panicked outside the handler"
                );
            }
        }
        tracing::info!("worker stopped");
    }

    async fn process(&self, worker: usize, queued: Queued) {
        let Queued {
            priority,
            job,
            enqueued_at,
            ..
        } = queued;
        let span = tracing::info_span!(
            "job",
            job_id = %job.id,
            session_id = %job.session_id,
            mode = %job.mode,
        );

        async move {
            TraceEvent::JobDispatched {
                session_id: job.session_id.clone(),
                job_id: job.id.to_string(),
                mode: job.mode.to_string(),
                priority,
                worker,
                queued_ms: enqueued_at.elapsed().as_millis() as u64,
            }
            .emit();

            let started = Instant::now();
            if self.admission.available_permits() == 0 {
                self.advise(&job, "waiting_in_queue", None).await;
            }

            let presence = PresenceGuard::start(
                self.deliverer.transport().clone(),
                job.envelope.chat_id.clone(),
                self.presence_interval,
                self.presence_retry,
            );
            let outcome = self.serve(&job).await;
            presence.stop().await;

            TraceEvent::JobFinished {
                session_id: job.session_id.clone(),
                job_id: job.id.to_string(),
                outcome: outcome.as_str().into(),
                duration_ms: started.elapsed().as_millis() as u64,
            }
            .emit();
        }
        .instrument(span)
        .await
    }

    async fn serve(&self, job: &Job) -> Outcome {
        let Some(handler) = self.handlers.get(job.mode) else {
            tracing::info!("no handler registered for mode");
            self.advise(job, "mode_not_implemented", Some(self.menu(job)))
                .await;
            return Outcome::NotImplemented;
        };

        let ctx = JobContext {
            governor: self.governor.clone(),
            retry: self.retry.clone(),
            admission: self.admission.clone(),
            translator: self.translator.clone(),
            locale: job.locale.clone(),
        };

        let result = AssertUnwindSafe(handler.handle(&ctx, job))
            .catch_unwind()
            .await;
        match result {
            Ok(Ok(reply)) => self.deliver(job, reply).await,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "mode handler failed");
                self.fail(job, &e).await;
                Outcome::HandlerFailed
            }
            Err(panic) => {
                tracing::error!(panic = %panic_message(&*panic), "mode handler panicked");
                self.fail(job, &HandlerError::Other("handler panicked".into()))
                    .await;
                Outcome::Panicked
            }
        }
    }

    async fn deliver(&self, job: &Job, reply: Reply) -> Outcome {
        let opts = RenderOptions {
            disable_link_preview: reply
                .disable_link_preview
                .unwrap_or(self.deliverer.config().disable_link_preview),
            keyboard: Some(self.menu(job)),
        };

        match self.deliverer.deliver(&job.envelope, &reply.text, &opts).await {
            Ok(report) => {
                tracing::debug!(
                    frames = report.frames,
                    attachments = report.attachments,
                    degraded = report.degraded.len(),
                    "answer delivered"
                );
                if report.frames == 0 {
                    self.advise(job, "choose_your_mode", opts.keyboard).await;
                }
                Outcome::Delivered
            }
            Err(e) => {
                tracing::error!(error = %e, "answer delivery failed");
                self.advise(job, "error_generic", Some(self.menu(job))).await;
                Outcome::DeliveryFailed
            }
        }
    }

    /// Localized failure message followed by the mode menu.
    async fn fail(&self, job: &Job, err: &HandlerError) {
        self.advise(job, err.message_key(), None).await;
        self.advise(job, "choose_your_mode", Some(self.menu(job)))
            .await;
    }

    fn menu(&self, job: &Job) -> Keyboard {
        mode_menu(
            &self.translator,
            &job.locale,
            self.sessions.mode(&job.session_id),
        )
    }

    /// Best-effort plain message; failures are logged.
    async fn advise(&self, job: &Job, key: &str, keyboard: Option<Keyboard>) {
        let text = self.translator.get(key, &job.locale);
        if let Err(e) = self.deliverer.notify(&job.envelope, &text, keyboard).await {
            tracing::warn!(key, error = %e, "failed to send advisory message");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}
