//! Per-session debounce scheduler.
//!
//! Every fragment restarts the session's quiet-interval timer; when the
//! timer fires the buffered fragments are joined into one [`Job`] and
//! submitted to the dispatch queue. A timer that was replaced before it
//! fired never flushes: the abort usually stops it while it sleeps, and the
//! generation check catches one that already woke up.

use std::sync::Arc;
use std::time::Duration;

use cr_domain::config::DebounceConfig;
use cr_domain::envelope::Envelope;
use cr_domain::job::Job;
use cr_domain::mode::priority_for;
use cr_domain::trace::TraceEvent;

use crate::delivery::Deliverer;
use crate::i18n::Translator;
use crate::runtime::dispatch::DispatchQueue;
use crate::sessions::SessionRegistry;

/// Outcome of a flush attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flush {
    /// A job was queued.
    Queued { job_id: String, priority: u8 },
    /// The joined query exceeded the length cap; the user was told.
    TooLong { chars: usize },
    /// Nothing was buffered.
    Empty,
    /// The timer had been replaced by a newer one.
    Superseded,
}

pub struct Debouncer {
    sessions: Arc<SessionRegistry>,
    queue: Arc<DispatchQueue>,
    deliverer: Arc<Deliverer>,
    translator: Arc<Translator>,
    quiet: Duration,
    max_query_chars: usize,
    separator: String,
    default_priority: u8,
}

impl Debouncer {
    pub fn new(
        cfg: &DebounceConfig,
        default_priority: u8,
        sessions: Arc<SessionRegistry>,
        queue: Arc<DispatchQueue>,
        deliverer: Arc<Deliverer>,
        translator: Arc<Translator>,
    ) -> Self {
        Self {
            sessions,
            queue,
            deliverer,
            translator,
            quiet: Duration::from_millis(cfg.quiet_ms),
            max_query_chars: cfg.max_query_chars,
            separator: cfg.separator.clone(),
            default_priority,
        }
    }

    /// Buffer `fragment` for the envelope's session, remember the envelope
    /// for the reply and restart the quiet-interval timer.
    pub fn on_input(self: &Arc<Self>, fragment: impl Into<String>, envelope: Envelope) {
        let fragment = fragment.into();
        let session_id = envelope.session_id.clone();

        let buffered = self.sessions.with(&session_id, |session| {
            session.pending.push(fragment);
            session.envelope = Some(envelope);
            session.rearm(|generation| {
                let this = Arc::clone(self);
                let id = session_id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(this.quiet).await;
                    this.fire(&id, Some(generation)).await;
                })
                .abort_handle()
            });
            session.pending.len()
        });

        tracing::debug!(session_id = %session_id, buffered, "fragment buffered");
    }

    /// Flush the session's buffer now, cancelling its timer.
    pub async fn flush(&self, session_id: &str) -> Flush {
        self.fire(session_id, None).await
    }

    /// Take the buffer and turn it into a job. With `generation` set, only
    /// the timer of that generation may flush.
    async fn fire(&self, session_id: &str, generation: Option<u64>) -> Flush {
        let taken = self.sessions.with(session_id, |session| {
            match generation {
                Some(g) if g != session.generation => return None,
                Some(_) => session.timer = None,
                None => session.disarm(),
            }
            Some((
                std::mem::take(&mut session.pending),
                session.envelope.take(),
                session.mode,
                session.locale.clone(),
            ))
        });

        let Some((fragments, envelope, mode, locale)) = taken else {
            tracing::debug!(session_id, "superseded timer skipped");
            return Flush::Superseded;
        };
        let Some(envelope) = envelope.filter(|_| !fragments.is_empty()) else {
            tracing::warn!(session_id, "flush found no buffered input");
            return Flush::Empty;
        };

        let locale = locale
            .unwrap_or_else(|| self.translator.resolve(envelope.language_hint.as_deref()));
        let query = fragments.join(&self.separator);
        let chars = query.chars().count();

        if chars > self.max_query_chars {
            tracing::warn!(
                session_id,
                chars,
                max = self.max_query_chars,
                "coalesced query too long, discarded"
            );
            TraceEvent::JobRejected {
                session_id: session_id.to_owned(),
                reason: cr_domain::Error::InputTooLarge {
                    len: chars,
                    max: self.max_query_chars,
                }
                .to_string(),
                query_chars: chars,
            }
            .emit();

            let notice = self.translator.get("error_message_too_long", &locale);
            if let Err(e) = self.deliverer.notify(&envelope, &notice, None).await {
                tracing::warn!(session_id, error = %e, "failed to send too-long notice");
            }
            return Flush::TooLong { chars };
        }

        let job = Job::new(envelope, query, fragments.len(), mode, locale);
        let job_id = job.id.to_string();
        let priority = priority_for(mode.key(), self.default_priority);

        TraceEvent::JobFlushed {
            session_id: session_id.to_owned(),
            job_id: job_id.clone(),
            fragments: job.fragments,
            query_chars: chars,
        }
        .emit();

        self.queue.submit(priority, job);
        Flush::Queued { job_id, priority }
    }
}
