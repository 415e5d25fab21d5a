//! Per-session state: selected mode and locale, the pending-input buffer and
//! the live debounce timer.
//!
//! All mutation goes through [`SessionRegistry::with`], which holds the
//! registry lock for the duration of the closure, so buffer appends, timer
//! replacement and flushes of one session never interleave.

use std::collections::HashMap;

use cr_domain::envelope::Envelope;
use cr_domain::mode::Mode;
use parking_lot::Mutex;
use tokio::task::AbortHandle;

#[derive(Debug, Default)]
pub struct Session {
    pub mode: Mode,
    /// `None` until the first contact has been handled.
    pub locale: Option<String>,
    /// Fragments waiting for the debounce timer, in arrival order.
    pub pending: Vec<String>,
    /// Most recent inbound envelope; replies to the next job go here.
    pub envelope: Option<Envelope>,
    /// Bumped every time the timer is replaced.
    pub(crate) generation: u64,
    pub(crate) timer: Option<AbortHandle>,
}

impl Session {
    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Cancel the live timer, if any, and install the one `spawn` returns.
    /// `spawn` receives the generation the new timer must present to flush.
    pub(crate) fn rearm(&mut self, spawn: impl FnOnce(u64) -> AbortHandle) {
        if let Some(old) = self.timer.take() {
            old.abort();
        }
        self.generation += 1;
        self.timer = Some(spawn(self.generation));
    }

    /// Cancel the live timer without replacing it.
    pub(crate) fn disarm(&mut self) {
        if let Some(old) = self.timer.take() {
            old.abort();
        }
        self.generation += 1;
    }
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Session>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Run `f` against the session, creating it on first use.
    ///
    /// `f` runs under the registry lock and must not block.
    pub fn with<R>(&self, session_id: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = self.sessions.lock();
        let session = sessions.entry(session_id.to_owned()).or_default();
        f(session)
    }

    pub fn mode(&self, session_id: &str) -> Mode {
        self.sessions
            .lock()
            .get(session_id)
            .map(|s| s.mode)
            .unwrap_or_default()
    }

    pub fn set_mode(&self, session_id: &str, mode: Mode) {
        self.with(session_id, |s| s.mode = mode);
        tracing::debug!(session_id, mode = %mode, "session mode changed");
    }

    pub fn locale(&self, session_id: &str) -> Option<String> {
        self.sessions
            .lock()
            .get(session_id)
            .and_then(|s| s.locale.clone())
    }

    pub fn set_locale(&self, session_id: &str, locale: impl Into<String>) {
        let locale = locale.into();
        tracing::debug!(session_id, locale = %locale, "session locale changed");
        self.with(session_id, |s| s.locale = Some(locale));
    }

    /// Number of sessions with a live debounce timer.
    pub fn armed_timers(&self) -> usize {
        self.sessions.lock().values().filter(|s| s.has_timer()).count()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
