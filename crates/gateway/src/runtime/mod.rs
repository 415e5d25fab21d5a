//! Inbound routing and the job pipeline behind it.
//!
//! [`Relay`] is the single entry point for inbound traffic: slash commands
//! and keyboard actions go to [`SessionControl`], text and transcribed
//! voice go through the [`Debouncer`] into the [`DispatchQueue`], which the
//! [`worker`] pool drains.

pub mod debounce;
pub mod dispatch;
pub mod presence;
pub mod worker;

use std::sync::Arc;

use cr_domain::envelope::Envelope;

use crate::commands::{parse_command, Action, Command, SessionControl};
use crate::delivery::Deliverer;
use crate::i18n::Translator;
use crate::transport::TransportError;
use crate::voice::Transcriber;

pub use debounce::{Debouncer, Flush};
pub use dispatch::{DispatchQueue, Queued};
pub use presence::PresenceGuard;
pub use worker::{spawn_workers, WorkerShared};

pub struct Relay {
    debouncer: Arc<Debouncer>,
    control: Arc<SessionControl>,
    deliverer: Arc<Deliverer>,
    translator: Arc<Translator>,
    transcriber: Option<Arc<dyn Transcriber>>,
}

impl Relay {
    pub fn new(
        debouncer: Arc<Debouncer>,
        control: Arc<SessionControl>,
        deliverer: Arc<Deliverer>,
        translator: Arc<Translator>,
        transcriber: Option<Arc<dyn Transcriber>>,
    ) -> Self {
        Self {
            debouncer,
            control,
            deliverer,
            translator,
            transcriber,
        }
    }

    pub fn debouncer(&self) -> &Arc<Debouncer> {
        &self.debouncer
    }

    /// Inbound text. Slash commands are applied immediately and never
    /// become jobs; anything else is buffered for the session. A session's
    /// first message is preceded by the welcome message.
    pub async fn on_text(&self, envelope: Envelope, text: &str) -> Result<(), TransportError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        match parse_command(text) {
            Some(Command::Action(action)) => return self.control.apply(&envelope, action).await,
            Some(Command::Unknown(name)) => {
                tracing::debug!(
                    session_id = %envelope.session_id,
                    command = %name,
                    "unknown command ignored"
                );
                return Ok(());
            }
            None => {}
        }

        self.greet(&envelope).await;
        self.debouncer.on_input(text, envelope);
        Ok(())
    }

    /// A failed welcome is logged; the message that triggered it is still
    /// buffered.
    async fn greet(&self, envelope: &Envelope) {
        if let Err(e) = self.control.greet_if_new(envelope).await {
            tracing::warn!(
                session_id = %envelope.session_id,
                error = %e,
                "welcome message not delivered"
            );
        }
    }

    /// Keyboard callback carrying an action string.
    pub async fn on_action(&self, envelope: Envelope, action: &str) -> Result<(), TransportError> {
        match action.parse::<Action>() {
            Ok(action) => self.control.apply(&envelope, action).await,
            Err(e) => {
                tracing::warn!(session_id = %envelope.session_id, error = %e, "invalid action");
                Ok(())
            }
        }
    }

    /// Inbound voice. The transcript is echoed back to the user and then
    /// buffered exactly like text.
    pub async fn on_voice(&self, envelope: Envelope, audio: &[u8]) -> Result<(), TransportError> {
        let locale = self.control.locale_for(&envelope);
        let Some(transcriber) = &self.transcriber else {
            let text = self.translator.get("voice_unsupported", &locale);
            return self.deliverer.notify(&envelope, &text, None).await;
        };

        let transcript = match transcriber.transcribe(audio, &locale).await {
            Ok(t) => t.trim().to_owned(),
            Err(e) => {
                tracing::error!(
                    session_id = %envelope.session_id,
                    error = %e,
                    "transcription failed"
                );
                let text = self.translator.get("error_generic", &locale);
                return self.deliverer.notify(&envelope, &text, None).await;
            }
        };
        if transcript.is_empty() {
            tracing::debug!(session_id = %envelope.session_id, "empty transcript ignored");
            return Ok(());
        }

        self.greet(&envelope).await;
        let echo = self
            .translator
            .format("voice_transcript", &locale, &[("text", &transcript)]);
        self.deliverer.notify(&envelope, &echo, None).await?;
        self.debouncer.on_input(transcript, envelope);
        Ok(())
    }
}
