//! Mode handlers turn a job's query into a reply.
//!
//! Handlers return [`Reply`] or a typed [`HandlerError`]; the worker owns
//! everything after that (delivery, error messages, the mode menu).

use std::collections::HashMap;
use std::sync::Arc;

use cr_domain::job::Job;
use cr_domain::mode::Mode;
use cr_providers::{CompletionRequest, Governor, Message, RetryPolicy};
use tokio::sync::Semaphore;

use crate::i18n::Translator;

/// What a handler produced for the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// Generated text, in the loose markdown the backends emit.
    pub text: String,
    /// Overrides the configured link-preview setting.
    pub disable_link_preview: Option<bool>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            disable_link_preview: None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    #[error("handler timed out")]
    Timeout,

    #[error(transparent)]
    Backend(#[from] cr_domain::Error),

    #[error("backend returned an empty answer")]
    EmptyAnswer,

    #[error("{0}")]
    Other(String),
}

impl HandlerError {
    /// Localization key of the message shown to the user.
    pub fn message_key(&self) -> &'static str {
        match self {
            HandlerError::Timeout | HandlerError::Backend(cr_domain::Error::Timeout(_)) => {
                "error_timeout"
            }
            HandlerError::EmptyAnswer => "error_empty_answer",
            HandlerError::Backend(_) | HandlerError::Other(_) => "error_generic",
        }
    }
}

/// Shared services a handler may use while serving one job.
#[derive(Clone)]
pub struct JobContext {
    pub governor: Arc<Governor>,
    pub retry: RetryPolicy,
    /// Bounds jobs with an in-flight generation call.
    pub admission: Arc<Semaphore>,
    pub translator: Arc<Translator>,
    pub locale: String,
}

#[async_trait::async_trait]
pub trait ModeHandler: Send + Sync {
    async fn handle(&self, ctx: &JobContext, job: &Job) -> Result<Reply, HandlerError>;
}

/// Handlers by mode. Modes without one answer with `mode_not_implemented`.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<Mode, Arc<dyn ModeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in completion handlers for `fast_reply` and
    /// `reasoning`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Mode::FastReply, Arc::new(CompletionHandler::fast_reply()));
        registry.register(Mode::Reasoning, Arc::new(CompletionHandler::reasoning()));
        registry
    }

    pub fn register(&mut self, mode: Mode, handler: Arc<dyn ModeHandler>) {
        if self.handlers.insert(mode, handler).is_some() {
            tracing::debug!(mode = %mode, "replaced mode handler");
        }
    }

    pub fn get(&self, mode: Mode) -> Option<Arc<dyn ModeHandler>> {
        self.handlers.get(&mode).cloned()
    }

    pub fn modes(&self) -> Vec<Mode> {
        Mode::ALL
            .into_iter()
            .filter(|m| self.handlers.contains_key(m))
            .collect()
    }
}

const FAST_REPLY_PROMPT: &str = "You are a helpful assistant. Answer concisely and \
accurately. Reply in the language with code '{locale}'. Use markdown sparingly: bold \
for key terms, lists where they help, fenced blocks for code.";

const REASONING_PROMPT: &str = "You are a careful assistant. Think the problem through \
before answering, then give a complete, well-structured answer. Reply in the language \
with code '{locale}'.";

/// Answers with a single governed completion call.
pub struct CompletionHandler {
    system_prompt: &'static str,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl CompletionHandler {
    pub fn fast_reply() -> Self {
        Self {
            system_prompt: FAST_REPLY_PROMPT,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn reasoning() -> Self {
        Self {
            system_prompt: REASONING_PROMPT,
            temperature: Some(0.6),
            max_tokens: Some(4096),
        }
    }

    fn request(&self, ctx: &JobContext, job: &Job) -> CompletionRequest {
        CompletionRequest {
            messages: vec![
                Message::system(self.system_prompt.replace("{locale}", &ctx.locale)),
                Message::user(job.query.clone()),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait::async_trait]
impl ModeHandler for CompletionHandler {
    async fn handle(&self, ctx: &JobContext, job: &Job) -> Result<Reply, HandlerError> {
        let req = self.request(ctx, job);

        let _permit = ctx
            .admission
            .acquire()
            .await
            .map_err(|_| HandlerError::Other("admission limiter closed".into()))?;

        let completion = ctx
            .retry
            .run("completion", || ctx.governor.call(None, &req))
            .await?;

        let text = cr_markup::strip_think(&completion.content);
        if text.is_empty() {
            return Err(HandlerError::EmptyAnswer);
        }
        tracing::debug!(
            job_id = %job.id,
            backend = %completion.backend,
            answer_chars = text.chars().count(),
            "completion answered"
        );
        Ok(Reply::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_by_kind() {
        assert_eq!(HandlerError::Timeout.message_key(), "error_timeout");
        assert_eq!(
            HandlerError::Backend(cr_domain::Error::Timeout("slow".into())).message_key(),
            "error_timeout"
        );
        assert_eq!(HandlerError::EmptyAnswer.message_key(), "error_empty_answer");
        assert_eq!(
            HandlerError::Backend(cr_domain::Error::Http("reset".into())).message_key(),
            "error_generic"
        );
    }

    #[test]
    fn builtin_registry_serves_completion_modes() {
        let registry = HandlerRegistry::with_builtin();
        assert_eq!(registry.modes(), [Mode::FastReply, Mode::Reasoning]);
        assert!(registry.get(Mode::DeepResearch).is_none());
    }
}
