//! Outbound side of the chat transport.
//!
//! A [`Transport`] sends text messages (with an optional inline keyboard),
//! file documents and the "processing" presence signal. Adapters map their
//! wire failures onto [`TransportError`]; only
//! [`TransportError::MarkupRejected`] lets the deliverer retry a frame in a
//! degraded rendering.

pub mod console;
pub mod memory;
pub mod webhook;

use serde::Serialize;

pub use console::ConsoleTransport;
pub use memory::MemoryTransport;
pub use webhook::WebhookTransport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub label: String,
    /// Action string fed back through [`crate::commands`] when pressed.
    pub action: String,
}

impl Button {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Self { rows }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }
}

/// How the transport should interpret message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFormat {
    Markup,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub chat_id: String,
    pub text: String,
    pub format: TextFormat,
    pub disable_link_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<Keyboard>,
}

impl OutboundMessage {
    /// Unstyled text with no keyboard.
    pub fn plain(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            text: text.into(),
            format: TextFormat::Plain,
            disable_link_preview: true,
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundDocument {
    pub chat_id: String,
    pub name: String,
    pub content: Vec<u8>,
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The transport could not parse the message markup.
    #[error("markup rejected: {0}")]
    MarkupRejected(String),

    #[error("network: {0}")]
    Network(String),

    #[error("timed out")]
    TimedOut,

    #[error("{0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, msg: &OutboundMessage) -> Result<(), TransportError>;

    async fn send_document(&self, doc: &OutboundDocument) -> Result<(), TransportError>;

    /// Best-effort "processing" indicator.
    async fn send_presence(&self, chat_id: &str) -> Result<(), TransportError>;
}
