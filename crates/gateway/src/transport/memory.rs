use parking_lot::Mutex;

use super::{OutboundDocument, OutboundMessage, TextFormat, Transport, TransportError};

type RejectFn = dyn Fn(&OutboundMessage) -> bool + Send + Sync;

/// Records everything sent through it. Markup messages matching the
/// rejection predicate fail with [`TransportError::MarkupRejected`].
#[derive(Default)]
pub struct MemoryTransport {
    messages: Mutex<Vec<OutboundMessage>>,
    documents: Mutex<Vec<OutboundDocument>>,
    presence: Mutex<Vec<String>>,
    rejected: Mutex<Vec<OutboundMessage>>,
    reject: Option<Box<RejectFn>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject markup messages for which `pred` holds. Plain messages are
    /// always accepted.
    pub fn rejecting(pred: impl Fn(&OutboundMessage) -> bool + Send + Sync + 'static) -> Self {
        Self {
            reject: Some(Box::new(pred)),
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages.lock().iter().map(|m| m.text.clone()).collect()
    }

    pub fn documents(&self) -> Vec<OutboundDocument> {
        self.documents.lock().clone()
    }

    pub fn presence_count(&self) -> usize {
        self.presence.lock().len()
    }

    /// Messages that were refused before a retry.
    pub fn rejected(&self) -> Vec<OutboundMessage> {
        self.rejected.lock().clone()
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send_message(&self, msg: &OutboundMessage) -> Result<(), TransportError> {
        let refuse = msg.format == TextFormat::Markup
            && self.reject.as_ref().is_some_and(|pred| pred(msg));
        if refuse {
            self.rejected.lock().push(msg.clone());
            return Err(TransportError::MarkupRejected(
                "can't parse entities".into(),
            ));
        }
        self.messages.lock().push(msg.clone());
        Ok(())
    }

    async fn send_document(&self, doc: &OutboundDocument) -> Result<(), TransportError> {
        self.documents.lock().push(doc.clone());
        Ok(())
    }

    async fn send_presence(&self, chat_id: &str) -> Result<(), TransportError> {
        self.presence.lock().push(chat_id.to_owned());
        Ok(())
    }
}
