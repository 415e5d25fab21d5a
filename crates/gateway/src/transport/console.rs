use std::io::Write;

use super::{OutboundDocument, OutboundMessage, Transport, TransportError};

/// Prints replies to stdout. Used by `chatrelay chat`.
///
/// Markup is printed as-is; the console never rejects it.
#[derive(Debug, Default)]
pub struct ConsoleTransport;

impl ConsoleTransport {
    pub fn new() -> Self {
        Self
    }

    fn print(&self, block: &str) -> Result<(), TransportError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{block}").map_err(|e| TransportError::Other(e.to_string()))?;
        out.flush().map_err(|e| TransportError::Other(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Transport for ConsoleTransport {
    async fn send_message(&self, msg: &OutboundMessage) -> Result<(), TransportError> {
        let mut block = msg.text.clone();
        if let Some(keyboard) = &msg.keyboard {
            for row in &keyboard.rows {
                let line: Vec<String> = row
                    .iter()
                    .map(|b| format!("[{}] ({})", b.label, b.action))
                    .collect();
                block.push('\n');
                block.push_str(&line.join("  "));
            }
        }
        self.print(&block)
    }

    async fn send_document(&self, doc: &OutboundDocument) -> Result<(), TransportError> {
        let body = String::from_utf8_lossy(&doc.content);
        self.print(&format!(
            "📎 {} ({} bytes)\n{body}",
            doc.name,
            doc.content.len()
        ))
    }

    async fn send_presence(&self, chat_id: &str) -> Result<(), TransportError> {
        tracing::trace!(chat_id, "presence");
        Ok(())
    }
}
