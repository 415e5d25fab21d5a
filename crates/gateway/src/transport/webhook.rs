//! Connector webhook transport.
//!
//! Every outbound item is POSTed as JSON to `server.outbound_url`, tagged by
//! `type`: `message`, `document` (content base64-encoded) or `presence`.
//! The connector relays to the chat platform and mirrors its status code; a
//! 400 whose body mentions entity parsing means the platform refused the
//! markup.

use std::time::Duration;

use base64::Engine as _;
use serde_json::json;

use super::{OutboundDocument, OutboundMessage, TextFormat, Transport, TransportError};

/// Markup dialect name the connector forwards to the platform.
pub const PARSE_MODE: &str = "MarkdownV2";

pub struct WebhookTransport {
    url: String,
    client: reqwest::Client,
}

impl WebhookTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    async fn post(&self, body: serde_json::Value) -> Result<(), TransportError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(classify(status, &text))
    }
}

fn from_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::TimedOut
    } else {
        TransportError::Network(e.to_string())
    }
}

fn is_markup_rejection(status: u16, body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    status == 400 && (body.contains("parse entities") || body.contains("entity"))
}

fn classify(status: u16, body: &str) -> TransportError {
    if is_markup_rejection(status, body) {
        TransportError::MarkupRejected(body.trim().to_owned())
    } else if status == 408 || status == 504 {
        TransportError::TimedOut
    } else if status >= 500 {
        TransportError::Network(format!("HTTP {status}"))
    } else {
        TransportError::Other(format!("HTTP {status} - {}", body.trim()))
    }
}

#[async_trait::async_trait]
impl Transport for WebhookTransport {
    async fn send_message(&self, msg: &OutboundMessage) -> Result<(), TransportError> {
        let parse_mode = match msg.format {
            TextFormat::Markup => Some(PARSE_MODE),
            TextFormat::Plain => None,
        };
        self.post(json!({
            "type": "message",
            "chat_id": msg.chat_id,
            "text": msg.text,
            "parse_mode": parse_mode,
            "disable_link_preview": msg.disable_link_preview,
            "keyboard": msg.keyboard,
        }))
        .await
    }

    async fn send_document(&self, doc: &OutboundDocument) -> Result<(), TransportError> {
        self.post(json!({
            "type": "document",
            "chat_id": doc.chat_id,
            "name": doc.name,
            "content_base64": base64::engine::general_purpose::STANDARD.encode(&doc.content),
        }))
        .await
    }

    async fn send_presence(&self, chat_id: &str) -> Result<(), TransportError> {
        self.post(json!({
            "type": "presence",
            "chat_id": chat_id,
            "action": "typing",
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_parse_failures_are_markup_rejections() {
        let err = classify(
            400,
            r#"{"ok":false,"description":"Bad Request: can't parse entities: character '.' is reserved"}"#,
        );
        assert!(matches!(err, TransportError::MarkupRejected(_)));
    }

    #[test]
    fn other_failures_are_not_markup_rejections() {
        assert!(matches!(
            classify(400, "chat not found"),
            TransportError::Other(_)
        ));
        assert!(matches!(classify(502, ""), TransportError::Network(_)));
        assert!(matches!(classify(504, ""), TransportError::TimedOut));
    }
}
