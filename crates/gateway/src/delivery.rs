//! Delivery of generated answers.
//!
//! Oversized code blocks are sent first as documents. The rest is rendered
//! into the transport markup, split into frames and sent frame by frame.
//! A frame the transport rejects for its markup is retried at the next
//! [`Stage`]; the plain stage is always accepted. Only the last frame
//! carries the keyboard.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cr_domain::config::DeliveryConfig;
use cr_domain::envelope::Envelope;
use cr_domain::trace::TraceEvent;
use cr_markup::{degrade, extract_attachments, render, split, Attachment, Frame, Stage};
use sha2::{Digest, Sha256};

use crate::transport::{
    Keyboard, OutboundDocument, OutboundMessage, TextFormat, Transport, TransportError,
};

/// Rendering intent for one payload.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub disable_link_preview: bool,
    /// Attached to the last frame only.
    pub keyboard: Option<Keyboard>,
}

/// What a delivery actually sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attachments: usize,
    pub frames: usize,
    /// Frames that needed a fallback stage, with the stage that went through.
    pub degraded: Vec<(usize, Stage)>,
}

pub struct Deliverer {
    transport: Arc<dyn Transport>,
    cfg: DeliveryConfig,
}

impl Deliverer {
    pub fn new(transport: Arc<dyn Transport>, cfg: DeliveryConfig) -> Self {
        Self { transport, cfg }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.cfg
    }

    /// Send `text` to the chat addressed by `envelope`.
    ///
    /// Any transport error other than a markup rejection aborts the rest of
    /// the payload.
    pub async fn deliver(
        &self,
        envelope: &Envelope,
        text: &str,
        opts: &RenderOptions,
    ) -> Result<DeliveryReport, TransportError> {
        let session_id = envelope.session_id.as_str();
        let extracted = extract_attachments(text, self.cfg.code_attachment_threshold);

        let mut report = DeliveryReport::default();
        for attachment in &extracted.attachments {
            self.send_attachment(envelope, attachment).await?;
            report.attachments += 1;
        }

        let rendered = render(&extracted.body);
        let frames = split(&rendered, self.cfg.max_message_chars);
        let count = frames.len();
        tracing::debug!(
            session_id,
            attachments = report.attachments,
            rendered_chars = rendered.chars().count(),
            frames = count,
            "delivering answer"
        );

        for (index, frame) in frames.iter().enumerate() {
            let keyboard = if index + 1 == count {
                opts.keyboard.clone()
            } else {
                None
            };
            let stage = self
                .send_frame(envelope, frame, keyboard, opts.disable_link_preview)
                .await?;
            if stage != Stage::Rendered {
                TraceEvent::RenderDegraded {
                    session_id: session_id.to_owned(),
                    frame_index: index,
                    stage: stage.to_string(),
                }
                .emit();
                report.degraded.push((index, stage));
            }
            report.frames += 1;
        }

        Ok(report)
    }

    /// Send an unstyled advisory message.
    pub async fn notify(
        &self,
        envelope: &Envelope,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), TransportError> {
        let mut msg = OutboundMessage::plain(envelope.chat_id.clone(), text);
        msg.keyboard = keyboard;
        self.transport.send_message(&msg).await
    }

    /// Send one frame, escalating through the fallback stages on markup
    /// rejection. Returns the stage that was accepted.
    async fn send_frame(
        &self,
        envelope: &Envelope,
        frame: &Frame,
        keyboard: Option<Keyboard>,
        disable_link_preview: bool,
    ) -> Result<Stage, TransportError> {
        let ceiling = self.cfg.max_message_chars;

        for stage in Stage::ALL {
            let text = degrade(frame, stage);
            if stage.is_markup() && text.chars().count() > ceiling {
                tracing::debug!(
                    session_id = %envelope.session_id,
                    stage = %stage,
                    "escaped frame exceeds the ceiling, skipping stage"
                );
                continue;
            }

            let msg = OutboundMessage {
                chat_id: envelope.chat_id.clone(),
                text,
                format: if stage.is_markup() {
                    TextFormat::Markup
                } else {
                    TextFormat::Plain
                },
                disable_link_preview,
                keyboard: keyboard.clone(),
            };

            match self.transport.send_message(&msg).await {
                Ok(()) => return Ok(stage),
                Err(TransportError::MarkupRejected(reason)) if stage.is_markup() => {
                    tracing::warn!(
                        session_id = %envelope.session_id,
                        stage = %stage,
                        reason = %reason,
                        "transport rejected frame markup, escalating"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(TransportError::Other(
            "plain-text fallback was not attempted".into(),
        ))
    }

    async fn send_attachment(
        &self,
        envelope: &Envelope,
        attachment: &Attachment,
    ) -> Result<(), TransportError> {
        if let Some(dir) = &self.cfg.attachments_dir {
            match persist_attachment(dir, attachment).await {
                Ok(path) => {
                    tracing::debug!(path = %path.display(), "attachment persisted")
                }
                Err(e) => tracing::warn!(
                    dir = %dir.display(),
                    error = %e,
                    "failed to persist attachment"
                ),
            }
        }

        let doc = OutboundDocument {
            chat_id: envelope.chat_id.clone(),
            name: attachment.name.clone(),
            content: attachment.content.clone().into_bytes(),
        };
        self.transport.send_document(&doc).await?;

        TraceEvent::AttachmentEmitted {
            session_id: envelope.session_id.clone(),
            name: attachment.name.clone(),
            bytes: doc.content.len(),
        }
        .emit();
        Ok(())
    }
}

/// File name for persisted attachment content: the SHA-256 of the content
/// plus the attachment's extension.
pub fn content_addressed_name(attachment: &Attachment) -> String {
    let digest = hex::encode(Sha256::digest(attachment.content.as_bytes()));
    let ext = attachment
        .name
        .rsplit_once('.')
        .map_or("txt", |(_, ext)| ext);
    format!("{digest}.{ext}")
}

/// Write `attachment` under `dir` unless identical content is already there.
async fn persist_attachment(dir: &Path, attachment: &Attachment) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(content_addressed_name(attachment));

    let created = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await;
    match created {
        Ok(file) => write_or_discard(file, &path, attachment.content.as_bytes()).await?,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e),
    }
    Ok(path)
}

/// Write `bytes` to the freshly created `path`, removing it again when the
/// write fails. A partial file would pass for the stored content later.
async fn write_or_discard<W>(mut file: W, path: &Path, bytes: &[u8]) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    use tokio::io::AsyncWriteExt;

    let written = match file.write_all(bytes).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        drop(file);
        if let Err(rm) = tokio::fs::remove_file(path).await {
            tracing::warn!(
                path = %path.display(),
                error = %rm,
                "removing partial attachment failed"
            );
        }
        return Err(e);
    }
    Ok(())
}
