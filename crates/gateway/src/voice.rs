//! Speech-to-text boundary for voice messages.

/// Transcribes recorded audio. Implementations live outside this crate.
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe `audio` (as received from the client) spoken in `locale`.
    async fn transcribe(&self, audio: &[u8], locale: &str) -> cr_domain::Result<String>;
}
