//! Periodic "processing" presence signal for a running job.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::transport::Transport;

/// Keeps the presence signal alive until stopped or dropped.
pub struct PresenceGuard {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PresenceGuard {
    /// Send the signal to `chat_id` now and then every `interval`. A failed
    /// send waits `retry` before the next attempt.
    pub fn start(
        transport: Arc<dyn Transport>,
        chat_id: String,
        interval: Duration,
        retry: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let stop = token.clone();

        let task = tokio::spawn(async move {
            loop {
                let wait = match transport.send_presence(&chat_id).await {
                    Ok(()) => interval,
                    Err(e) => {
                        tracing::warn!(chat_id = %chat_id, error = %e, "presence signal failed");
                        retry
                    }
                };
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        });

        Self {
            token,
            task: Some(task),
        }
    }

    /// Cancel the signal and wait for its task to end.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryTransport, OutboundDocument, OutboundMessage, TransportError};
    use parking_lot::Mutex;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn repeats_until_stopped() {
        let transport = Arc::new(MemoryTransport::new());
        let guard = PresenceGuard::start(
            transport.clone(),
            "c".into(),
            Duration::from_secs(8),
            Duration::from_secs(15),
        );

        tokio::time::sleep(Duration::from_secs(20)).await;
        // t = 0, 8, 16
        assert_eq!(transport.presence_count(), 3);

        guard.stop().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.presence_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_guard_cancels() {
        let transport = Arc::new(MemoryTransport::new());
        let guard = PresenceGuard::start(
            transport.clone(),
            "c".into(),
            Duration::from_secs(8),
            Duration::from_secs(15),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(guard);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.presence_count(), 1);
    }

    struct Flaky {
        attempts: Mutex<Vec<Instant>>,
    }

    #[async_trait::async_trait]
    impl Transport for Flaky {
        async fn send_message(&self, _msg: &OutboundMessage) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send_document(&self, _doc: &OutboundDocument) -> Result<(), TransportError> {
            Ok(())
        }

        async fn send_presence(&self, _chat_id: &str) -> Result<(), TransportError> {
            self.attempts.lock().push(Instant::now());
            Err(TransportError::TimedOut)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failures_back_off_longer() {
        let transport = Arc::new(Flaky {
            attempts: Mutex::new(Vec::new()),
        });
        let start = Instant::now();
        let guard = PresenceGuard::start(
            transport.clone(),
            "c".into(),
            Duration::from_secs(8),
            Duration::from_secs(15),
        );
        tokio::time::sleep(Duration::from_secs(31)).await;
        guard.stop().await;

        let offsets: Vec<u64> = transport
            .attempts
            .lock()
            .iter()
            .map(|t| t.duration_since(start).as_secs())
            .collect();
        assert_eq!(offsets, [0, 15, 30]);
    }
}
