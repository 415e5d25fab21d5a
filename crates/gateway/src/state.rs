use std::sync::Arc;

use cr_domain::config::Config;
use cr_providers::Governor;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::i18n::Translator;
use crate::runtime::{DispatchQueue, Relay, WorkerShared};
use crate::sessions::SessionRegistry;

/// Shared application state passed to all API handlers.
///
/// Fields are grouped by concern:
/// - **Core services**: config, translations, the generation governor
/// - **Pipeline**: inbound relay, sessions, dispatch queue, worker pool
/// - **Security & lifecycle**: token hash, shutdown token
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub translator: Arc<Translator>,
    pub governor: Arc<Governor>,

    // ── Pipeline ──────────────────────────────────────────────────────
    pub relay: Arc<Relay>,
    pub sessions: Arc<SessionRegistry>,
    pub queue: Arc<DispatchQueue>,
    pub admission: Arc<Semaphore>,
    pub workers: Arc<WorkerShared>,

    // ── Security & lifecycle ──────────────────────────────────────────
    /// SHA-256 of the API bearer token. `None` disables auth (dev mode).
    pub api_token_hash: Option<Vec<u8>>,
    pub shutdown: CancellationToken,
}
