use std::sync::Arc;

use quiz_cache::Cache;
use quiz_core::config::HubConfig;
use quiz_core::{Clock, Config};
use quiz_hub::Hub;
use quiz_orchestrator::OrchestratorRegistry;
use quiz_scheduler::Scheduler;
use quiz_store::Store;
use tokio::sync::mpsc;

use crate::auth::Authenticator;
use crate::rate_limit::RateLimiter;

/// Everything the HTTP/WS surface needs, built once in [`crate::startup`]
/// and shared behind an `Arc` across every axum handler — the same shape
/// as `stupid_server::state::AppState`.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub cache: Arc<dyn Cache>,
    pub hub: Arc<Hub>,
    pub clock: Arc<dyn Clock>,
    pub scheduler: Arc<Scheduler>,
    pub registry: Arc<OrchestratorRegistry>,
    pub authenticator: Arc<dyn Authenticator>,
    pub ticket_rate_limiter: RateLimiter,
    /// Every parsed client frame is forwarded here; [`OrchestratorRegistry::run`]
    /// drains it for the lifetime of the process.
    pub inbound_tx: mpsc::Sender<(i64, quiz_hub::ClientMessage)>,
}

impl AppState {
    pub fn hub_config(&self) -> &HubConfig {
        &self.config.hub
    }
}
