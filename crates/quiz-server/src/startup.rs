use std::sync::Arc;
use std::time::Duration;

use quiz_cache::InMemoryCache;
use quiz_core::{Config, SystemClock};
use quiz_hub::{Hub, InMemoryTicketStore};
use quiz_orchestrator::OrchestratorRegistry;
use quiz_scheduler::Scheduler;
use quiz_store::{MemoryStore, PgStore, Store};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::auth::HeaderAuthenticator;
use crate::rate_limit::RateLimiter;
use crate::state::AppState;

/// Connects to Postgres and runs migrations; falls back to the in-memory
/// store (logged, not fatal) the same way `stupid_server::db::init_pg_pool`
/// degrades when `PG_URL` is unset or unreachable.
async fn build_store(config: &Config) -> Arc<dyn Store> {
    if config.postgres.pg_url.is_none() {
        info!("PG_URL not set — running with the in-memory store");
        return Arc::new(MemoryStore::new());
    }
    match PgStore::connect_and_migrate(&config.postgres.database_url()).await {
        Ok(store) => {
            info!("PostgreSQL connected and migrated");
            Arc::new(store)
        }
        Err(e) => {
            warn!(error = %e, "failed to connect to PostgreSQL — falling back to the in-memory store");
            Arc::new(MemoryStore::new())
        }
    }
}

/// Builds the full `AppState` and spawns its two long-running background
/// tasks: the orchestrator registry's inbound-message loop, and the hub's
/// heartbeat/reap tick.
pub async fn build(config: Config) -> Arc<AppState> {
    let store = build_store(&config).await;
    build_with_store(config, store).await
}

/// Same wiring as [`build`], but takes an already-constructed `Store` —
/// lets integration tests seed a `MemoryStore` with fixture data before
/// handing it to the router, without going through Postgres discovery.
pub async fn build_with_store(config: Config, store: Arc<dyn Store>) -> Arc<AppState> {
    let cache: Arc<dyn quiz_cache::Cache> = Arc::new(InMemoryCache::new());
    let clock: Arc<dyn quiz_core::Clock> = Arc::new(SystemClock);
    let hub = Arc::new(Hub::new(&config.hub, Arc::new(InMemoryTicketStore::new())));

    let registry = Arc::new(OrchestratorRegistry::new(
        store.clone(),
        cache.clone(),
        hub.clone(),
        clock.clone(),
        &config.selector,
        &config.answer,
        &config.prize,
        config.scheduler.question_grace_ms,
    ));

    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        hub.clone(),
        config.scheduler.clone(),
        registry.clone(),
    ));

    let (inbound_tx, inbound_rx) = mpsc::channel(1024);

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        cache,
        hub: hub.clone(),
        clock: clock.clone(),
        scheduler,
        registry: registry.clone(),
        authenticator: Arc::new(HeaderAuthenticator),
        ticket_rate_limiter: RateLimiter::new(10, Duration::from_secs(60)),
        inbound_tx,
    });

    tokio::spawn(async move { registry.run(inbound_rx).await });
    spawn_heartbeat_loop(hub, clock, config.hub.heartbeat_interval_secs, config.hub.reap_after_secs);

    state
}

fn spawn_heartbeat_loop(
    hub: Arc<Hub>,
    clock: Arc<dyn quiz_core::Clock>,
    interval_secs: u64,
    reap_after_secs: u64,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            hub.heartbeat_tick(clock.now_ms(), reap_after_secs as i64).await;
        }
    });
}
