use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// A single-use, short-lived WebSocket admission ticket (§4.9 Trust Boundary).
/// Minted by the `Authenticator` the core consumes; the Hub only validates
/// and consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub user_id: i64,
    pub device_id: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait TicketStore: Send + Sync + 'static {
    /// Mint a new ticket for `user_id`/`device_id`, valid for `ttl`.
    async fn issue(&self, user_id: i64, device_id: &str, ttl: Duration, now: DateTime<Utc>) -> String;

    /// Consume `ticket`, returning its claims if it exists and has not
    /// expired. Single-use: a second call with the same string returns
    /// `None` even if the first call succeeded.
    async fn consume(&self, ticket: &str, now: DateTime<Utc>) -> Option<Ticket>;
}

/// Process-local ticket store. Production deployments that mint tickets
/// from a separate auth service can swap in an implementation backed by
/// that service instead; the Hub depends only on the trait.
#[derive(Default)]
pub struct InMemoryTicketStore {
    tickets: Mutex<HashMap<String, Ticket>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn issue(&self, user_id: i64, device_id: &str, ttl: Duration, now: DateTime<Utc>) -> String {
        let id = Uuid::new_v4().to_string();
        let ticket = Ticket {
            user_id,
            device_id: device_id.to_string(),
            expires_at: now + ttl,
        };
        self.tickets.lock().unwrap().insert(id.clone(), ticket);
        id
    }

    async fn consume(&self, ticket: &str, now: DateTime<Utc>) -> Option<Ticket> {
        let mut tickets = self.tickets.lock().unwrap();
        let claims = tickets.remove(ticket)?;
        if claims.expires_at <= now {
            return None;
        }
        Some(claims)
    }
}
