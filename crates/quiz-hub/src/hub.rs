use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::info;

use quiz_core::config::HubConfig;

use crate::client::{ClientHandle, CloseSignal};
use crate::error::HubError;
use crate::protocol::ServerMessage;
use crate::shard::Shard;
use crate::stats::HubStats;
use crate::ticket::TicketStore;

/// Sharded WebSocket fan-out hub (§4.8). Owns no knowledge of quiz rules —
/// it routes bytes and enforces per-client backpressure; the orchestrator
/// decides what to send and reacts to what arrives.
pub struct Hub {
    shards: Vec<Arc<Shard>>,
    pub tickets: Arc<dyn TicketStore>,
    quiz_subscribers: RwLock<HashMap<i64, HashSet<i64>>>,
    hot_shard_load_fraction: f64,
    write_deadline_secs: u64,
}

impl Hub {
    pub fn new(config: &HubConfig, tickets: Arc<dyn TicketStore>) -> Self {
        let shards = (0..config.shard_count)
            .map(|id| Arc::new(Shard::new(id, config.max_connections_per_shard, config.outbound_queue_depth)))
            .collect();
        Self {
            shards,
            tickets,
            quiz_subscribers: RwLock::new(HashMap::new()),
            hot_shard_load_fraction: config.hot_shard_load_fraction,
            write_deadline_secs: config.write_deadline_secs,
        }
    }

    pub fn write_deadline_secs(&self) -> u64 {
        self.write_deadline_secs
    }

    /// Records a socket-write timeout against the owning shard's error
    /// counter and requests the connection close, the same bookkeeping a
    /// full outbound queue gets in [`Shard::broadcast`]/[`Shard::send_to`]
    /// (§5: "client-socket writes use a short deadline").
    pub async fn note_write_timeout(&self, user_id: i64) {
        let shard = self.shard_for(user_id);
        if let Some(client) = shard.get(user_id).await {
            shard.stats.on_error();
            client.request_close(1000, "write_timeout");
        }
    }

    /// `hash(user_id) mod shard_count` (§4.8 step 3), using a multiplicative
    /// hash so sequential user ids don't all cluster on low shard indices.
    fn shard_for(&self, user_id: i64) -> &Arc<Shard> {
        let hashed = (user_id as u64).wrapping_mul(0x9E3779B97F4A7C15);
        let idx = (hashed as usize) % self.shards.len();
        &self.shards[idx]
    }

    pub async fn register_client(
        &self,
        user_id: i64,
        device_id: String,
        now_ms: i64,
    ) -> (ClientHandle, mpsc::Receiver<ServerMessage>, mpsc::UnboundedReceiver<CloseSignal>) {
        let shard = self.shard_for(user_id);
        shard.register(user_id, device_id, now_ms).await
    }

    pub async fn unregister_client(&self, user_id: i64) {
        self.shard_for(user_id).unregister(user_id).await;
        let mut subs = self.quiz_subscribers.write().await;
        for members in subs.values_mut() {
            members.remove(&user_id);
        }
    }

    pub async fn subscribe_quiz(&self, quiz_id: i64, user_id: i64) {
        self.quiz_subscribers.write().await.entry(quiz_id).or_default().insert(user_id);
    }

    pub async fn unsubscribe_quiz(&self, quiz_id: i64, user_id: i64) {
        if let Some(members) = self.quiz_subscribers.write().await.get_mut(&quiz_id) {
            members.remove(&user_id);
        }
    }

    /// Looks up the quiz the given user's connection is currently attached to
    /// (set via `user:ready`/`user:resync`), used by the orchestrator registry to
    /// route a bare `user:answer` (which carries no quiz id) to the right quiz.
    pub async fn current_quiz_of(&self, user_id: i64) -> Option<i64> {
        self.shard_for(user_id).get(user_id).await?.current_quiz()
    }

    pub async fn player_count(&self, quiz_id: i64) -> usize {
        self.quiz_subscribers
            .read()
            .await
            .get(&quiz_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    /// User ids currently connected (socket alive) and subscribed to this
    /// quiz, i.e. the quiz's live connectivity — used by
    /// `finish_on_zero_players` (§4.3.1) to distinguish "every remaining
    /// participant disconnected" from elimination-based exhaustion.
    /// `quiz_subscribers` already drops a user on disconnect/reap (see
    /// `unregister_client`/`heartbeat_tick`), so this set is exact, not an
    /// approximation.
    pub async fn connected_users_of(&self, quiz_id: i64) -> HashSet<i64> {
        self.quiz_subscribers.read().await.get(&quiz_id).cloned().unwrap_or_default()
    }

    /// `BroadcastToQuiz(quizID, event)` (§4.8). Enumerates current
    /// subscribers, groups them per shard, and enqueues on each — a single
    /// slow client's full queue never blocks delivery to the others.
    pub async fn broadcast_to_quiz(&self, quiz_id: i64, msg: ServerMessage) {
        let members: Vec<i64> = match self.quiz_subscribers.read().await.get(&quiz_id) {
            Some(set) => set.iter().copied().collect(),
            None => return,
        };

        let mut by_shard: HashMap<usize, Vec<i64>> = HashMap::new();
        for user_id in members {
            let hashed = (user_id as u64).wrapping_mul(0x9E3779B97F4A7C15);
            let idx = (hashed as usize) % self.shards.len();
            by_shard.entry(idx).or_default().push(user_id);
        }

        for (idx, user_ids) in by_shard {
            self.shards[idx].broadcast(&user_ids, msg.clone()).await;
        }
    }

    /// `SendToUser(userID, event)` (§4.8).
    pub async fn send_to_user(&self, user_id: i64, msg: ServerMessage) -> Result<(), HubError> {
        if self.shard_for(user_id).send_to(user_id, msg).await {
            Ok(())
        } else {
            Err(HubError::NotConnected(user_id))
        }
    }

    /// `RevokeSession(userID)` (§4.9): emits `session_revoked` and closes
    /// the socket. Best-effort if the user isn't currently connected.
    pub async fn revoke_session(&self, user_id: i64) {
        let shard = self.shard_for(user_id);
        if let Some(client) = shard.get(user_id).await {
            client.try_send(ServerMessage::SessionRevoked {});
            client.request_close(1008, "session_revoked");
        }
    }

    /// `LogoutAll(userID)` (§4.9).
    pub async fn logout_all(&self, user_id: i64) {
        let shard = self.shard_for(user_id);
        if let Some(client) = shard.get(user_id).await {
            client.try_send(ServerMessage::LogoutAllDevices {});
            client.request_close(1008, "logout_all_devices");
        }
    }

    pub fn stats(&self) -> HubStats {
        let snapshots = self
            .shards
            .iter()
            .map(|s| s.stats.snapshot(self.hot_shard_load_fraction))
            .collect();
        HubStats::from_shards(snapshots)
    }

    /// Runs the heartbeat/reap tick once across every shard (§4.8: "server
    /// emits `server:heartbeat` every H seconds ... a client with no
    /// inbound activity for 2.5H is reaped"). Callers spawn this on an
    /// interval; kept as a single async step (not a loop) so tests can
    /// drive it deterministically without sleeping.
    pub async fn heartbeat_tick(&self, now_ms: i64, reap_after_secs: i64) {
        for shard in &self.shards {
            let reaped = shard.heartbeat_and_reap(now_ms, reap_after_secs).await;
            if !reaped.is_empty() {
                info!(shard_id = shard.id, count = reaped.len(), "reaped inactive clients");
                let mut subs = self.quiz_subscribers.write().await;
                for members in subs.values_mut() {
                    for user_id in &reaped {
                        members.remove(user_id);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::config::HubConfig;
    use crate::ticket::InMemoryTicketStore;

    fn test_config() -> HubConfig {
        HubConfig {
            shard_count: 4,
            outbound_queue_depth: 4,
            heartbeat_interval_secs: 15,
            reap_after_secs: 38,
            hot_shard_load_fraction: 0.75,
            ticket_ttl_secs: 60,
            write_deadline_secs: 5,
            max_connections_per_shard: 64,
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber_across_shards() {
        let hub = Hub::new(&test_config(), Arc::new(InMemoryTicketStore::new()));
        let mut receivers = Vec::new();
        for user_id in [1, 2, 3, 4, 5] {
            let (_handle, rx, _ctrl) = hub.register_client(user_id, "d".into(), 0).await;
            hub.subscribe_quiz(42, user_id).await;
            receivers.push(rx);
        }

        hub.broadcast_to_quiz(42, ServerMessage::QuizFinish { quiz_id: 42 }).await;

        for mut rx in receivers {
            let msg = rx.try_recv().unwrap();
            assert_eq!(msg, ServerMessage::QuizFinish { quiz_id: 42 });
        }
    }

    #[tokio::test]
    async fn unregister_drops_quiz_subscription() {
        let hub = Hub::new(&test_config(), Arc::new(InMemoryTicketStore::new()));
        let (_handle, _rx, _ctrl) = hub.register_client(1, "d".into(), 0).await;
        hub.subscribe_quiz(42, 1).await;
        assert_eq!(hub.player_count(42).await, 1);

        hub.unregister_client(1).await;
        assert_eq!(hub.player_count(42).await, 0);
    }

    #[tokio::test]
    async fn revoke_session_emits_event_and_requests_close() {
        let hub = Hub::new(&test_config(), Arc::new(InMemoryTicketStore::new()));
        let (_handle, mut rx, mut ctrl) = hub.register_client(1, "d".into(), 0).await;

        hub.revoke_session(1).await;
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::SessionRevoked {});
        let signal = ctrl.try_recv().unwrap();
        assert_eq!(signal.code, 1008);
    }
}
