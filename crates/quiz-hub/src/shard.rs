use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};

use crate::client::{ClientHandle, CloseSignal};
use crate::protocol::ServerMessage;
use crate::stats::ShardStats;

/// One supervisory partition of the hub (§5: "The Hub uses one supervisory
/// task per shard, plus one reader and one writer task per connected
/// client"). A user's connection lives on exactly one shard, chosen by
/// [`crate::hub::Hub::shard_for`].
pub struct Shard {
    pub id: u32,
    clients: RwLock<HashMap<i64, ClientHandle>>,
    pub stats: ShardStats,
    queue_depth: usize,
}

impl Shard {
    pub fn new(id: u32, capacity: usize, queue_depth: usize) -> Self {
        Self {
            id,
            clients: RwLock::new(HashMap::new()),
            stats: ShardStats::new(id, capacity),
            queue_depth,
        }
    }

    /// Registers a new connection, replacing any prior connection for the
    /// same `user_id` (last connection wins — the old one is asked to
    /// close, consistent with single-writer-per-socket semantics).
    pub async fn register(
        &self,
        user_id: i64,
        device_id: String,
        now_ms: i64,
    ) -> (ClientHandle, mpsc::Receiver<ServerMessage>, mpsc::UnboundedReceiver<CloseSignal>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(self.queue_depth);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = ClientHandle::new(user_id, device_id, self.id, outbound_tx, control_tx, now_ms);

        let mut clients = self.clients.write().await;
        if let Some(old) = clients.insert(user_id, handle.clone()) {
            old.request_close(4001, "replaced_by_new_connection");
        } else {
            self.stats.on_connect();
        }
        (handle, outbound_rx, control_rx)
    }

    pub async fn unregister(&self, user_id: i64) {
        if self.clients.write().await.remove(&user_id).is_some() {
            self.stats.on_disconnect();
        }
    }

    pub async fn get(&self, user_id: i64) -> Option<ClientHandle> {
        self.clients.read().await.get(&user_id).cloned()
    }

    /// Enqueues `msg` on every listed client that belongs to this shard.
    /// A full queue marks that client for a forced close; it never blocks
    /// or skips the rest of the recipients.
    pub async fn broadcast(&self, user_ids: &[i64], msg: ServerMessage) {
        let clients = self.clients.read().await;
        for user_id in user_ids {
            if let Some(client) = clients.get(user_id) {
                if client.try_send(msg.clone()) {
                    self.stats.on_message_out();
                } else {
                    self.stats.on_error();
                    client.request_close(4001, "slow_client");
                }
            }
        }
    }

    pub async fn send_to(&self, user_id: i64, msg: ServerMessage) -> bool {
        let clients = self.clients.read().await;
        match clients.get(&user_id) {
            Some(client) => {
                let ok = client.try_send(msg);
                if ok {
                    self.stats.on_message_out();
                } else {
                    self.stats.on_error();
                    client.request_close(4001, "slow_client");
                }
                ok
            }
            None => false,
        }
    }

    /// Heartbeat every connected client and reap anyone silent longer than
    /// `reap_after_secs`. Returns the reaped user ids.
    pub async fn heartbeat_and_reap(&self, now_ms: i64, reap_after_secs: i64) -> Vec<i64> {
        let clients = self.clients.read().await;
        let mut reaped = Vec::new();
        for (user_id, client) in clients.iter() {
            let silent_for_secs = (now_ms - client.last_seen_ms()) / 1000;
            if silent_for_secs > reap_after_secs {
                client.request_close(1000, "heartbeat_timeout");
                self.stats.on_reap();
                reaped.push(*user_id);
                continue;
            }
            if client.try_send(ServerMessage::ServerHeartbeat {}) {
                self.stats.on_message_out();
            }
        }
        reaped
    }

    pub async fn all_user_ids(&self) -> Vec<i64> {
        self.clients.read().await.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_replaces_prior_connection_for_same_user() {
        let shard = Shard::new(0, 4, 2);
        let (first, _rx1, mut ctrl1) = shard.register(7, "device-a".into(), 0).await;
        let (_second, _rx2, _ctrl2) = shard.register(7, "device-b".into(), 1).await;

        let signal = ctrl1.try_recv().unwrap();
        assert_eq!(signal.code, 4001);
        assert_eq!(shard.stats.connection_count(), 1, "replacing a connection must not double-count");
        drop(first);
    }

    #[tokio::test]
    async fn full_outbound_queue_requests_a_close() {
        let shard = Shard::new(0, 4, 1);
        let (_handle, mut outbound_rx, mut control_rx) = shard.register(7, "device-a".into(), 0).await;

        shard.send_to(7, ServerMessage::ServerHeartbeat {}).await;
        let full = shard.send_to(7, ServerMessage::ServerHeartbeat {}).await;
        assert!(!full, "second send should find the depth-1 queue full");

        assert!(control_rx.try_recv().is_ok());
        assert!(outbound_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn reap_triggers_past_inactivity_window() {
        let shard = Shard::new(0, 4, 4);
        let (_handle, _rx, mut control_rx) = shard.register(7, "device-a".into(), 0).await;

        let reaped = shard.heartbeat_and_reap(100_000, 30).await;
        assert_eq!(reaped, vec![7]);
        assert!(control_rx.try_recv().is_ok());
    }
}
