use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Lock-free per-shard counters, mirroring `stupid_server::state::QueueMetrics`:
/// one struct of `AtomicU64`s read with `Ordering::Relaxed`, safe to snapshot
/// from an HTTP handler without contending with the shard's own traffic.
pub struct ShardStats {
    pub shard_id: u32,
    pub capacity: usize,
    connections: AtomicU64,
    messages_in: AtomicU64,
    messages_out: AtomicU64,
    errors: AtomicU64,
    reaped: AtomicU64,
    started_at: Instant,
}

impl ShardStats {
    pub fn new(shard_id: u32, capacity: usize) -> Self {
        Self {
            shard_id,
            capacity,
            connections: AtomicU64::new(0),
            messages_in: AtomicU64::new(0),
            messages_out: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            reaped: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn on_connect(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_disconnect(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn on_message_in(&self) {
        self.messages_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_message_out(&self) {
        self.messages_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_reap(&self) {
        self.reaped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_count(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Snapshot consistent enough for a dashboard read: each field loaded
    /// independently with `Relaxed` ordering, no cross-field atomicity.
    pub fn snapshot(&self, hot_shard_load_fraction: f64) -> ShardStatsSnapshot {
        let connections = self.connections.load(Ordering::Relaxed);
        let load_percentage = if self.capacity == 0 {
            0.0
        } else {
            connections as f64 / self.capacity as f64
        };
        ShardStatsSnapshot {
            shard_id: self.shard_id,
            connections,
            capacity: self.capacity,
            messages_in: self.messages_in.load(Ordering::Relaxed),
            messages_out: self.messages_out.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            reaped: self.reaped.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
            hot_shard: load_percentage > hot_shard_load_fraction,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ShardStatsSnapshot {
    pub shard_id: u32,
    pub connections: u64,
    pub capacity: usize,
    pub messages_in: u64,
    pub messages_out: u64,
    pub errors: u64,
    pub reaped: u64,
    pub uptime_secs: u64,
    pub hot_shard: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HubStats {
    pub shards: Vec<ShardStatsSnapshot>,
    pub total_connections: u64,
}

impl HubStats {
    pub fn from_shards(shards: Vec<ShardStatsSnapshot>) -> Self {
        let total_connections = shards.iter().map(|s| s.connections).sum();
        Self { shards, total_connections }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_shard_fires_past_threshold() {
        let stats = ShardStats::new(0, 4);
        stats.on_connect();
        stats.on_connect();
        stats.on_connect();
        let snap = stats.snapshot(0.5);
        assert!(snap.hot_shard, "3/4 capacity should exceed a 0.5 threshold");
    }

    #[test]
    fn connection_count_tracks_connect_and_disconnect() {
        let stats = ShardStats::new(0, 4);
        stats.on_connect();
        stats.on_connect();
        stats.on_disconnect();
        assert_eq!(stats.connection_count(), 1);
    }
}
