use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Monotonic + wall time source, injectable for test.
///
/// Every timer in the system (scheduler gaps, per-question deadlines,
/// heartbeat reaping) reads time through this trait instead of calling
/// `Utc::now()`/`Instant::now()` directly, so tests can advance a
/// [`MockClock`] deterministically instead of sleeping in wall time.
pub trait Clock: Send + Sync + 'static {
    /// Current wall-clock time, server-authoritative.
    fn now(&self) -> DateTime<Utc>;

    /// Current time as integer milliseconds since epoch — the wire format
    /// used for all timestamps in the WebSocket protocol (§6.1).
    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock with an explicitly advanceable time, shared via `Arc` so a
/// test can hold a handle and move the clock forward while the orchestrator
/// holds a `dyn Clock` trait object pointing at the same state.
#[derive(Clone)]
pub struct MockClock {
    millis: Arc<AtomicI64>,
}

impl MockClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    /// Advance the clock by `delta_ms` milliseconds.
    pub fn advance_ms(&self, delta_ms: i64) {
        self.millis.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Set the clock to an absolute instant.
    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .unwrap_or_else(Utc::now)
    }
}
