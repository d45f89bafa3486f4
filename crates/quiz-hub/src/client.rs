use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::protocol::ServerMessage;

/// Sent on the control channel to force a connection closed without going
/// through the (possibly full) outbound message queue — backpressure on
/// business messages must never delay a close.
#[derive(Debug, Clone, Copy)]
pub struct CloseSignal {
    pub code: u16,
    pub reason: &'static str,
}

/// A connected client's registry entry (§3 "WSClient"). Cloneable handle;
/// the actual reader/writer tasks and the registry both hold one.
#[derive(Clone)]
pub struct ClientHandle {
    pub user_id: i64,
    pub device_id: String,
    pub shard_id: u32,
    pub(crate) outbound: mpsc::Sender<ServerMessage>,
    pub(crate) control: mpsc::UnboundedSender<CloseSignal>,
    last_seen_ms: Arc<AtomicI64>,
    current_quiz: Arc<AtomicI64>,
}

impl ClientHandle {
    pub fn new(
        user_id: i64,
        device_id: String,
        shard_id: u32,
        outbound: mpsc::Sender<ServerMessage>,
        control: mpsc::UnboundedSender<CloseSignal>,
        now_ms: i64,
    ) -> Self {
        Self {
            user_id,
            device_id,
            shard_id,
            outbound,
            control,
            last_seen_ms: Arc::new(AtomicI64::new(now_ms)),
            current_quiz: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn touch(&self, now_ms: i64) {
        self.last_seen_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn last_seen_ms(&self) -> i64 {
        self.last_seen_ms.load(Ordering::Relaxed)
    }

    /// `0` means "not currently attached to a quiz".
    pub fn set_current_quiz(&self, quiz_id: i64) {
        self.current_quiz.store(quiz_id, Ordering::Relaxed);
    }

    pub fn current_quiz(&self) -> Option<i64> {
        match self.current_quiz.load(Ordering::Relaxed) {
            0 => None,
            id => Some(id),
        }
    }

    /// Best-effort enqueue. Returns `false` if the outbound queue was full
    /// (caller should treat this client as slow and request a close) or the
    /// receiver is already gone.
    pub fn try_send(&self, msg: ServerMessage) -> bool {
        self.outbound.try_send(msg).is_ok()
    }

    pub fn request_close(&self, code: u16, reason: &'static str) {
        let _ = self.control.send(CloseSignal { code, reason });
    }
}
