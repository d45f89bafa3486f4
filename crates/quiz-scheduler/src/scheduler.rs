use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use quiz_core::config::SchedulerConfig;
use quiz_core::entity::Quiz;
use quiz_hub::{Hub, ServerMessage};
use quiz_store::Store;

use crate::error::SchedulerError;
use crate::trigger::StartTrigger;

struct QuizTimers {
    cancelled: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl QuizTimers {
    fn abort_all(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Lifecycle timers for announce/lobby/countdown/start, and cancellation
/// (§4.2). Owns no quiz business state beyond the due-time bookkeeping
/// needed to arm and tear down those four timers per quiz.
pub struct Scheduler {
    store: Arc<dyn Store>,
    hub: Arc<Hub>,
    config: SchedulerConfig,
    trigger: Arc<dyn StartTrigger>,
    timers: Mutex<HashMap<i64, QuizTimers>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        hub: Arc<Hub>,
        config: SchedulerConfig,
        trigger: Arc<dyn StartTrigger>,
    ) -> Self {
        Self {
            store,
            hub,
            config,
            trigger,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// `Schedule(quiz)` (§4.2): validates the horizon and question
    /// availability, then arms the four timers relative to
    /// `quiz.scheduled_time`.
    pub async fn schedule(&self, quiz: &Quiz) -> Result<(), SchedulerError> {
        let now = Utc::now();
        let horizon = quiz.scheduled_time - now;
        if horizon < chrono::Duration::seconds(self.config.min_schedule_horizon_secs) {
            return Err(SchedulerError::ScheduleTooSoon {
                min_horizon_secs: self.config.min_schedule_horizon_secs,
            });
        }

        let available = self
            .store
            .available_question_count(quiz.id, quiz.question_source_mode)
            .await?;
        if available < quiz.question_count as i64 {
            return Err(SchedulerError::InsufficientQuestions(quiz.id));
        }

        self.arm(quiz.id, now, quiz.scheduled_time).await;
        info!(quiz_id = quiz.id, scheduled_time = %quiz.scheduled_time, "quiz armed");
        Ok(())
    }

    /// `Cancel(quizID)` (§4.2): stops any pending timers, flips the quiz to
    /// `cancelled`, and broadcasts `quiz:cancelled` scoped to its
    /// subscribers.
    pub async fn cancel(&self, quiz_id: i64, reason: &str) -> Result<(), SchedulerError> {
        if let Some(mut timers) = self.timers.lock().await.remove(&quiz_id) {
            timers.abort_all();
        }
        self.store.cancel_quiz(quiz_id, reason).await?;
        self.hub
            .broadcast_to_quiz(
                quiz_id,
                ServerMessage::QuizCancelled {
                    reason: reason.to_string(),
                },
            )
            .await;
        info!(quiz_id, reason, "quiz cancelled");
        Ok(())
    }

    /// Reschedule is cancel + schedule (§4.2). `quiz` already carries the
    /// updated `scheduled_time`; the caller (the admin surface, out of
    /// scope here) is responsible for persisting that change beforehand.
    pub async fn reschedule(&self, old_quiz_id: i64, quiz: &Quiz) -> Result<(), SchedulerError> {
        self.cancel(old_quiz_id, "rescheduled").await?;
        self.schedule(quiz).await
    }

    pub async fn is_armed(&self, quiz_id: i64) -> bool {
        self.timers.lock().await.contains_key(&quiz_id)
    }

    async fn arm(&self, quiz_id: i64, now: DateTime<Utc>, t0: DateTime<Utc>) {
        let cancelled = Arc::new(AtomicBool::new(false));

        // Each deadline is converted to a tokio `Instant` exactly once, up
        // front, so the spawned tasks depend only on tokio's own clock (real
        // or paused under `#[tokio::test(start_paused = true)]`) and never
        // re-read `Utc::now()` while waiting.
        let now_instant = Instant::now();
        let to_instant = |at: DateTime<Utc>| -> Instant {
            let delta = (at - now).to_std().unwrap_or(StdDuration::ZERO);
            now_instant + delta
        };

        let t0_instant = to_instant(t0);
        let announce_instant = to_instant(t0 - chrono::Duration::seconds(self.config.announce_gap_secs));
        let lobby_instant = to_instant(t0 - chrono::Duration::seconds(self.config.lobby_gap_secs));
        let countdown_instant = to_instant(t0 - chrono::Duration::seconds(self.config.countdown_window_secs));

        let handles = vec![
            self.spawn_announce(quiz_id, announce_instant, cancelled.clone()),
            self.spawn_lobby_open(quiz_id, lobby_instant, cancelled.clone()),
            self.spawn_countdown(quiz_id, countdown_instant, t0_instant, cancelled.clone()),
            self.spawn_start(quiz_id, t0_instant, cancelled.clone()),
        ];

        let mut timers = self.timers.lock().await;
        if let Some(mut old) = timers.insert(quiz_id, QuizTimers { cancelled, handles }) {
            old.abort_all();
        }
    }

    fn spawn_announce(&self, quiz_id: i64, at: Instant, cancelled: Arc<AtomicBool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            debug!(quiz_id, "quiz entered announced phase");
        })
    }

    fn spawn_lobby_open(&self, quiz_id: i64, at: Instant, cancelled: Arc<AtomicBool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            debug!(quiz_id, "lobby open for user:ready");
        })
    }

    fn spawn_countdown(
        &self,
        quiz_id: i64,
        at: Instant,
        t0: Instant,
        cancelled: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let hub = self.hub.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            loop {
                if cancelled.load(Ordering::SeqCst) {
                    return;
                }
                let now = Instant::now();
                if now >= t0 {
                    return;
                }
                let remaining = (t0 - now).as_secs() as i64 + 1;
                hub.broadcast_to_quiz(quiz_id, ServerMessage::QuizCountdown { seconds_remaining: remaining })
                    .await;
                tokio::time::sleep(StdDuration::from_secs(1)).await;
            }
        })
    }

    fn spawn_start(&self, quiz_id: i64, at: Instant, cancelled: Arc<AtomicBool>) -> JoinHandle<()> {
        let trigger = self.trigger.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            if cancelled.load(Ordering::SeqCst) {
                warn!(quiz_id, "start trigger skipped, quiz was cancelled");
                return;
            }
            trigger.start_due(quiz_id).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quiz_core::entity::{QuestionSourceMode, QuizStatus};
    use quiz_core::config::HubConfig;
    use quiz_hub::InMemoryTicketStore;
    use quiz_store::MemoryStore;
    use std::sync::Mutex as StdMutex;

    fn hub_config() -> HubConfig {
        HubConfig {
            shard_count: 2,
            outbound_queue_depth: 8,
            heartbeat_interval_secs: 15,
            reap_after_secs: 38,
            hot_shard_load_fraction: 0.75,
            ticket_ttl_secs: 60,
            write_deadline_secs: 5,
            max_connections_per_shard: 64,
        }
    }

    fn scheduler_config() -> SchedulerConfig {
        SchedulerConfig {
            announce_gap_secs: 60,
            lobby_gap_secs: 30,
            countdown_window_secs: 5,
            min_schedule_horizon_secs: 10,
            question_grace_ms: 500,
        }
    }

    fn quiz(id: i64, scheduled_time: DateTime<Utc>, question_count: i32) -> Quiz {
        Quiz {
            id,
            title: "t".into(),
            description: String::new(),
            scheduled_time,
            prize_fund: 100,
            status: QuizStatus::Scheduled,
            question_count,
            actual_question_count: None,
            finish_on_zero_players: false,
            question_source_mode: QuestionSourceMode::Hybrid,
        }
    }

    #[derive(Default, Clone)]
    struct RecordingTrigger {
        calls: Arc<StdMutex<Vec<i64>>>,
    }

    impl RecordingTrigger {
        fn calls(&self) -> Vec<i64> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StartTrigger for RecordingTrigger {
        async fn start_due(&self, quiz_id: i64) {
            self.calls.lock().unwrap().push(quiz_id);
        }
    }

    fn question_for(quiz_id: i64) -> quiz_core::entity::Question {
        use quiz_core::entity::QuestionOption;
        quiz_core::entity::Question {
            id: quiz_id * 100,
            quiz_id: Some(quiz_id),
            text: "q".into(),
            text_alt: None,
            options: vec![
                QuestionOption { id: 1, text: "a".into() },
                QuestionOption { id: 2, text: "b".into() },
            ],
            correct_option: 1,
            time_limit_sec: 10,
            point_value: 10,
            difficulty: 1,
            is_used: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_fires_start_trigger_at_t0() {
        let store = Arc::new(MemoryStore::new());
        let quiz = quiz(1, Utc::now() + chrono::Duration::seconds(120), 1);
        store.insert_quiz(quiz.clone());
        store.insert_question(question_for(1));

        let hub = Arc::new(Hub::new(&hub_config(), Arc::new(InMemoryTicketStore::new())));
        let trigger = Arc::new(RecordingTrigger::default());
        let scheduler = Scheduler::new(store.clone(), hub.clone(), scheduler_config(), trigger.clone());

        scheduler.schedule(&quiz).await.unwrap();
        assert!(scheduler.is_armed(1).await);

        tokio::time::advance(StdDuration::from_secs(121)).await;
        tokio::task::yield_now().await;

        assert_eq!(trigger.calls(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_broadcasts_each_second_before_start() {
        let store = Arc::new(MemoryStore::new());
        let quiz = quiz(2, Utc::now() + chrono::Duration::seconds(8), 1);
        store.insert_quiz(quiz.clone());
        store.insert_question(question_for(2));

        let mut cfg = scheduler_config();
        cfg.min_schedule_horizon_secs = 1;
        cfg.countdown_window_secs = 5;

        let hub = Arc::new(Hub::new(&hub_config(), Arc::new(InMemoryTicketStore::new())));
        let (_handle, mut rx, _ctrl) = hub.register_client(7, "d".into(), 0).await;
        hub.subscribe_quiz(2, 7).await;

        let trigger = Arc::new(RecordingTrigger::default());
        let scheduler = Scheduler::new(store.clone(), hub.clone(), cfg, trigger.clone());
        scheduler.schedule(&quiz).await.unwrap();

        tokio::time::advance(StdDuration::from_secs(5)).await;
        tokio::task::yield_now().await;

        let msg = rx.try_recv().unwrap();
        assert!(matches!(msg, ServerMessage::QuizCountdown { .. }));
    }

    #[tokio::test]
    async fn schedule_rejects_horizon_too_soon() {
        let store = Arc::new(MemoryStore::new());
        let quiz = quiz(3, Utc::now() + chrono::Duration::seconds(1), 1);
        store.insert_quiz(quiz.clone());
        store.insert_question(question_for(3));

        let hub = Arc::new(Hub::new(&hub_config(), Arc::new(InMemoryTicketStore::new())));
        let trigger = Arc::new(RecordingTrigger::default());
        let scheduler = Scheduler::new(store, hub, scheduler_config(), trigger);

        let err = scheduler.schedule(&quiz).await.unwrap_err();
        assert!(matches!(err, SchedulerError::ScheduleTooSoon { .. }));
    }

    #[tokio::test]
    async fn schedule_rejects_insufficient_questions() {
        let store = Arc::new(MemoryStore::new());
        let quiz = quiz(4, Utc::now() + chrono::Duration::seconds(120), 3);
        store.insert_quiz(quiz.clone());
        store.insert_question(question_for(4));

        let hub = Arc::new(Hub::new(&hub_config(), Arc::new(InMemoryTicketStore::new())));
        let trigger = Arc::new(RecordingTrigger::default());
        let scheduler = Scheduler::new(store, hub, scheduler_config(), trigger);

        let err = scheduler.schedule(&quiz).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InsufficientQuestions(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_pending_start_from_firing() {
        let store = Arc::new(MemoryStore::new());
        let quiz = quiz(5, Utc::now() + chrono::Duration::seconds(120), 1);
        store.insert_quiz(quiz.clone());
        store.insert_question(question_for(5));

        let hub = Arc::new(Hub::new(&hub_config(), Arc::new(InMemoryTicketStore::new())));
        let (_handle, mut rx, _ctrl) = hub.register_client(9, "d".into(), 0).await;
        hub.subscribe_quiz(5, 9).await;

        let trigger = Arc::new(RecordingTrigger::default());
        let scheduler = Scheduler::new(store.clone(), hub.clone(), scheduler_config(), trigger.clone());
        scheduler.schedule(&quiz).await.unwrap();

        scheduler.cancel(5, "operator_cancelled").await.unwrap();
        assert!(!scheduler.is_armed(5).await);

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg, ServerMessage::QuizCancelled { reason: "operator_cancelled".into() });

        tokio::time::advance(StdDuration::from_secs(121)).await;
        tokio::task::yield_now().await;
        assert!(trigger.calls().is_empty());

        let stored = store.get_quiz(5).await.unwrap().unwrap();
        assert_eq!(stored.status, QuizStatus::Cancelled);
    }
}
