use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use quiz_answer::{process_answer, ActiveQuestionView, AdmissionPolicy};
use quiz_cache::{keys, Cache};
use quiz_core::config::{AnswerConfig, PrizeConfig, SelectorConfig};
use quiz_core::entity::QuizStatus;
use quiz_core::Clock;
use quiz_hub::{ClientMessage, Hub, ServerMessage};
use quiz_scheduler::StartTrigger;
use quiz_store::Store;

use crate::command::OrchestratorCommand;
use crate::run::{run_quiz, RunHandle};
use crate::state::ActiveQuizState;

/// Routes inbound client messages to running quizzes and fields admin
/// cancel requests. Implements [`StartTrigger`] so `quiz-scheduler` can
/// spawn a quiz's `run_quiz` task without depending on this crate (§9.1:
/// `compute::scheduler::Scheduler` being generic over the task it plugs
/// in).
pub struct OrchestratorRegistry {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    hub: Arc<Hub>,
    clock: Arc<dyn Clock>,
    question_grace_ms: i64,
    deterministic_seed: bool,
    admission_policy: AdmissionPolicy,
    retain_remainder: bool,
    active: Arc<RwLock<HashMap<i64, ActiveQuizState>>>,
    controls: Arc<RwLock<HashMap<i64, mpsc::Sender<OrchestratorCommand>>>>,
}

impl OrchestratorRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        hub: Arc<Hub>,
        clock: Arc<dyn Clock>,
        selector: &SelectorConfig,
        answer: &AnswerConfig,
        prize: &PrizeConfig,
        question_grace_ms: i64,
    ) -> Self {
        Self {
            store,
            cache,
            hub,
            clock,
            question_grace_ms,
            deterministic_seed: selector.deterministic_per_quiz,
            admission_policy: AdmissionPolicy::from_strict_flag(answer.strict_admission),
            retain_remainder: prize.retain_remainder,
            active: Arc::new(RwLock::new(HashMap::new())),
            controls: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Drains the hub's shared inbound channel for as long as it stays
    /// open, dispatching each message by type. One task services every
    /// live quiz; `run_quiz` tasks never read client messages themselves.
    pub async fn run(&self, mut inbound: mpsc::Receiver<(i64, ClientMessage)>) {
        while let Some((user_id, msg)) = inbound.recv().await {
            match msg {
                ClientMessage::Ready { quiz_id } => self.handle_ready(quiz_id, user_id).await,
                ClientMessage::Resync { quiz_id } => self.handle_resync(quiz_id, user_id).await,
                ClientMessage::Answer { question_id, selected_option, .. } => {
                    self.handle_answer(user_id, question_id, selected_option).await
                }
                ClientMessage::Heartbeat {} => {}
            }
        }
    }

    async fn handle_ready(&self, quiz_id: i64, user_id: i64) {
        let user_id_str = user_id.to_string();
        if let Err(e) = self.cache.set_add(&keys::participants(quiz_id), &user_id_str).await {
            warn!(quiz_id, user_id, error = %e, "failed to record ready");
            return;
        }
        self.hub.subscribe_quiz(quiz_id, user_id).await;
        self.hub.broadcast_to_quiz(quiz_id, ServerMessage::QuizUserReady { user_id }).await;
        let count = self.hub.player_count(quiz_id).await;
        self.hub.broadcast_to_quiz(quiz_id, ServerMessage::QuizPlayerCount { count }).await;
    }

    /// §4.8 "Resync": replies with `quiz:state`, never mutates anything.
    async fn handle_resync(&self, quiz_id: i64, user_id: i64) {
        let snapshot = self.active.read().await.get(&quiz_id).cloned();

        let (current_question_id, seconds_remaining) = match &snapshot {
            Some(state) if state.status == QuizStatus::InProgress => match &state.current_question {
                Some(q) => {
                    let elapsed_ms = (self.clock.now() - q.opened_at).num_milliseconds().max(0);
                    let window_ms = q.question.time_limit_sec as i64 * 1000 + self.question_grace_ms.max(0);
                    let remaining = ((window_ms - elapsed_ms).max(0)) / 1000;
                    (Some(q.question.id), Some(remaining))
                }
                None => (None, None),
            },
            _ => (None, None),
        };

        let is_eliminated = self
            .cache
            .get_flag(&keys::eliminated(quiz_id, user_id))
            .await
            .unwrap_or(false);

        // The cache holds only flags and set membership, not a running
        // total; score is recomputed from the durable answer rows, which
        // is cheap since resync is a rare, user-triggered path.
        let score = match self.store.answers_for_quiz(quiz_id).await {
            Ok(answers) => answers.iter().filter(|a| a.user_id == user_id).map(|a| a.score).sum(),
            Err(e) => {
                warn!(quiz_id, user_id, error = %e, "failed to recompute score for resync");
                0
            }
        };

        let _ = self
            .hub
            .send_to_user(
                user_id,
                ServerMessage::QuizState {
                    quiz_id,
                    current_question_id,
                    seconds_remaining,
                    score,
                    is_eliminated,
                },
            )
            .await;
    }

    /// Bare `user:answer` carries no quiz id; it's recovered from the
    /// connection's last `Ready`/`Resync` via [`Hub::current_quiz_of`].
    async fn handle_answer(&self, user_id: i64, question_id: i64, selected_option: i32) {
        let Some(quiz_id) = self.hub.current_quiz_of(user_id).await else {
            debug!(user_id, "dropping answer from a client with no active quiz association");
            return;
        };

        let view = {
            let active = self.active.read().await;
            match active.get(&quiz_id) {
                Some(state) if state.status == QuizStatus::InProgress => match &state.current_question {
                    Some(q) => ActiveQuestionView {
                        quiz_id,
                        quiz_status: state.status,
                        question: q.question.clone(),
                        question_order: q.question_order,
                        opened_at: q.opened_at,
                    },
                    None => return,
                },
                _ => return,
            }
        };

        let received_at = self.clock.now();
        match process_answer(
            self.store.as_ref(),
            self.cache.as_ref(),
            &view,
            self.admission_policy,
            user_id,
            question_id,
            selected_option,
            received_at,
        )
        .await
        {
            Ok(outcome) => {
                let _ = self
                    .hub
                    .send_to_user(
                        user_id,
                        ServerMessage::QuizAnswerResult {
                            question_id,
                            is_correct: outcome.verdict.is_correct,
                            score: outcome.verdict.score,
                            is_eliminated: outcome.verdict.is_eliminated,
                        },
                    )
                    .await;
                if outcome.verdict.is_eliminated {
                    let reason = outcome
                        .verdict
                        .elimination_reason
                        .map(|r| r.as_str().to_string())
                        .unwrap_or_default();
                    let _ = self.hub.send_to_user(user_id, ServerMessage::QuizElimination { reason }).await;
                }
            }
            Err(e) => {
                // Personal rejection per §7: logged, never broadcast, never
                // rolls back any prior persisted state.
                debug!(quiz_id, user_id, question_id, error = %e, "answer rejected");
            }
        }
    }

    /// Signals a running quiz's task to cancel. Returns `false` if the
    /// quiz isn't currently active (already finished, or never started).
    pub async fn cancel_active(&self, quiz_id: i64) -> bool {
        let tx = self.controls.read().await.get(&quiz_id).cloned();
        match tx {
            Some(tx) => tx.send(OrchestratorCommand::Cancel).await.is_ok(),
            None => false,
        }
    }

    pub async fn is_active(&self, quiz_id: i64) -> bool {
        self.active.read().await.contains_key(&quiz_id)
    }

    pub async fn active_quiz_ids(&self) -> HashSet<i64> {
        self.active.read().await.keys().copied().collect()
    }
}

#[async_trait]
impl StartTrigger for OrchestratorRegistry {
    async fn start_due(&self, quiz_id: i64) {
        if self.active.read().await.contains_key(&quiz_id) {
            warn!(quiz_id, "start_due received for an already-active quiz, ignoring");
            return;
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        self.controls.write().await.insert(quiz_id, cmd_tx);
        self.active.write().await.insert(quiz_id, ActiveQuizState::new(quiz_id));

        let run_handle = RunHandle {
            store: self.store.clone(),
            cache: self.cache.clone(),
            hub: self.hub.clone(),
            clock: self.clock.clone(),
            active: self.active.clone(),
            controls: self.controls.clone(),
            question_grace_ms: self.question_grace_ms,
            deterministic_seed: self.deterministic_seed,
            admission_policy: self.admission_policy,
            retain_remainder: self.retain_remainder,
        };

        tokio::spawn(run_quiz(quiz_id, run_handle, cmd_rx));
    }
}
