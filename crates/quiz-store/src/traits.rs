use async_trait::async_trait;

use quiz_core::entity::{
    AdSlot, Question, QuestionSourceMode, Quiz, QuizQuestionHistoryEntry, QuizResult, UserAnswer,
};

use crate::error::StoreError;

/// Durable quizzes, questions, answers, results, history (§3, §6.3).
///
/// Every multi-row mutation documented here runs in one transaction at the
/// implementation level (§5, "Store ... multi-row operations ... are one
/// transaction"); the trait only promises the outcome, not the mechanism,
/// so a test double can satisfy it without a real transaction manager.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // ── Quiz lifecycle ──────────────────────────────────────────

    async fn get_quiz(&self, quiz_id: i64) -> Result<Option<Quiz>, StoreError>;

    /// §4.1 Uniqueness Guard: atomically transitions `scheduled -> in_progress`.
    /// Fails with `AnotherQuizInProgress` if a different row already holds
    /// `in_progress`, or `QuizNotScheduled` if this row isn't `scheduled`.
    async fn atomic_start(&self, quiz_id: i64) -> Result<(), StoreError>;

    /// Flips status to `cancelled` and records `reason`. Valid from any
    /// non-terminal status.
    async fn cancel_quiz(&self, quiz_id: i64, reason: &str) -> Result<(), StoreError>;

    /// Status-only update to `completed`. Must never touch
    /// `actual_question_count` or any other column (§4.3, §4.7).
    async fn complete_quiz(&self, quiz_id: i64) -> Result<(), StoreError>;

    /// Targeted column update — the number of questions actually asked.
    async fn set_actual_question_count(&self, quiz_id: i64, count: i32) -> Result<(), StoreError>;

    /// Count of questions available to `quiz_id` under `mode` at any
    /// difficulty — used by the Scheduler to validate a requested
    /// `question_count` before arming timers (§4.2).
    async fn available_question_count(
        &self,
        quiz_id: i64,
        mode: QuestionSourceMode,
    ) -> Result<i64, StoreError>;

    // ── Question selection (§4.4) ───────────────────────────────

    async fn own_unused_questions(&self, quiz_id: i64, difficulty: i32) -> Result<Vec<Question>, StoreError>;

    async fn pool_unused_questions(&self, difficulty: i32) -> Result<Vec<Question>, StoreError>;

    /// Atomically marks `question_id` used (for pool consumption) and
    /// appends `(quiz_id, question_order, question_id)` to the history.
    /// Must happen before `quiz:question` is broadcast (§9, design notes).
    async fn pick_and_record_question(
        &self,
        quiz_id: i64,
        question_id: i64,
        question_order: i32,
    ) -> Result<(), StoreError>;

    async fn history(&self, quiz_id: i64) -> Result<Vec<QuizQuestionHistoryEntry>, StoreError>;

    async fn history_len(&self, quiz_id: i64) -> Result<i32, StoreError>;

    // ── Answer pipeline (§4.6) ──────────────────────────────────

    /// Insert a `UserAnswer`. The unique `(user_id, quiz_id, question_id)`
    /// constraint turns a race into `StoreError::DuplicateAnswer`.
    async fn insert_user_answer(&self, answer: UserAnswer) -> Result<(), StoreError>;

    async fn get_user_answer(
        &self,
        user_id: i64,
        quiz_id: i64,
        question_id: i64,
    ) -> Result<Option<UserAnswer>, StoreError>;

    async fn answers_for_quiz(&self, quiz_id: i64) -> Result<Vec<UserAnswer>, StoreError>;

    // ── Results & prize (§4.7) ───────────────────────────────────

    /// Upserts all result rows for a quiz in one transaction.
    async fn upsert_results(&self, results: Vec<QuizResult>) -> Result<(), StoreError>;

    async fn results_for_quiz(&self, quiz_id: i64) -> Result<Vec<QuizResult>, StoreError>;

    // ── Ad breaks (§3.1) ─────────────────────────────────────────

    async fn ad_slot_after(&self, quiz_id: i64, after_question_order: i32) -> Result<Option<AdSlot>, StoreError>;
}
