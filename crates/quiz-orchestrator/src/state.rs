use chrono::{DateTime, Utc};

use quiz_core::entity::{Question, QuizStatus};

/// The question currently open for answers, as seen by the rest of the
/// registry (resync replies, answer routing).
#[derive(Debug, Clone)]
pub struct ActiveQuestion {
    pub question: Question,
    pub question_order: i32,
    pub opened_at: DateTime<Utc>,
}

/// In-memory runtime for one live quiz (§3, "ActiveQuizState"). Owned
/// exclusively by the quiz's `run_quiz` task; the registry only ever reads
/// a snapshot of it through the shared map, never mutates it from outside.
/// Never persisted — rebuilt from nothing each time a quiz starts.
#[derive(Debug, Clone)]
pub struct ActiveQuizState {
    pub quiz_id: i64,
    pub status: QuizStatus,
    pub current_question: Option<ActiveQuestion>,
}

impl ActiveQuizState {
    pub fn new(quiz_id: i64) -> Self {
        Self {
            quiz_id,
            status: QuizStatus::Scheduled,
            current_question: None,
        }
    }
}
