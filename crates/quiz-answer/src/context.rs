use chrono::{DateTime, Utc};

use quiz_core::entity::{Question, QuizStatus};

/// Admission policy for participants not already in the frozen set
/// (§4.6; fixed per deployment via `quiz_core::config::AnswerConfig`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// Reject with `NotAParticipant`.
    Strict,
    /// Admit on first valid submission.
    AutoAdmitOnFirstAnswer,
}

impl AdmissionPolicy {
    pub fn from_strict_flag(strict: bool) -> Self {
        if strict {
            Self::Strict
        } else {
            Self::AutoAdmitOnFirstAnswer
        }
    }
}

/// The orchestrator's view of the currently-open question, as needed by the
/// answer pipeline. Supplied fresh by the caller for every submission —
/// the pipeline itself holds no quiz state.
#[derive(Debug, Clone)]
pub struct ActiveQuestionView {
    pub quiz_id: i64,
    pub quiz_status: QuizStatus,
    pub question: Question,
    pub question_order: i32,
    pub opened_at: DateTime<Utc>,
}
