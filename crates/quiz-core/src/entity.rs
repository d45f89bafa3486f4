use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a scheduled quiz event. Transitions:
/// `scheduled -> in_progress -> completed`, or any non-terminal -> `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuizStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl QuizStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Whether a quiz draws only from its own authored questions, or also from
/// the shared pool (questions with `quiz_id = NULL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuestionSourceMode {
    Hybrid,
    AdminOnly,
}

/// Identity of a scheduled live-play event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub scheduled_time: DateTime<Utc>,
    pub prize_fund: i64,
    pub status: QuizStatus,
    pub question_count: i32,
    pub actual_question_count: Option<i32>,
    pub finish_on_zero_players: bool,
    pub question_source_mode: QuestionSourceMode,
}

/// One selectable option within a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: i32,
    pub text: String,
}

/// Unit of play. `quiz_id = None` marks a pool question eligible for any
/// quiz under hybrid source mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub quiz_id: Option<i64>,
    pub text: String,
    pub text_alt: Option<String>,
    pub options: Vec<QuestionOption>,
    pub correct_option: i32,
    pub time_limit_sec: i32,
    pub point_value: i32,
    pub difficulty: i32,
    pub is_used: bool,
}

impl Question {
    /// `true` if `option_id` names one of this question's options.
    pub fn has_option(&self, option_id: i32) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }
}

/// A single entry in the question sequence actually asked for a quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestionHistoryEntry {
    pub quiz_id: i64,
    pub question_order: i32,
    pub question_id: i64,
    pub asked_at: DateTime<Utc>,
}

/// Why a participant's play ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EliminationReason {
    IncorrectAnswer,
    TimeExceeded,
    NoAnswerTimeout,
}

impl EliminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IncorrectAnswer => "incorrect_answer",
            Self::TimeExceeded => "time_exceeded",
            Self::NoAnswerTimeout => "no_answer_timeout",
        }
    }
}

/// Durable evidence of a single play for one user on one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAnswer {
    pub user_id: i64,
    pub quiz_id: i64,
    pub question_id: i64,
    pub question_order: i32,
    pub selected_option: Option<i32>,
    pub is_correct: bool,
    pub response_time_ms: i64,
    pub score: i32,
    pub is_eliminated: bool,
    pub elimination_reason: Option<EliminationReason>,
    pub created_at: DateTime<Utc>,
}

/// Per-user summary of a completed quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResult {
    pub user_id: i64,
    pub quiz_id: i64,
    pub score: i32,
    pub correct_answers: i32,
    pub total_questions: i32,
    pub rank: i32,
    pub is_winner: bool,
    pub prize_fund: i64,
    pub is_eliminated: bool,
    pub eliminated_on_question: Option<i32>,
    pub elimination_reason: Option<EliminationReason>,
    pub completed_at: DateTime<Utc>,
}

/// An ad slot configured to play after a given question order (§3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdSlot {
    pub quiz_id: i64,
    pub after_question_order: i32,
    pub asset_id: String,
    pub duration_sec: u32,
}
