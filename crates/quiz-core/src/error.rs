use thiserror::Error;

/// Shared error taxonomy for the live-play core.
///
/// Each crate also defines its own narrower error enum for the failures it
/// can itself produce (`quiz_store::StoreError`, `quiz_hub::HubError`, ...);
/// this one covers the cross-cutting cases referenced from more than one
/// crate (quiz lifecycle preconditions, the uniqueness guard, selection
/// exhaustion).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("quiz {0} is not in status 'scheduled'")]
    QuizNotScheduled(i64),

    #[error("another quiz is already in progress")]
    AnotherQuizInProgress,

    #[error("quiz {0} has insufficient questions for the requested count")]
    InsufficientQuestions(i64),

    #[error("scheduled_time must be at least {min_horizon_secs}s in the future")]
    ScheduleTooSoon { min_horizon_secs: i64 },

    #[error("no question available for quiz {0}")]
    NoQuestionAvailable(i64),

    #[error("quiz {0} not found")]
    QuizNotFound(i64),

    #[error("{0}")]
    Other(String),
}
