use thiserror::Error;

use quiz_store::StoreError;

/// Failures from `Schedule`/`Reschedule` (§4.2). Timer-driven failures that
/// happen later, at T0, never surface here — they resolve by transitioning
/// the quiz to `cancelled` instead, since by then nothing is waiting
/// synchronously on a result.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("quiz {0} not found")]
    QuizNotFound(i64),

    #[error("scheduled_time must be at least {min_horizon_secs}s in the future")]
    ScheduleTooSoon { min_horizon_secs: i64 },

    #[error("quiz {0} has insufficient questions for the requested count")]
    InsufficientQuestions(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}
