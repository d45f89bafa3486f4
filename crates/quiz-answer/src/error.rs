use thiserror::Error;

use quiz_cache::CacheError;
use quiz_store::StoreError;

/// Rejection or failure from `process_answer` (§4.6). Variants that are
/// silent drops on the wire (`StaleAnswer`, `NotAParticipant`,
/// `AlreadyEliminated`) and ones that still persist a record
/// (`InvalidOption` scores as incorrect) are distinguished so the caller
/// knows whether anything durable happened.
#[derive(Error, Debug)]
pub enum AnswerError {
    #[error("answer for question {submitted} does not match the active question {active}")]
    StaleAnswer { active: i64, submitted: i64 },

    #[error("user {0} is not a participant in this quiz")]
    NotAParticipant(i64),

    #[error("user {0} is already eliminated")]
    AlreadyEliminated(i64),

    #[error("duplicate answer from user {user_id} on question {question_id}")]
    DuplicateAnswer { user_id: i64, question_id: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}
