use thiserror::Error;

use quiz_cache::CacheError;
use quiz_selector::SelectorError;
use quiz_store::StoreError;

/// Failures that can end a `run_quiz` task early. Every variant here
/// resolves the same way from the caller's perspective (§7, "fatal
/// orchestrator errors"): the quiz transitions to `cancelled` and a cancel
/// event is broadcast; none of these propagate further up.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("quiz {0} not found")]
    QuizNotFound(i64),

    /// Not really a failure — an admin cancel arrived on the command
    /// channel. Routed through the error path so a single early-return
    /// point handles teardown for both cancellation and genuine faults.
    #[error("quiz cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Selector(#[from] SelectorError),
}
