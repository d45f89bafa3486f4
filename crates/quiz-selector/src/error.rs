use thiserror::Error;

use quiz_store::StoreError;

#[derive(Error, Debug)]
pub enum SelectorError {
    #[error("no question available for quiz {0}")]
    NoQuestionAvailable(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}
