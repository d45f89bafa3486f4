use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("quiz {0} not found")]
    QuizNotFound(i64),

    #[error("quiz {0} is not in status 'scheduled'")]
    QuizNotScheduled(i64),

    #[error("another quiz is already in progress")]
    AnotherQuizInProgress,

    #[error("question {0} not found")]
    QuestionNotFound(i64),

    #[error("duplicate answer for user {user_id} on question {question_id}")]
    DuplicateAnswer { user_id: i64, question_id: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("timeout after {0}ms")]
    Timeout(u64),
}
