pub mod context;
pub mod error;
pub mod pipeline;

pub use context::{ActiveQuestionView, AdmissionPolicy};
pub use error::AnswerError;
pub use pipeline::{process_answer, AnswerOutcome};
