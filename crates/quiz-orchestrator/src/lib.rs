pub mod command;
pub mod error;
pub mod registry;
pub mod run;
pub mod state;

pub use command::OrchestratorCommand;
pub use error::OrchestratorError;
pub use registry::OrchestratorRegistry;
pub use run::{run_quiz, RunHandle};
pub use state::{ActiveQuestion, ActiveQuizState};
