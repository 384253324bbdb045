pub mod prompt;

pub use prompt::build_prompt;

use thiserror::Error;

/// Failure reported by a generator backend. Timeouts, quota exhaustion and
/// malformed responses all collapse into this one type.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{backend} generation failed: {message}")]
pub struct GenerationError {
    pub backend: String,
    pub message: String,
}

impl GenerationError {
    pub fn new(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

pub type GenerationResult<T> = Result<T, GenerationError>;

/// Text generation backend. Calls are blocking and may take seconds; the
/// orchestrator runs them off the async executor and bounds them with a timeout.
pub trait ExplanationGenerator: Send + Sync {
    fn backend_name(&self) -> &str;

    fn generate(&self, prompt: &str) -> GenerationResult<String>;
}
