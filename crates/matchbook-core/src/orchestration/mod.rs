pub mod explanation_cache;

pub use explanation_cache::ExplanationCache;

use std::time::Duration;

use crate::models::{CoreError, CoreErrorKind};

pub type OrchestrationResult<T> = Result<T, CoreError>;

pub const DEFAULT_GENERATOR_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_FALLBACK_TEXT: &str =
    "This project looks relevant to your skills and interests.";

/// Explicit settings handed to `ExplanationCache::new`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExplanationCacheConfig {
    /// Upper bound on a single generator call.
    pub generator_timeout: Duration,
    /// Text served by `get_explanation_or_fallback` when generation fails.
    pub fallback_text: String,
}

impl Default for ExplanationCacheConfig {
    fn default() -> Self {
        Self {
            generator_timeout: DEFAULT_GENERATOR_TIMEOUT,
            fallback_text: DEFAULT_FALLBACK_TEXT.to_string(),
        }
    }
}

impl ExplanationCacheConfig {
    pub fn validate(&self) -> OrchestrationResult<()> {
        if self.generator_timeout.is_zero() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "generator timeout must be greater than zero",
            ));
        }
        if self.fallback_text.trim().is_empty() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "fallback text must not be blank",
            ));
        }
        Ok(())
    }
}
