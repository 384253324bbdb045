use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use matchbook_core::orchestration::{DEFAULT_FALLBACK_TEXT, ExplanationCacheConfig};
use serde::Deserialize;

use crate::error::{CliError, CliResult};

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct MatchbookConfig {
    pub database_path: PathBuf,
    pub fallback_text: String,
    pub generator: GeneratorConfig,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// OpenAI-compatible chat completions URL.
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for MatchbookConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("matchbook.sqlite3"),
            fallback_text: DEFAULT_FALLBACK_TEXT.to_string(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
            max_tokens: 200,
            temperature: 0.7,
        }
    }
}

impl MatchbookConfig {
    /// Reads `path` when given, otherwise returns defaults.
    pub fn load(path: Option<&Path>) -> CliResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| CliError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn cache_config(&self) -> ExplanationCacheConfig {
        ExplanationCacheConfig {
            generator_timeout: Duration::from_secs(self.generator.timeout_secs),
            fallback_text: self.fallback_text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let config = MatchbookConfig::parse(
            r#"{ "database_path": "/var/lib/matchbook/cache.db", "generator": { "model": "local-llm" } }"#,
        )
        .unwrap();

        assert_eq!(
            config.database_path,
            PathBuf::from("/var/lib/matchbook/cache.db")
        );
        assert_eq!(config.generator.model, "local-llm");
        assert_eq!(config.generator.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.fallback_text, DEFAULT_FALLBACK_TEXT);
    }

    #[test]
    fn cache_config_carries_timeout_and_fallback() {
        let mut config = MatchbookConfig::default();
        config.generator.timeout_secs = 5;
        config.fallback_text = "Generic reason.".to_string();

        let cache_config = config.cache_config();
        assert_eq!(cache_config.generator_timeout, Duration::from_secs(5));
        assert_eq!(cache_config.fallback_text, "Generic reason.");
        cache_config.validate().unwrap();
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(MatchbookConfig::parse("{ not json").is_err());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let path = std::env::temp_dir().join("matchbook-config-that-does-not-exist.json");
        let error = MatchbookConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(error, CliError::Read { .. }));
    }
}
