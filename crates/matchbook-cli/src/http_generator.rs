use std::time::Duration;

use matchbook_core::generation::{ExplanationGenerator, GenerationError, GenerationResult};
use serde::Deserialize;
use serde_json::json;

use crate::config::GeneratorConfig;

const BACKEND_NAME: &str = "chat-completions";
const SYSTEM_PROMPT: &str = "You write short, friendly, concrete explanations of why a person and a project are a good match. Never invent facts that are not in the profiles.";

/// Blocking client for an OpenAI-compatible chat completions endpoint.
pub struct HttpExplanationGenerator {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key_env: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

impl HttpExplanationGenerator {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|value| !value.trim().is_empty());
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build();

        Self {
            agent,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn error(&self, message: impl Into<String>) -> GenerationError {
        GenerationError::new(BACKEND_NAME, message)
    }
}

impl ExplanationGenerator for HttpExplanationGenerator {
    fn backend_name(&self) -> &str {
        BACKEND_NAME
    }

    fn generate(&self, prompt: &str) -> GenerationResult<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            self.error(format!(
                "environment variable '{}' is not set",
                self.api_key_env
            ))
        })?;

        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {api_key}"))
            .send_json(body)
            .map_err(|error| match error {
                ureq::Error::Status(status, _) => {
                    self.error(format!("endpoint returned HTTP {status}"))
                }
                other => self.error(format!("transport failure: {other}")),
            })?;

        let payload: ChatCompletionResponse = response
            .into_json()
            .map_err(|error| self.error(format!("malformed response body: {error}")))?;

        first_message_text(payload).ok_or_else(|| self.error("response contained no message text"))
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

fn first_message_text(response: ChatCompletionResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .filter_map(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .find(|content| !content.is_empty())
}
