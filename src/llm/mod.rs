#[cfg(test)]
mod tests;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::GenerationConfig;
use crate::{BriefcastError, Result};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation backend unavailable: {0}")]
    Unavailable(String),
    #[error("generation backend rate limited: {0}")]
    QuotaExceeded(String),
    #[error("generation backend error: {0}")]
    Backend(String),
}

impl From<GenerationError> for BriefcastError {
    fn from(e: GenerationError) -> Self {
        BriefcastError::Generation(e.to_string())
    }
}

/// Prompt-in, text-out backend for script generation.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError>;
}

/// OpenAI-compatible chat completions client. The key is pulled from the
/// environment variable named in the config, never from the config file.
#[derive(Debug, Clone)]
pub struct OpenAiChatGenerator {
    base_url: Url,
    model: String,
    api_key: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl OpenAiChatGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| BriefcastError::Config(format!("invalid generation base URL: {e}")))?;

        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            BriefcastError::Config(format!(
                "generation API key not found in environment variable {}",
                config.api_key_env
            ))
        })?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            api_key,
            agent,
        })
    }

    fn completions_url(&self) -> std::result::Result<Url, GenerationError> {
        // Url::join would drop a path segment like "/v1" without a trailing
        // slash, so build the path by hand.
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/chat/completions"))
            .map_err(|e| GenerationError::Backend(format!("invalid completions URL: {e}")))
    }
}

impl TextGenerator for OpenAiChatGenerator {
    fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        debug!("requesting completion ({} byte prompt)", prompt.len());

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| GenerationError::Backend(format!("failed to serialize request: {e}")))?;

        let url = self.completions_url()?;
        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .send(&body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(classify_transport_error)?;

        let response: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| GenerationError::Backend(format!("failed to parse response: {e}")))?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Backend("response contained no choices".to_string()))
    }
}

fn classify_transport_error(error: ureq::Error) -> GenerationError {
    match error {
        ureq::Error::StatusCode(429) => {
            GenerationError::QuotaExceeded("HTTP 429 from generation backend".to_string())
        }
        ureq::Error::StatusCode(status) if status >= 500 => {
            GenerationError::Unavailable(format!("HTTP {status} from generation backend"))
        }
        ureq::Error::StatusCode(status) => {
            GenerationError::Backend(format!("HTTP {status} from generation backend"))
        }
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => GenerationError::Unavailable(error.to_string()),
        other => GenerationError::Backend(other.to_string()),
    }
}
