#[cfg(test)]
mod tests;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{EmbeddingBackend, EmbeddingError};
use crate::config::EmbeddingConfig;
use crate::Result;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Ollama `/api/embed` client. Retry policy lives in the pipeline, so every
/// failure here is classified once and returned immediately.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    base_url: Url,
    model: String,
    batch_size: usize,
    dimension: usize,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config.base_url()?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            batch_size: config.batch_size as usize,
            dimension: config.dimension,
            agent,
        })
    }

    /// Point the client at a different server, used by tests.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    fn post_json(&self, body: &str) -> std::result::Result<String, EmbeddingError> {
        let url = self
            .base_url
            .join("/api/embed")
            .map_err(|e| EmbeddingError::Backend(format!("invalid embed URL: {e}")))?;

        self.agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(classify_transport_error)
    }

    fn check_dimension(&self, vector: &[f32]) -> std::result::Result<(), EmbeddingError> {
        if vector.len() != self.dimension {
            return Err(EmbeddingError::Backend(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(())
    }

    fn embed_single_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = BatchEmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| EmbeddingError::Backend(format!("failed to serialize request: {e}")))?;

        let response_text = self.post_json(&body)?;
        let response: BatchEmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| EmbeddingError::Backend(format!("failed to parse response: {e}")))?;

        if response.embeddings.len() != texts.len() {
            return Err(EmbeddingError::Backend(format!(
                "requested {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }
        for vector in &response.embeddings {
            self.check_dimension(vector)?;
        }

        Ok(response.embeddings)
    }
}

impl EmbeddingBackend for OllamaEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        debug!("embedding one text ({} bytes)", text.len());

        let request = EmbedRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| EmbeddingError::Backend(format!("failed to serialize request: {e}")))?;

        let response_text = self.post_json(&body)?;
        let response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| EmbeddingError::Backend(format!("failed to parse response: {e}")))?;

        self.check_dimension(&response.embedding)?;
        Ok(response.embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("embedding {} texts", texts.len());

        let mut vectors = Vec::with_capacity(texts.len());
        for window in texts.chunks(self.batch_size.max(1)) {
            vectors.extend(self.embed_single_batch(window)?);
        }

        Ok(vectors)
    }
}

/// Map HTTP outcomes onto the retry classification: 429 means slow down,
/// 5xx and transport faults mean try again later, everything else is fatal.
fn classify_transport_error(error: ureq::Error) -> EmbeddingError {
    match error {
        ureq::Error::StatusCode(429) => {
            EmbeddingError::QuotaExceeded("HTTP 429 from embedding backend".to_string())
        }
        ureq::Error::StatusCode(status) if status >= 500 => {
            EmbeddingError::Unavailable(format!("HTTP {status} from embedding backend"))
        }
        ureq::Error::StatusCode(status) => {
            EmbeddingError::Backend(format!("HTTP {status} from embedding backend"))
        }
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => EmbeddingError::Unavailable(error.to_string()),
        other => EmbeddingError::Backend(other.to_string()),
    }
}
