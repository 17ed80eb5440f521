//! Ollama HTTP client (`POST /api/generate`, non-streaming).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

use super::TextGenerator;
use crate::config::GenerationConfig;
use crate::error::GenerationError;

pub struct OllamaGenerator {
    client: reqwest::Client,
    handle: Handle,
    endpoint: String,
    model: String,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig, handle: Handle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            handle,
            endpoint: format!("{}/api/generate", config.url.trim_end_matches('/')),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    async fn generate_async(&self, prompt: &str, context: Option<&str>) -> Result<String, GenerationError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system: context,
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.timeout_secs)
            } else {
                GenerationError::Malformed(e.to_string())
            }
        })?;
        Ok(parsed.response)
    }

    fn classify(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout(self.timeout_secs)
        } else {
            GenerationError::Unreachable {
                url: self.endpoint.clone(),
                source: e,
            }
        }
    }
}

impl TextGenerator for OllamaGenerator {
    /// Blocks the calling thread on the runtime handle. Call from
    /// `spawn_blocking` or a plain thread, never from an async task.
    fn generate(&self, prompt: &str, context: Option<&str>) -> Result<String, GenerationError> {
        debug!(model = %self.model, prompt_chars = prompt.len(), "requesting generation");
        self.handle.block_on(self.generate_async(prompt, context))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_normalized() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let config = GenerationConfig {
            url: "http://localhost:11434/".into(),
            ..Default::default()
        };
        let generator = OllamaGenerator::new(&config, rt.handle().clone()).unwrap();
        assert_eq!(generator.endpoint, "http://localhost:11434/api/generate");
        assert_eq!(generator.model(), "llama3.1:8b");
    }

    #[test]
    fn unreachable_server_is_a_generation_error() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let config = GenerationConfig {
            // Port 9 (discard) is not an HTTP server on test machines.
            url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..Default::default()
        };
        let generator = OllamaGenerator::new(&config, rt.handle().clone()).unwrap();
        let err = generator.generate("hello", None).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Unreachable { .. } | GenerationError::Timeout(_)
        ));
    }

    #[test]
    fn request_omits_missing_system_prompt() {
        let req = GenerateRequest {
            model: "m",
            prompt: "p",
            system: None,
            stream: false,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["stream"], false);
    }
}
