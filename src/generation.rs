//! Generative model client.
//!
//! The model is a remote black box behind [`GenerativeModel`]; the HTTP
//! implementation speaks the OpenAI-compatible chat-completions API. No
//! automatic retry here — the engine surfaces generation failures to the
//! caller rather than degrading to a canned answer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::{GenerationConfig, RagConfig};
use crate::core::errors::RagError;

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, RagError>;
}

pub struct HttpGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f64,
    max_tokens: u32,
}

impl HttpGenerator {
    pub fn new(generation: &GenerationConfig, rag: &RagConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(rag.generation_timeout_secs))
            .build()
            .map_err(RagError::internal)?;

        Ok(Self {
            client,
            base_url: generation.base_url.trim_end_matches('/').to_string(),
            model: generation.model.clone(),
            api_key: std::env::var(&generation.api_key_env).ok(),
            temperature: generation.temperature,
            max_tokens: generation.max_tokens,
        })
    }
}

#[async_trait]
impl GenerativeModel for HttpGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": false,
        });

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                RagError::Timeout(format!("generation request: {}", err))
            } else {
                RagError::Generation(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!("{}: {}", status, text)));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| RagError::Generation(format!("invalid response body: {}", e)))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| RagError::Generation("response has no message content".into()))?;

        Ok(content.to_string())
    }
}
