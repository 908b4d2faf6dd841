//! Embedding service client.
//!
//! The external service is consumed as a black box behind the [`Embedder`]
//! trait so the pipeline can be tested with a deterministic double. The
//! HTTP implementation normalizes the provider's response shape at the
//! boundary: exactly one canonical `Vec<Vec<f32>>` comes out, or the call
//! fails as an `EmbeddingService` error.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::{EmbeddingConfig, RagConfig};
use crate::core::errors::RagError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, order preserved.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Embed a single text (query path).
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            RagError::EmbeddingService("service returned no vector for input".into())
        })
    }
}

pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
    retry_base_ms: u64,
}

impl HttpEmbedder {
    pub fn new(embedding: &EmbeddingConfig, rag: &RagConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(rag.request_timeout_secs))
            .build()
            .map_err(RagError::internal)?;

        Ok(Self {
            client,
            base_url: embedding.base_url.trim_end_matches('/').to_string(),
            model: embedding.model.clone(),
            api_key: std::env::var(&embedding.api_key_env).ok(),
            max_retries: rag.max_retries,
            retry_base_ms: rag.retry_base_ms,
        })
    }

    async fn request(&self, texts: &[String]) -> Result<Value, RagError> {
        let url = format!(
            "{}/pipeline/feature-extraction/{}",
            self.base_url, self.model
        );

        let mut attempt = 0u32;
        loop {
            let mut builder = self.client.post(&url).json(&json!({ "inputs": texts }));
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }

            let outcome = match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<Value>().await.map_err(|e| {
                            RagError::EmbeddingService(format!("invalid response body: {}", e))
                        });
                    }
                    let retryable = status.is_server_error()
                        || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
                    let body = response.text().await.unwrap_or_default();
                    (
                        retryable,
                        RagError::EmbeddingService(format!("{}: {}", status, body)),
                    )
                }
                Err(err) if err.is_timeout() => (
                    true,
                    RagError::Timeout(format!("embedding request: {}", err)),
                ),
                Err(err) => (
                    err.is_connect(),
                    RagError::EmbeddingService(err.to_string()),
                ),
            };

            let (retryable, error) = outcome;
            if !retryable || attempt >= self.max_retries {
                return Err(error);
            }

            let backoff = self.retry_base_ms * 2u64.pow(attempt)
                + rand::rng().random_range(0..self.retry_base_ms.max(1));
            tracing::warn!(
                "embedding request failed (attempt {}/{}), retrying in {}ms: {}",
                attempt + 1,
                self.max_retries,
                backoff,
                error
            );
            tokio::time::sleep(Duration::from_millis(backoff)).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let payload = self.request(texts).await?;
        normalize_response(payload, texts.len())
    }
}

/// Coerce a provider response into one vector per input.
///
/// Providers return a flat vector for a single input and a nested array
/// for batches; both are accepted. Anything else — wrong arity, wrong
/// nesting, mixed vector lengths, non-numeric entries — is rejected.
pub fn normalize_response(payload: Value, expected: usize) -> Result<Vec<Vec<f32>>, RagError> {
    let outer = payload
        .as_array()
        .ok_or_else(|| RagError::EmbeddingService("response is not an array".into()))?;

    // Flat vector for a single input.
    if expected == 1 && outer.first().map(Value::is_number).unwrap_or(false) {
        return Ok(vec![parse_vector(outer)?]);
    }

    if outer.len() != expected {
        return Err(RagError::EmbeddingService(format!(
            "expected {} vectors, got {}",
            expected,
            outer.len()
        )));
    }

    let mut vectors = Vec::with_capacity(expected);
    let mut dimension = None;
    for entry in outer {
        let inner = entry
            .as_array()
            .ok_or_else(|| RagError::EmbeddingService("expected nested arrays".into()))?;
        let vector = parse_vector(inner)?;
        match dimension {
            None => dimension = Some(vector.len()),
            Some(d) if d != vector.len() => {
                return Err(RagError::EmbeddingService(format!(
                    "inconsistent vector lengths: {} vs {}",
                    d,
                    vector.len()
                )));
            }
            Some(_) => {}
        }
        vectors.push(vector);
    }
    Ok(vectors)
}

fn parse_vector(values: &[Value]) -> Result<Vec<f32>, RagError> {
    if values.is_empty() {
        return Err(RagError::EmbeddingService("empty vector in response".into()));
    }
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| RagError::EmbeddingService("non-numeric vector entry".into()))
        })
        .collect()
}
