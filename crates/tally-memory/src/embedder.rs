// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP embedding adapter for OpenAI-compatible `/embeddings` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tally_config::model::EmbeddingConfig;
use tally_core::{AdapterType, HealthStatus, PluginAdapter, TallyError, VectorEmbedder};
use tracing::debug;

/// Upper bound for the `/models` reachability check.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

fn unavailable(message: impl Into<String>, source: Option<reqwest::Error>) -> TallyError {
    TallyError::EmbeddingUnavailable {
        message: message.into(),
        source: source.map(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
    }
}

/// Embeds text by calling a remote embeddings endpoint. No retries.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    models_url: String,
    model: String,
    dimensions: usize,
}

impl HttpEmbedder {
    /// Build an embedder from config.
    ///
    /// API key resolution: `embedding.api_key`, then `OPENAI_API_KEY`. A
    /// missing key is allowed for local servers that do not check it.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, TallyError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = resolve_api_key(&config.api_key) {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                TallyError::Config(format!("invalid embedding API key header value: {e}"))
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| unavailable(format!("failed to build HTTP client: {e}"), Some(e)))?;

        let base_url = config.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            url: format!("{base_url}/embeddings"),
            models_url: format!("{base_url}/models"),
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }
}

fn resolve_api_key(config_key: &Option<String>) -> Option<String> {
    config_key
        .as_ref()
        .filter(|k| !k.is_empty())
        .cloned()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
}

#[async_trait]
impl PluginAdapter for HttpEmbedder {
    fn name(&self) -> &str {
        "http-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        let response = match self
            .client
            .get(&self.models_url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return Ok(HealthStatus::Unhealthy(format!(
                    "embedding endpoint unreachable: {e}"
                )));
            }
        };
        let status = response.status();
        Ok(match status.as_u16() {
            200..=299 => HealthStatus::Healthy,
            401 | 403 => HealthStatus::Unhealthy(format!(
                "embedding endpoint rejected the API key ({status})"
            )),
            _ => HealthStatus::Degraded(format!("embedding endpoint returned {status}")),
        })
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        Ok(())
    }
}

#[async_trait]
impl VectorEmbedder for HttpEmbedder {
    async fn vectorize(&self, text: &str) -> Result<Vec<f32>, TallyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&EmbeddingRequest {
                input: text,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| unavailable(format!("embedding request failed: {e}"), Some(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(
                format!("embedding API returned {status}: {body}"),
                None,
            ));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("invalid embedding response: {e}"), Some(e)))?;

        let Some(first) = parsed.data.into_iter().next() else {
            return Err(TallyError::EmptyResult);
        };
        if first.embedding.len() != self.dimensions {
            return Err(unavailable(
                format!(
                    "dimension mismatch: expected {}, got {}",
                    self.dimensions,
                    first.embedding.len()
                ),
                None,
            ));
        }
        debug!(dimensions = self.dimensions, "text vectorized");
        Ok(first.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
