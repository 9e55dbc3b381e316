// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for OpenAI-compatible chat-completions endpoints.
//!
//! Handles authentication headers, the streaming request, and optional
//! retries of the initial request on transient status codes.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tally_core::{HealthStatus, TallyError};
use tracing::{debug, warn};

use crate::sse::{self, ChunkStream};
use crate::types::{ApiErrorResponse, ChatRequest};

/// Delay between retries of the initial request.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for the `/models` reachability check.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Chat-completions client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    url: String,
    models_url: String,
    max_retries: u32,
}

impl OpenAiClient {
    /// Creates a client for `base_url` (without `/chat/completions`).
    ///
    /// `max_retries` only covers failures before the stream starts; a
    /// stream that breaks midway is never replayed.
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, TallyError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                    TallyError::Config(format!("invalid API key header value: {e}"))
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| TallyError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        let base_url = base_url.trim_end_matches('/');
        Ok(Self {
            client,
            url: format!("{base_url}/chat/completions"),
            models_url: format!("{base_url}/models"),
            max_retries,
        })
    }

    /// Lists models once to see whether the endpoint answers and accepts
    /// the key. Never retried.
    pub async fn check_reachable(&self) -> HealthStatus {
        let response = match self
            .client
            .get(&self.models_url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return HealthStatus::Unhealthy(format!("model endpoint unreachable: {e}")),
        };
        let status = response.status();
        debug!(status = %status, "model health response received");
        match status.as_u16() {
            200..=299 => HealthStatus::Healthy,
            401 | 403 => HealthStatus::Unhealthy(format!(
                "model endpoint rejected the API key ({status})"
            )),
            _ => HealthStatus::Degraded(format!("model endpoint returned {status} for /models")),
        }
    }

    /// Sends a streaming request and returns the parsed chunk stream.
    pub async fn stream_chat(&self, request: &ChatRequest) -> Result<ChunkStream, TallyError> {
        let mut req = request.clone();
        req.stream = true;

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying chat request after transient error");
                tokio::time::sleep(RETRY_DELAY).await;
            }

            let response = self
                .client
                .post(&self.url)
                .json(&req)
                .send()
                .await
                .map_err(|e| TallyError::Provider {
                    message: format!("HTTP request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            debug!(status = %status, attempt, "chat response received");

            if status.is_success() {
                return Ok(sse::parse_sse_stream(response));
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, body = %body, "transient error, will retry");
                last_error = Some(TallyError::provider(format!("API returned {status}: {body}")));
                continue;
            }

            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api_err) => format!(
                    "model API error ({}): {}",
                    api_err.error.type_.as_deref().unwrap_or("unknown"),
                    api_err.error.message
                ),
                Err(_) => format!("API returned {status}: {body}"),
            };
            return Err(TallyError::provider(message));
        }

        Err(last_error
            .unwrap_or_else(|| TallyError::provider("chat request failed after retries")))
    }
}

/// Status codes worth retrying before the stream starts.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 529)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::ChunkEvent;
    use crate::types::{ChatMessage, ToolChoice};
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![ChatMessage::user("taxi 25")],
            temperature: 0.1,
            max_tokens: 128,
            stream: false,
            tools: Vec::new(),
            tool_choice: ToolChoice::function("book_expense"),
        }
    }

    fn sse_body(chunks: &[&str]) -> String {
        chunks.iter().map(|c| format!("data: {c}\n\n")).collect()
    }

    fn client(server: &MockServer, retries: u32) -> OpenAiClient {
        OpenAiClient::new(&server.uri(), Some("sk-test"), Duration::from_secs(5), retries).unwrap()
    }

    #[tokio::test]
    async fn streams_fragments_until_done() {
        let server = MockServer::start().await;
        let body = sse_body(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"function":{"arguments":"{\"amount\":"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"function":{"arguments":"25}"}}]}}]}"#,
            "[DONE]",
        ]);
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let events: Vec<_> = client(&server, 0)
            .stream_chat(&test_request())
            .await
            .unwrap()
            .collect()
            .await;
        let events: Vec<ChunkEvent> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            events,
            vec![
                ChunkEvent::Fragment("{\"amount\":".into()),
                ChunkEvent::Fragment("25}".into()),
                ChunkEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn no_retry_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"message": "Rate limited", "type": "rate_limit_error"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, 0).stream_chat(&test_request()).await.err().unwrap();
        assert!(err.to_string().contains("Rate limited"));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn retries_transient_status_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body(&["[DONE]"])),
            )
            .mount(&server)
            .await;

        let mut stream = client(&server, 1).stream_chat(&test_request()).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), ChunkEvent::Done);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "bad tool schema", "type": "invalid_request_error"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, 3).stream_chat(&test_request()).await.err().unwrap();
        assert!(err.to_string().contains("invalid_request_error"));
    }
}
