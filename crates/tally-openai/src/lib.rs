// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible analysis model for the Tally expense pipeline.
//!
//! Sends one streaming chat-completions request per analysis with the
//! `book_expense` tool forced, and yields the tool-call argument text as
//! ordered fragments.

pub mod client;
pub mod prompt;
pub mod sse;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tally_config::model::ModelConfig;
use tally_core::{
    AdapterType, AnalysisModel, AnalysisRequest, FragmentStream, HealthStatus, PluginAdapter,
    TallyError,
};
use tracing::{debug, info};

use crate::client::OpenAiClient;
use crate::sse::{ChunkEvent, ChunkStream};
use crate::types::{ChatMessage, ChatRequest, ToolChoice};

/// [`AnalysisModel`] backed by a chat-completions endpoint.
pub struct OpenAiAnalysisModel {
    client: OpenAiClient,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiAnalysisModel {
    /// Creates the model adapter from config.
    ///
    /// API key resolution: `model.api_key`, then `OPENAI_API_KEY`, else error.
    pub fn new(config: &ModelConfig) -> Result<Self, TallyError> {
        let api_key = resolve_api_key(&config.api_key)?;
        let client = OpenAiClient::new(
            &config.base_url,
            Some(&api_key),
            Duration::from_secs(config.request_timeout_secs),
            config.max_retries,
        )?;
        info!(model = %config.model, "analysis model initialized");
        Ok(Self::with_client(client, config))
    }

    /// Creates the adapter around an existing client.
    pub fn with_client(client: OpenAiClient, config: &ModelConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Builds the request for `request`, stamped with the current local time.
    pub fn build_request(&self, request: &AnalysisRequest) -> ChatRequest {
        let system = prompt::system_prompt(
            chrono::Local::now(),
            &request.categories,
            &request.history,
            request.roast,
        );
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(system),
                ChatMessage::user(request.utterance.clone()),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: true,
            tools: vec![prompt::book_expense_tool(&request.categories, request.roast)],
            tool_choice: ToolChoice::function(prompt::TOOL_NAME),
        }
    }
}

fn resolve_api_key(config_key: &Option<String>) -> Result<String, TallyError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }

    std::env::var("OPENAI_API_KEY").map_err(|_| {
        TallyError::Config(
            "model API key not found. Set model.api_key in config or OPENAI_API_KEY environment variable.".into(),
        )
    })
}

/// Convert chunk events into fragments. The stream must end with `[DONE]`;
/// running out of bytes first is a broken stream, not a short answer.
fn into_fragments(events: ChunkStream) -> FragmentStream {
    let fragments = stream::unfold(Some(events), |state| async move {
        let mut events = state?;
        match events.next().await {
            Some(Ok(ChunkEvent::Fragment(text))) => Some((Ok(text), Some(events))),
            Some(Ok(ChunkEvent::Done)) => None,
            Some(Err(e)) => Some((Err(e), None)),
            None => Some((
                Err(TallyError::provider("model stream ended before [DONE]")),
                None,
            )),
        }
    });
    Box::pin(fragments)
}

#[async_trait]
impl PluginAdapter for OpenAiAnalysisModel {
    fn name(&self) -> &str {
        "openai"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Model
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        Ok(self.client.check_reachable().await)
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        Ok(())
    }
}

#[async_trait]
impl AnalysisModel for OpenAiAnalysisModel {
    async fn analyze(&self, request: AnalysisRequest) -> Result<FragmentStream, TallyError> {
        let chat = self.build_request(&request);
        debug!(
            history = request.history.len(),
            roast = request.roast,
            "starting analysis stream"
        );
        let events = self.client.stream_chat(&chat).await?;
        Ok(into_fragments(events))
    }
}
