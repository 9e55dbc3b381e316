// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE parser for streaming chat-completions responses.
//!
//! Only tool-call argument text is surfaced; role announcements, empty
//! deltas and finish markers carry nothing the pipeline needs.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{self, Stream, StreamExt};
use tally_core::TallyError;

use crate::types::ChatChunk;

/// What one SSE event contributed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkEvent {
    /// A piece of the tool-call arguments JSON.
    Fragment(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Boxed stream of parsed chunk events.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChunkEvent, TallyError>> + Send>>;

/// Decode one `data:` payload.
pub fn parse_chunk(data: &str) -> Result<Vec<ChunkEvent>, TallyError> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(vec![ChunkEvent::Done]);
    }
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let chunk: ChatChunk = serde_json::from_str(data).map_err(|e| TallyError::Provider {
        message: format!("failed to parse stream chunk: {e}"),
        source: Some(Box::new(e)),
    })?;

    if let Some(err) = chunk.error {
        return Err(TallyError::provider(format!(
            "model stream error ({}): {}",
            err.type_.as_deref().unwrap_or("unknown"),
            err.message
        )));
    }

    Ok(chunk
        .choices
        .into_iter()
        .take(1)
        .flat_map(|choice| choice.delta.tool_calls.unwrap_or_default())
        .filter_map(|call| call.function.and_then(|f| f.arguments))
        .filter(|args| !args.is_empty())
        .map(ChunkEvent::Fragment)
        .collect())
}

/// Turn a streaming HTTP response into a stream of [`ChunkEvent`]s.
pub fn parse_sse_stream(response: reqwest::Response) -> ChunkStream {
    let events = response.bytes_stream().eventsource();

    let mapped = events.flat_map(|result| {
        let items: Vec<Result<ChunkEvent, TallyError>> = match result {
            Ok(event) => match parse_chunk(&event.data) {
                Ok(events) => events.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            },
            Err(e) => vec![Err(TallyError::provider(format!("SSE transport error: {e}")))],
        };
        stream::iter(items)
    });

    Box::pin(mapped)
}
