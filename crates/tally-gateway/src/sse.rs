// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events relay for POST /v1/expenses/analyze.
//!
//! SSE event format:
//! ```text
//! event: delta
//! data: {"amount": 25
//!
//! event: done
//! data: {"id":1,"owner_id":"u1","amount":25.0,...}
//! ```
//!
//! Failures before the first fragment are returned as a JSON error with a
//! status code. Once the stream is open, failures arrive as one `error`
//! event whose data is the plain message:
//!
//! ```text
//! event: error
//! data: provider error: model stream ended before [DONE]
//! ```
//!
//! Messages of internal failures are replaced the same way as in JSON
//! error responses.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use tally_pipeline::{SessionEvent, StreamSession};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::ApiError;
use crate::owner::OwnerId;
use crate::server::GatewayState;

const KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Request body for POST /v1/expenses/analyze.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub description: String,
    /// Overrides the configured roast default.
    #[serde(default)]
    pub roast: Option<bool>,
}

/// POST /v1/expenses/analyze
pub async fn analyze(
    State(state): State<GatewayState>,
    OwnerId(owner): OwnerId,
    Json(body): Json<AnalyzeRequest>,
) -> Result<Response, ApiError> {
    let session = state
        .pipeline
        .start(&owner, &body.description, body.roast)
        .await?;
    tracing::debug!(owner = %owner, "analysis stream opened");

    Ok(Sse::new(relay(session))
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE))
        .into_response())
}

/// Turn a session into SSE events.
///
/// The stream owns a drop guard for the session's cancellation token, so a
/// client disconnect (axum dropping the body) cancels the session.
pub fn relay(session: StreamSession) -> impl Stream<Item = Result<Event, Infallible>> {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();

    stream::unfold(
        (session, token, guard),
        |(mut session, token, guard): (StreamSession, CancellationToken, DropGuard)| async move {
            let event = session.next(&token).await?;
            Some((Ok(to_event(event)), (session, token, guard)))
        },
    )
}

fn to_event(event: SessionEvent) -> Event {
    match event {
        // SSE cannot carry carriage returns; in JSON they are only whitespace.
        SessionEvent::Delta(text) => Event::default().event("delta").data(text.replace('\r', "")),
        SessionEvent::Done(record) => match Event::default().event("done").json_data(&record) {
            Ok(event) => event,
            Err(e) => error_event(&format!("failed to encode record: {e}")),
        },
        SessionEvent::Error(e) => error_event(ApiError::from(e).message()),
    }
}

fn error_event(message: &str) -> Event {
    Event::default().event("error").data(message.replace('\r', ""))
}
