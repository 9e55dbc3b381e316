// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-request streaming session.
//!
//! A [`StreamSession`] is handed out once retrieval succeeded and the model
//! stream is open. The caller drives it with [`StreamSession::next`] until it
//! returns `None`. Fragments are relayed in production order; the stream end
//! triggers parsing, the commit and the detached reindex.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use futures::StreamExt;
use tally_core::{
    ExpenseAnalysis, ExpenseRecord, FragmentStream, NewExpense, RecordStore, TallyError,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::reindex::Reindexer;

/// States of the request FSM.
///
/// `Idle` and `Retrieving` belong to [`crate::ExpensePipeline::start`]; a
/// [`StreamSession`] exists from `Streaming` on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Request accepted, nothing done yet.
    Idle,
    /// Embedding the description and searching memory.
    Retrieving,
    /// Relaying model fragments.
    Streaming,
    /// Parsing the buffered output and committing it.
    Finalizing,
    /// Record persisted.
    Committed,
    /// Ended without a record.
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Committed | SessionState::Aborted)
    }

    /// Whether the FSM has an edge from `self` to `next`.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Retrieving)
                | (Retrieving, Streaming | Aborted)
                | (Streaming, Finalizing | Aborted)
                | (Finalizing, Committed | Aborted)
        )
    }
}

pub(crate) fn log_transition(owner_id: &str, from: SessionState, to: SessionState) {
    debug_assert!(from.can_advance_to(to), "illegal transition {from} -> {to}");
    debug!(owner = %owner_id, %from, %to, "session state change");
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Retrieving => write!(f, "retrieving"),
            SessionState::Streaming => write!(f, "streaming"),
            SessionState::Finalizing => write!(f, "finalizing"),
            SessionState::Committed => write!(f, "committed"),
            SessionState::Aborted => write!(f, "aborted"),
        }
    }
}

/// What the transport relays to the client.
#[derive(Debug)]
pub enum SessionEvent {
    /// One raw model fragment.
    Delta(String),
    /// The committed record. Terminal.
    Done(ExpenseRecord),
    /// Failure after streaming began. Terminal.
    Error(TallyError),
}

/// Items on the producer channel. `End` distinguishes a complete stream
/// from a producer that vanished.
#[derive(Debug)]
pub(crate) enum StreamItem {
    Fragment(String),
    Failed(TallyError),
    End,
}

/// Drain the model stream into the channel. Blocks when the channel is full.
pub(crate) async fn produce(mut fragments: FragmentStream, tx: mpsc::Sender<StreamItem>) {
    while let Some(item) = fragments.next().await {
        let sent = match item {
            Ok(text) if text.is_empty() => continue,
            Ok(text) => tx.send(StreamItem::Fragment(text)).await,
            Err(e) => {
                let _ = tx.send(StreamItem::Failed(e)).await;
                return;
            }
        };
        if sent.is_err() {
            // Receiver gone: the session was dropped.
            return;
        }
    }
    let _ = tx.send(StreamItem::End).await;
}

/// Everything the finalize step needs besides the buffer.
pub(crate) struct Finalizer {
    pub records: Arc<dyn RecordStore>,
    pub reindexer: Reindexer,
    pub commit_timeout: Duration,
}

/// Request-scoped streaming state. Never persisted.
pub struct StreamSession {
    owner_id: String,
    description: String,
    categories: Vec<String>,
    history: Vec<String>,
    roast: bool,
    state: SessionState,
    buffer: String,
    fragments: usize,
    rx: mpsc::Receiver<StreamItem>,
    producer: JoinHandle<()>,
    deadline: Instant,
    request_timeout: Duration,
    finalizer: Finalizer,
}

enum Step {
    Cancelled,
    TimedOut,
    Item(Option<StreamItem>),
}

impl StreamSession {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        owner_id: String,
        description: String,
        categories: Vec<String>,
        history: Vec<String>,
        roast: bool,
        rx: mpsc::Receiver<StreamItem>,
        producer: JoinHandle<()>,
        request_timeout: Duration,
        finalizer: Finalizer,
    ) -> Self {
        Self {
            owner_id,
            description,
            categories,
            history,
            roast,
            state: SessionState::Streaming,
            buffer: String::new(),
            fragments: 0,
            rx,
            producer,
            deadline: Instant::now() + request_timeout,
            request_timeout,
            finalizer,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Category vocabulary the model was given.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// History lines the model was given.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn roast(&self) -> bool {
        self.roast
    }

    /// Fragments relayed so far, concatenated.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Advance the session.
    ///
    /// Returns `None` once a terminal event was returned or `cancel` fired.
    /// Cancellation during streaming drops everything: no record is written
    /// and no terminal event is produced.
    pub async fn next(&mut self, cancel: &CancellationToken) -> Option<SessionEvent> {
        if self.state != SessionState::Streaming {
            return None;
        }

        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            _ = tokio::time::sleep_until(self.deadline) => Step::TimedOut,
            item = self.rx.recv() => Step::Item(item),
        };

        match step {
            Step::Cancelled => {
                warn!(
                    owner = %self.owner_id,
                    fragments = self.fragments,
                    "session cancelled by client"
                );
                self.abort();
                None
            }
            Step::TimedOut => {
                warn!(owner = %self.owner_id, "session exceeded request timeout");
                self.abort();
                Some(SessionEvent::Error(TallyError::Timeout {
                    duration: self.request_timeout,
                }))
            }
            Step::Item(Some(StreamItem::Fragment(text))) => {
                self.buffer.push_str(&text);
                self.fragments += 1;
                Some(SessionEvent::Delta(text))
            }
            Step::Item(Some(StreamItem::Failed(e))) => {
                warn!(owner = %self.owner_id, error = %e, "model stream failed");
                self.abort();
                Some(SessionEvent::Error(e))
            }
            Step::Item(Some(StreamItem::End)) => Some(self.finalize().await),
            Step::Item(None) => {
                self.abort();
                Some(SessionEvent::Error(TallyError::provider(
                    "model stream closed unexpectedly",
                )))
            }
        }
    }

    fn abort(&mut self) {
        self.producer.abort();
        self.transition(SessionState::Aborted);
    }

    fn transition(&mut self, next: SessionState) {
        log_transition(&self.owner_id, self.state, next);
        self.state = next;
    }

    async fn finalize(&mut self) -> SessionEvent {
        self.transition(SessionState::Finalizing);

        let mut analysis = match parse_analysis(&self.buffer) {
            Ok(analysis) => analysis,
            Err(e) => {
                error!(owner = %self.owner_id, error = %e, "model output rejected");
                self.transition(SessionState::Aborted);
                return SessionEvent::Error(e);
            }
        };
        if !self.roast {
            analysis.comment.clear();
        }

        let expense = NewExpense {
            owner_id: self.owner_id.clone(),
            amount: analysis.amount,
            category: analysis.category,
            note: analysis.note,
            comment: analysis.comment,
            created_at: resolve_date(&analysis.date, Local::now()),
        };

        // The commit and the reindex it schedules run in their own task, so
        // dropping this session cannot interrupt a write that has started or
        // lose the memory entry of a row that was written.
        let records = Arc::clone(&self.finalizer.records);
        let reindexer = self.finalizer.reindexer.clone();
        let timeout = self.finalizer.commit_timeout;
        let owner_id = self.owner_id.clone();
        let description = self.description.clone();
        let commit = tokio::spawn(async move {
            let record = tokio::time::timeout(timeout, records.create(expense))
                .await
                .map_err(|_| TallyError::Timeout { duration: timeout })??;
            reindexer.spawn_upsert(owner_id, record.id, description, record.category.clone());
            Ok::<_, TallyError>(record)
        });

        let outcome = commit
            .await
            .unwrap_or_else(|e| Err(TallyError::Internal(format!("commit task failed: {e}"))));

        match outcome {
            Ok(record) => {
                self.transition(SessionState::Committed);
                info!(
                    owner = %self.owner_id,
                    record_id = record.id,
                    fragments = self.fragments,
                    "expense committed"
                );
                SessionEvent::Done(record)
            }
            Err(e) => {
                error!(owner = %self.owner_id, error = %e, "expense commit failed");
                self.transition(SessionState::Aborted);
                SessionEvent::Error(e)
            }
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.producer.abort();
    }
}

/// Parse the concatenated fragments as one analysis object.
pub fn parse_analysis(buffer: &str) -> Result<ExpenseAnalysis, TallyError> {
    serde_json::from_str(buffer.trim()).map_err(|e| TallyError::MalformedModelOutput {
        message: e.to_string(),
        source: Some(Box::new(e)),
    })
}

/// Resolve the model's date to a timestamp in the local zone.
///
/// Accepts `%Y-%m-%d %H:%M:%S` and `%Y-%m-%d` (midnight). Anything else,
/// including ambiguous local times, yields `now`.
pub fn resolve_date(raw: &str, now: DateTime<Local>) -> DateTime<Utc> {
    let raw = raw.trim();
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        });
    naive
        .and_then(|n| Local.from_local_datetime(&n).single())
        .unwrap_or(now)
        .with_timezone(&Utc)
}
