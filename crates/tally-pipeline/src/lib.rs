// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming retrieval-augmented expense analysis.
//!
//! [`ExpensePipeline::start`] embeds the description, recalls similar past
//! expenses for the same owner, and opens a tool-constrained model stream.
//! The returned [`StreamSession`] relays fragments, commits the parsed
//! record when the stream ends, and schedules a detached memory reindex.

pub mod history;
pub mod pipeline;
pub mod reindex;
pub mod session;

pub use pipeline::ExpensePipeline;
pub use reindex::Reindexer;
pub use session::{SessionEvent, SessionState, StreamSession};
