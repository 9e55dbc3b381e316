// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector memory for the Tally expense pipeline.
//!
//! [`SqliteMemoryStore`] keeps one embedding per expense record in SQLite and
//! answers owner-scoped cosine searches. [`HttpEmbedder`] turns text into
//! vectors through an OpenAI-compatible `/embeddings` endpoint.

pub mod embedder;
pub mod store;
pub mod types;

pub use embedder::HttpEmbedder;
pub use store::SqliteMemoryStore;
