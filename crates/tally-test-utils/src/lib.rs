// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tally integration tests.
//!
//! Provides in-memory fakes for the embedding, memory and model capabilities
//! plus a harness that wires them to a temp SQLite record store.
//!
//! # Components
//!
//! - [`MockEmbedder`] - deterministic bag-of-words vectors
//! - [`MockMemoryStore`] - in-memory cosine search with fault injection
//! - [`MockAnalysisModel`] - scripted fragment streams
//! - [`DelayedRecordStore`] - record store with slow commits
//! - [`TestHarness`] - full pipeline over the fakes

pub mod harness;
pub mod mock_embedder;
pub mod mock_memory;
pub mod mock_model;
pub mod mock_records;

pub use harness::{collect_events, TestHarness};
pub use mock_embedder::MockEmbedder;
pub use mock_memory::{CallKind, MockMemoryStore};
pub use mock_model::{MockAnalysisModel, ModelScript};
pub use mock_records::DelayedRecordStore;
