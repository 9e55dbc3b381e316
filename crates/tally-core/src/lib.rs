// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tally expense pipeline.
//!
//! This crate provides the capability traits, error taxonomy, and domain
//! types shared by every other crate in the workspace. Concrete backends
//! (SQLite stores, HTTP model and embedding clients) implement the traits
//! defined here, and the orchestrator only ever sees the traits.

pub mod error;
pub mod traits;
pub mod types;

pub use error::TallyError;
pub use types::{
    AdapterType, AnalysisRequest, ExpenseAnalysis, ExpenseFilter, ExpenseRecord, ExpenseUpdate,
    HealthStatus, MemoryEntry, NewExpense, RecordId, RecordPage, ScoredMemory,
};

pub use traits::{
    AnalysisModel, FragmentStream, MemoryStore, PluginAdapter, RecordStore, VectorEmbedder,
};
