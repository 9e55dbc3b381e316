// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits for the expense pipeline.
//!
//! Every capability extends the [`PluginAdapter`] base trait and uses
//! `#[async_trait]` so implementations can be held as trait objects.

pub mod adapter;
pub mod embedding;
pub mod memory;
pub mod model;
pub mod records;

pub use adapter::PluginAdapter;
pub use embedding::VectorEmbedder;
pub use memory::MemoryStore;
pub use model::{AnalysisModel, FragmentStream};
pub use records::RecordStore;
