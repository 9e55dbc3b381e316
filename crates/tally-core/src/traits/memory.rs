// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Owner-scoped vector memory capability.

use async_trait::async_trait;

use crate::error::TallyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{MemoryEntry, RecordId, ScoredMemory};

/// Persists and searches vectorized expense descriptions.
#[async_trait]
pub trait MemoryStore: PluginAdapter {
    /// Inserts the entry or replaces every field of the entry with the same id.
    async fn upsert(&self, entry: MemoryEntry) -> Result<(), TallyError>;

    /// Returns up to `limit` entries of `owner_id`, most similar (cosine) first.
    ///
    /// Entries of other owners are never returned. An owner without entries
    /// yields an empty vector, not an error.
    async fn search(
        &self,
        owner_id: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredMemory>, TallyError>;

    /// Removes the entry. Deleting a missing id succeeds.
    async fn delete(&self, id: RecordId) -> Result<(), TallyError>;
}
