// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Detached memory maintenance.
//!
//! Every task runs on its own deadline, independent of the request that
//! spawned it. Failures are logged as stale-memory warnings and dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tally_core::{MemoryEntry, MemoryStore, RecordId, TallyError, VectorEmbedder};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Spawns re-embedding and memory deletion tasks.
#[derive(Clone)]
pub struct Reindexer {
    embedder: Arc<dyn VectorEmbedder>,
    memory: Arc<dyn MemoryStore>,
    timeout: Duration,
}

impl Reindexer {
    pub fn new(
        embedder: Arc<dyn VectorEmbedder>,
        memory: Arc<dyn MemoryStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            memory,
            timeout,
        }
    }

    /// Embed `text` and upsert it as the memory entry of record `id`.
    ///
    /// The handle may be dropped; the task keeps running.
    pub fn spawn_upsert(
        &self,
        owner_id: String,
        id: RecordId,
        text: String,
        category: String,
    ) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let work = async {
                let embedding = this.embedder.vectorize(&text).await?;
                this.memory
                    .upsert(MemoryEntry {
                        id,
                        owner_id,
                        embedding,
                        description: text,
                        category,
                        timestamp: Utc::now().timestamp(),
                    })
                    .await
            };
            match this.bounded(work).await {
                Ok(()) => debug!(record_id = id, "memory reindexed"),
                Err(e) => warn!(
                    stale_memory = true,
                    record_id = id,
                    error = %e,
                    "memory reindex failed"
                ),
            }
        })
    }

    /// Remove the memory entry of record `id`.
    pub fn spawn_delete(&self, id: RecordId) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            match this.bounded(this.memory.delete(id)).await {
                Ok(()) => debug!(record_id = id, "memory entry removed"),
                Err(e) => warn!(
                    stale_memory = true,
                    record_id = id,
                    error = %e,
                    "memory delete failed"
                ),
            }
        })
    }

    async fn bounded<F>(&self, work: F) -> Result<(), TallyError>
    where
        F: Future<Output = Result<(), TallyError>>,
    {
        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| TallyError::Timeout {
                duration: self.timeout,
            })?
    }
}
