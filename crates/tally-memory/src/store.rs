// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed vector memory with owner-scoped cosine search.

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use tally_core::{
    AdapterType, HealthStatus, MemoryEntry, MemoryStore, PluginAdapter, RecordId, ScoredMemory,
    TallyError,
};
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::types::{blob_to_vec, rank, vec_to_blob};

fn store_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> TallyError {
    TallyError::StoreUnavailable {
        message: e.to_string(),
        source: Some(Box::new(e)),
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<MemoryEntry, rusqlite::Error> {
    let blob: Vec<u8> = row.get(2)?;
    Ok(MemoryEntry {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        embedding: blob_to_vec(&blob),
        description: row.get(3)?,
        category: row.get(4)?,
        timestamp: row.get(5)?,
    })
}

/// Memory entries of one collection in the `memories` table.
///
/// The connection must already carry the `memories` schema; opening it
/// through `tally_storage::Database` takes care of that.
pub struct SqliteMemoryStore {
    conn: Connection,
    collection: String,
    threshold: Option<f32>,
}

impl SqliteMemoryStore {
    pub fn new(conn: Connection, collection: impl Into<String>) -> Self {
        Self {
            conn,
            collection: collection.into(),
            threshold: None,
        }
    }

    /// Drop search hits whose cosine similarity is below `threshold`.
    pub fn with_threshold(mut self, threshold: Option<f32>) -> Self {
        self.threshold = threshold;
        self
    }

    /// Fetch one entry by id.
    pub async fn get(&self, id: RecordId) -> Result<Option<MemoryEntry>, TallyError> {
        let collection = self.collection.clone();
        self.conn
            .call(move |conn| -> Result<Option<MemoryEntry>, rusqlite::Error> {
                conn.query_row(
                    "SELECT id, owner_id, embedding, description, category, timestamp
                     FROM memories WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    row_to_entry,
                )
                .optional()
            })
            .await
            .map_err(store_err)
    }

    /// Number of entries held for `owner_id`.
    pub async fn count(&self, owner_id: &str) -> Result<u64, TallyError> {
        let collection = self.collection.clone();
        let owner_id = owner_id.to_string();
        let n: i64 = self
            .conn
            .call(move |conn| -> Result<i64, rusqlite::Error> {
                conn.query_row(
                    "SELECT COUNT(*) FROM memories WHERE collection = ?1 AND owner_id = ?2",
                    params![collection, owner_id],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(store_err)?;
        Ok(n.max(0) as u64)
    }
}

#[async_trait]
impl PluginAdapter for SqliteMemoryStore {
    fn name(&self) -> &str {
        "sqlite-memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Memory
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        let result = self
            .conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("SELECT COUNT(*) FROM memories LIMIT 1", [], |_| Ok(()))
            })
            .await;
        Ok(match result {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn upsert(&self, entry: MemoryEntry) -> Result<(), TallyError> {
        let collection = self.collection.clone();
        let id = entry.id;
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO memories (collection, id, owner_id, embedding, description, category, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(collection, id) DO UPDATE SET
                        owner_id = excluded.owner_id,
                        embedding = excluded.embedding,
                        description = excluded.description,
                        category = excluded.category,
                        timestamp = excluded.timestamp",
                    params![
                        collection,
                        entry.id,
                        entry.owner_id,
                        vec_to_blob(&entry.embedding),
                        entry.description,
                        entry.category,
                        entry.timestamp,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(store_err)?;
        debug!(record_id = id, "memory entry upserted");
        Ok(())
    }

    async fn search(
        &self,
        owner_id: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredMemory>, TallyError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let collection = self.collection.clone();
        let owner = owner_id.to_string();
        let candidates = self
            .conn
            .call(move |conn| -> Result<Vec<MemoryEntry>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, owner_id, embedding, description, category, timestamp
                     FROM memories WHERE owner_id = ?1 AND collection = ?2
                     ORDER BY rowid",
                )?;
                let rows = stmt.query_map(params![owner, collection], row_to_entry)?;
                rows.collect()
            })
            .await
            .map_err(store_err)?;

        let hits = rank(candidates, query, self.threshold, limit);
        debug!(owner = owner_id, hits = hits.len(), "memory search complete");
        Ok(hits)
    }

    async fn delete(&self, id: RecordId) -> Result<(), TallyError> {
        let collection = self.collection.clone();
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "DELETE FROM memories WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                )?;
                Ok(())
            })
            .await
            .map_err(store_err)
    }
}
