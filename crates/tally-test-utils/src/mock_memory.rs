// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory `MemoryStore` with fault injection and call counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tally_core::{
    AdapterType, HealthStatus, MemoryEntry, MemoryStore, PluginAdapter, RecordId, ScoredMemory,
    TallyError,
};
use tally_memory::types::rank;
use tokio::sync::Mutex;

/// A memory store backed by a vector, ranked the same way as the SQLite one.
pub struct MockMemoryStore {
    entries: Arc<Mutex<Vec<MemoryEntry>>>,
    fail_search: AtomicBool,
    fail_upsert: AtomicBool,
    fail_delete: AtomicBool,
    searches: AtomicUsize,
    upserts: AtomicUsize,
    deletes: AtomicUsize,
}

impl MockMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            fail_search: AtomicBool::new(false),
            fail_upsert: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            searches: AtomicUsize::new(0),
            upserts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_search(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_upsert(&self, fail: bool) {
        self.fail_upsert.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    /// Upsert attempts, failed ones included.
    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Delete attempts, failed ones included.
    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub async fn get(&self, id: RecordId) -> Option<MemoryEntry> {
        self.entries.lock().await.iter().find(|e| e.id == id).cloned()
    }

    pub async fn entries(&self) -> Vec<MemoryEntry> {
        self.entries.lock().await.clone()
    }

    /// Poll until `predicate` holds for the current entries or `timeout` passes.
    ///
    /// Returns whether the predicate was eventually satisfied.
    pub async fn wait_for<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[MemoryEntry]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let satisfied = {
                let entries = self.entries.lock().await;
                predicate(entries.as_slice())
            };
            if satisfied {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Poll until `count` attempts of the given kind were made.
    pub async fn wait_for_calls(&self, kind: CallKind, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let seen = match kind {
                CallKind::Upsert => self.upserts(),
                CallKind::Delete => self.deletes(),
            };
            if seen >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Which counter [`MockMemoryStore::wait_for_calls`] watches.
#[derive(Debug, Clone, Copy)]
pub enum CallKind {
    Upsert,
    Delete,
}

impl Default for MockMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn unavailable(op: &str) -> TallyError {
    TallyError::store_unavailable(format!("mock memory {op} failure"))
}

#[async_trait]
impl PluginAdapter for MockMemoryStore {
    fn name(&self) -> &str {
        "mock-memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Memory
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for MockMemoryStore {
    async fn upsert(&self, entry: MemoryEntry) -> Result<(), TallyError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(unavailable("upsert"));
        }
        let mut entries = self.entries.lock().await;
        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        Ok(())
    }

    async fn search(
        &self,
        owner_id: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredMemory>, TallyError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(unavailable("search"));
        }
        let owned: Vec<MemoryEntry> = self
            .entries
            .lock()
            .await
            .iter()
            .filter(|e| e.owner_id == owner_id)
            .cloned()
            .collect();
        Ok(rank(owned, query, None, limit))
    }

    async fn delete(&self, id: RecordId) -> Result<(), TallyError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(unavailable("delete"));
        }
        self.entries.lock().await.retain(|e| e.id != id);
        Ok(())
    }
}
