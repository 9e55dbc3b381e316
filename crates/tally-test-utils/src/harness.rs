// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline testing.
//!
//! `TestHarness` assembles an [`ExpensePipeline`] over the mock embedder,
//! memory store and model, with a real SQLite record store in a temp dir.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tally_config::model::{MemoryConfig, PipelineConfig, StorageConfig};
use tally_config::RetrievalFailurePolicy;
use tally_core::{
    ExpenseFilter, MemoryEntry, MemoryStore, RecordId, RecordStore, TallyError,
};
use tally_pipeline::{ExpensePipeline, SessionEvent, StreamSession};
use tally_storage::SqliteRecordStore;
use tokio_util::sync::CancellationToken;

use crate::mock_embedder::MockEmbedder;
use crate::mock_memory::MockMemoryStore;
use crate::mock_model::{MockAnalysisModel, ModelScript};
use crate::mock_records::DelayedRecordStore;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    scripts: Vec<ModelScript>,
    pipeline: PipelineConfig,
    retrieval_limit: usize,
    commit_delay: Option<Duration>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            scripts: Vec::new(),
            pipeline: PipelineConfig::default(),
            retrieval_limit: MemoryConfig::default().retrieval_limit,
            commit_delay: None,
        }
    }

    /// Queue model scripts, consumed one per analysis.
    pub fn with_scripts(mut self, scripts: Vec<ModelScript>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_roast_default(mut self, roast: bool) -> Self {
        self.pipeline.roast_default = roast;
        self
    }

    pub fn with_retrieval_failure(mut self, policy: RetrievalFailurePolicy) -> Self {
        self.pipeline.retrieval_failure = policy;
        self
    }

    pub fn with_categories(mut self, categories: &[&str]) -> Self {
        self.pipeline.categories = categories.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_retrieval_limit(mut self, limit: usize) -> Self {
        self.retrieval_limit = limit;
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.pipeline.request_timeout_secs = secs;
        self
    }

    pub fn with_reindex_timeout_secs(mut self, secs: u64) -> Self {
        self.pipeline.reindex_timeout_secs = secs;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.pipeline.channel_capacity = capacity;
        self
    }

    /// Hold every `create` on the pipeline's record store for `delay`.
    pub fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = Some(delay);
        self
    }

    /// Build the harness, creating the temp database.
    pub async fn build(self) -> Result<TestHarness, TallyError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| TallyError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("tally-test.db");

        let records = SqliteRecordStore::new(StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        });
        records.initialize().await?;
        let records = Arc::new(records);

        let embedder = Arc::new(MockEmbedder::default());
        let memory = Arc::new(MockMemoryStore::new());
        let model = Arc::new(MockAnalysisModel::with_scripts(self.scripts));

        let memory_config = MemoryConfig {
            retrieval_limit: self.retrieval_limit,
            ..MemoryConfig::default()
        };
        let pipeline_records: Arc<dyn RecordStore> = match self.commit_delay {
            Some(delay) => Arc::new(DelayedRecordStore::new(records.clone(), delay)),
            None => records.clone(),
        };
        let pipeline = Arc::new(ExpensePipeline::new(
            embedder.clone(),
            memory.clone(),
            model.clone(),
            pipeline_records,
            self.pipeline,
            memory_config,
        ));

        Ok(TestHarness {
            pipeline,
            embedder,
            memory,
            model,
            records,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete pipeline over mock capabilities and a temp record store.
pub struct TestHarness {
    pub pipeline: Arc<ExpensePipeline>,
    pub embedder: Arc<MockEmbedder>,
    pub memory: Arc<MockMemoryStore>,
    pub model: Arc<MockAnalysisModel>,
    /// SQLite record store (temp DB, cleaned up on drop).
    pub records: Arc<SqliteRecordStore>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Start an analysis and drive it to completion.
    pub async fn analyze(
        &self,
        owner_id: &str,
        description: &str,
        roast: Option<bool>,
    ) -> Result<Vec<SessionEvent>, TallyError> {
        let session = self.pipeline.start(owner_id, description, roast).await?;
        Ok(collect_events(session, &CancellationToken::new()).await)
    }

    /// Number of live records of `owner_id`.
    pub async fn record_count(&self, owner_id: &str) -> Result<u64, TallyError> {
        Ok(self.records.list(ExpenseFilter::for_owner(owner_id)).await?.total)
    }

    /// Put a memory entry in place as if an earlier analysis had indexed it.
    pub async fn seed_memory(
        &self,
        owner_id: &str,
        id: RecordId,
        description: &str,
        category: &str,
        timestamp: i64,
    ) -> Result<(), TallyError> {
        self.memory
            .upsert(MemoryEntry {
                id,
                owner_id: owner_id.to_string(),
                embedding: self.embedder.embed(description),
                description: description.to_string(),
                category: category.to_string(),
                timestamp,
            })
            .await
    }

    /// Seconds since the epoch, for seeding recent memories.
    pub fn now_ts() -> i64 {
        Utc::now().timestamp()
    }
}

/// Drain a session, returning every event it produced.
pub async fn collect_events(
    mut session: StreamSession,
    cancel: &CancellationToken,
) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Some(event) = session.next(cancel).await {
        events.push(event);
    }
    events
}
