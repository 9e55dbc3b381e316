// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The expense pipeline: retrieval, streamed analysis, commit and the
//! record operations that share its reindex discipline.

use std::sync::Arc;

use chrono::Utc;
use tally_config::model::{MemoryConfig, PipelineConfig};
use tally_config::RetrievalFailurePolicy;
use tally_core::{
    AnalysisModel, AnalysisRequest, ExpenseFilter, ExpenseRecord, ExpenseUpdate, MemoryStore,
    RecordId, RecordPage, RecordStore, ScoredMemory, TallyError, VectorEmbedder,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::history::format_history;
use crate::reindex::Reindexer;
use crate::session::{log_transition, produce, Finalizer, SessionState, StreamSession};

/// Composes the four capabilities into the request lifecycle.
pub struct ExpensePipeline {
    embedder: Arc<dyn VectorEmbedder>,
    memory: Arc<dyn MemoryStore>,
    model: Arc<dyn AnalysisModel>,
    records: Arc<dyn RecordStore>,
    reindexer: Reindexer,
    config: PipelineConfig,
    retrieval_limit: usize,
}

impl ExpensePipeline {
    pub fn new(
        embedder: Arc<dyn VectorEmbedder>,
        memory: Arc<dyn MemoryStore>,
        model: Arc<dyn AnalysisModel>,
        records: Arc<dyn RecordStore>,
        config: PipelineConfig,
        memory_config: MemoryConfig,
    ) -> Self {
        let reindexer = Reindexer::new(
            Arc::clone(&embedder),
            Arc::clone(&memory),
            config.reindex_timeout(),
        );
        Self {
            embedder,
            memory,
            model,
            records,
            reindexer,
            config,
            retrieval_limit: memory_config.retrieval_limit,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run retrieval and open the model stream.
    ///
    /// Errors returned here happen before any fragment exists, so the
    /// transport can still answer with a plain status code.
    pub async fn start(
        &self,
        owner_id: &str,
        description: &str,
        roast: Option<bool>,
    ) -> Result<StreamSession, TallyError> {
        if description.trim().is_empty() {
            return Err(TallyError::InvalidInput(
                "description must not be empty".into(),
            ));
        }
        let roast = roast.unwrap_or(self.config.roast_default);
        info!(
            owner = %owner_id,
            description_len = description.len(),
            roast,
            "analysis requested"
        );

        log_transition(owner_id, SessionState::Idle, SessionState::Retrieving);

        let recalled = match self.retrieve(owner_id, description).await {
            Ok(recalled) => recalled,
            Err(e) => match self.config.retrieval_failure {
                RetrievalFailurePolicy::Abort => {
                    log_transition(owner_id, SessionState::Retrieving, SessionState::Aborted);
                    return Err(e);
                }
                RetrievalFailurePolicy::Degrade => {
                    warn!(
                        owner = %owner_id,
                        error = %e,
                        "retrieval failed, continuing without history"
                    );
                    Vec::new()
                }
            },
        };
        let history = format_history(&recalled, Utc::now());
        debug!(owner = %owner_id, history = history.len(), roast, "retrieval complete");

        let fragments = match self
            .model
            .analyze(AnalysisRequest {
                utterance: description.to_string(),
                categories: self.config.categories.clone(),
                history: history.clone(),
                roast,
            })
            .await
        {
            Ok(fragments) => fragments,
            Err(e) => {
                log_transition(owner_id, SessionState::Retrieving, SessionState::Aborted);
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let producer = tokio::spawn(produce(fragments, tx));
        log_transition(owner_id, SessionState::Retrieving, SessionState::Streaming);

        Ok(StreamSession::new(
            owner_id.to_string(),
            description.to_string(),
            self.config.categories.clone(),
            history,
            roast,
            rx,
            producer,
            self.config.request_timeout(),
            Finalizer {
                records: Arc::clone(&self.records),
                reindexer: self.reindexer.clone(),
                commit_timeout: self.config.commit_timeout(),
            },
        ))
    }

    async fn retrieve(
        &self,
        owner_id: &str,
        description: &str,
    ) -> Result<Vec<ScoredMemory>, TallyError> {
        let query = self.embedder.vectorize(description).await?;
        self.memory
            .search(owner_id, &query, self.retrieval_limit)
            .await
    }

    /// Apply a partial update and re-embed the record's summary.
    pub async fn update_expense(
        &self,
        owner_id: &str,
        id: RecordId,
        update: ExpenseUpdate,
    ) -> Result<ExpenseRecord, TallyError> {
        let record = self
            .records
            .update(owner_id, id, sanitize(update))
            .await?;
        info!(owner = %owner_id, record_id = id, "expense updated");

        let text = format!(
            "Expense: {}, amount: {:.2}, note: {}",
            record.category, record.amount, record.note
        );
        self.reindexer.spawn_upsert(
            owner_id.to_string(),
            record.id,
            text,
            record.category.clone(),
        );
        Ok(record)
    }

    /// Soft-delete a record; its memory entry is removed in the background.
    pub async fn delete_expense(&self, owner_id: &str, id: RecordId) -> Result<(), TallyError> {
        self.records.soft_delete(owner_id, id).await?;
        info!(owner = %owner_id, record_id = id, "expense deleted");
        self.reindexer.spawn_delete(id);
        Ok(())
    }

    pub async fn list_expenses(&self, filter: ExpenseFilter) -> Result<RecordPage, TallyError> {
        self.records.list(filter).await
    }

    pub async fn get_expense(
        &self,
        owner_id: &str,
        id: RecordId,
    ) -> Result<ExpenseRecord, TallyError> {
        self.records.get(owner_id, id).await
    }
}

/// Blank strings and non-positive amounts mean "leave unchanged".
fn sanitize(update: ExpenseUpdate) -> ExpenseUpdate {
    let keep = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
    ExpenseUpdate {
        category: keep(update.category),
        amount: update.amount.filter(|a| a.is_finite() && *a > 0.0),
        note: keep(update.note),
        created_at: update.created_at,
    }
}
