// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A record store wrapper that slows down commits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tally_core::{
    AdapterType, ExpenseFilter, ExpenseRecord, ExpenseUpdate, HealthStatus, NewExpense,
    PluginAdapter, RecordId, RecordPage, RecordStore, TallyError,
};

/// Delegates to `inner`, sleeping `delay` before every `create`.
pub struct DelayedRecordStore {
    inner: Arc<dyn RecordStore>,
    delay: Duration,
}

impl DelayedRecordStore {
    pub fn new(inner: Arc<dyn RecordStore>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl PluginAdapter for DelayedRecordStore {
    fn name(&self) -> &str {
        "delayed-records"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Records
    }

    async fn health_check(&self) -> Result<HealthStatus, TallyError> {
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), TallyError> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl RecordStore for DelayedRecordStore {
    async fn create(&self, expense: NewExpense) -> Result<ExpenseRecord, TallyError> {
        tokio::time::sleep(self.delay).await;
        self.inner.create(expense).await
    }

    async fn get(&self, owner_id: &str, id: RecordId) -> Result<ExpenseRecord, TallyError> {
        self.inner.get(owner_id, id).await
    }

    async fn update(
        &self,
        owner_id: &str,
        id: RecordId,
        update: ExpenseUpdate,
    ) -> Result<ExpenseRecord, TallyError> {
        self.inner.update(owner_id, id, update).await
    }

    async fn soft_delete(&self, owner_id: &str, id: RecordId) -> Result<(), TallyError> {
        self.inner.soft_delete(owner_id, id).await
    }

    async fn list(&self, filter: ExpenseFilter) -> Result<RecordPage, TallyError> {
        self.inner.list(filter).await
    }
}
