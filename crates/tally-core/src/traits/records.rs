// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable, ownership-scoped expense record capability.

use async_trait::async_trait;

use crate::error::TallyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ExpenseFilter, ExpenseRecord, ExpenseUpdate, NewExpense, RecordId, RecordPage};

/// Relational storage of finalized expense records.
///
/// Every read, update, and delete is scoped by owner. A record that exists
/// under another owner yields [`TallyError::Forbidden`]; a missing or
/// soft-deleted record yields [`TallyError::NotFound`].
#[async_trait]
pub trait RecordStore: PluginAdapter {
    /// Persists a new record and returns it with its assigned identity.
    async fn create(&self, expense: NewExpense) -> Result<ExpenseRecord, TallyError>;

    /// Fetches one record of `owner_id`.
    async fn get(&self, owner_id: &str, id: RecordId) -> Result<ExpenseRecord, TallyError>;

    /// Applies `update` after verifying ownership and returns the new state.
    async fn update(
        &self,
        owner_id: &str,
        id: RecordId,
        update: ExpenseUpdate,
    ) -> Result<ExpenseRecord, TallyError>;

    /// Marks the record deleted after verifying ownership.
    async fn soft_delete(&self, owner_id: &str, id: RecordId) -> Result<(), TallyError>;

    /// Lists records matching `filter`, newest first.
    async fn list(&self, filter: ExpenseFilter) -> Result<RecordPage, TallyError>;
}
