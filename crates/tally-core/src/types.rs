// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the capability traits and the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identity of an expense record. The matching memory entry reuses it.
pub type RecordId = i64;

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies which capability an adapter provides.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Embedding,
    Memory,
    Model,
    Records,
}

/// Structured extraction produced by the analysis model.
///
/// All five fields are required on the wire so a finalized payload always
/// carries them, even when `note` or `comment` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseAnalysis {
    /// Non-negative total amount.
    pub amount: f64,
    /// One value of the supplied category vocabulary, surfaced unmodified.
    pub category: String,
    /// Calendar date as written by the model (usually `YYYY-MM-DD`).
    pub date: String,
    /// Short description without amount or date words.
    pub note: String,
    /// Roast remark; empty when roast mode is off.
    pub comment: String,
}

/// A durable expense record owned by a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub id: RecordId,
    pub owner_id: String,
    pub amount: f64,
    pub category: String,
    pub note: String,
    pub comment: String,
    /// When the expense happened (resolved from the analysis date).
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker. Never serialized to clients.
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Fields needed to create a record; the store assigns the identity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub owner_id: String,
    pub amount: f64,
    pub category: String,
    pub note: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Partial update of a record. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseUpdate {
    pub category: Option<String>,
    pub amount: Option<f64>,
    pub note: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl ExpenseUpdate {
    /// Returns true when the update would not change anything.
    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.amount.is_none()
            && self.note.is_none()
            && self.created_at.is_none()
    }
}

/// Owner-scoped list filter with 1-based paging.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseFilter {
    pub owner_id: String,
    pub category: Option<String>,
    /// Inclusive lower bound on `created_at`.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub end: Option<DateTime<Utc>>,
    pub page: u32,
    pub page_size: u32,
}

impl ExpenseFilter {
    /// Default page size when the caller does not specify one.
    pub const DEFAULT_PAGE_SIZE: u32 = 10;
    /// Largest page a caller may request.
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Creates an unfiltered first-page query for `owner_id`.
    pub fn for_owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            category: None,
            start: None,
            end: None,
            page: 1,
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    /// Page number clamped to at least 1.
    pub fn effective_page(&self) -> u32 {
        self.page.max(1)
    }

    /// Page size clamped to `1..=MAX_PAGE_SIZE`.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, Self::MAX_PAGE_SIZE)
    }

    /// Row offset for the effective page.
    pub fn offset(&self) -> u64 {
        u64::from(self.effective_page() - 1) * u64::from(self.effective_page_size())
    }
}

/// One page of records plus the total count before paging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordPage {
    pub items: Vec<ExpenseRecord>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// A vectorized description stored in the memory store.
///
/// `id` equals the owning record's id, so an upsert overwrites the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: RecordId,
    pub owner_id: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub description: String,
    pub category: String,
    /// Unix seconds; 0 means unknown.
    pub timestamp: i64,
}

/// A memory entry with its similarity to the query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMemory {
    pub entry: MemoryEntry,
    pub score: f32,
}

/// Everything the analysis model needs for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    /// The user's free-text expense description.
    pub utterance: String,
    /// Closed category vocabulary.
    pub categories: Vec<String>,
    /// Pre-formatted `<relative-time> [<category>] <description>` lines.
    pub history: Vec<String>,
    pub roast: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_paging_clamps_values() {
        let mut filter = ExpenseFilter::for_owner("u1");
        filter.page = 0;
        filter.page_size = 1000;
        assert_eq!(filter.effective_page(), 1);
        assert_eq!(filter.effective_page_size(), ExpenseFilter::MAX_PAGE_SIZE);
        assert_eq!(filter.offset(), 0);

        filter.page = 3;
        filter.page_size = 10;
        assert_eq!(filter.offset(), 20);
    }

    #[test]
    fn analysis_requires_all_five_fields() {
        let ok = r#"{"amount":25,"category":"Transport","date":"2026-01-02","note":"taxi","comment":""}"#;
        let parsed: ExpenseAnalysis = serde_json::from_str(ok).unwrap();
        assert_eq!(parsed.amount, 25.0);
        assert_eq!(parsed.comment, "");

        let missing = r#"{"amount":25,"category":"Transport","date":"2026-01-02","note":"taxi"}"#;
        assert!(serde_json::from_str::<ExpenseAnalysis>(missing).is_err());
    }

    #[test]
    fn record_serialization_hides_soft_delete_marker() {
        let now = Utc::now();
        let record = ExpenseRecord {
            id: 7,
            owner_id: "u1".into(),
            amount: 12.5,
            category: "Food".into(),
            note: "lunch".into(),
            comment: String::new(),
            created_at: now,
            updated_at: now,
            deleted_at: Some(now),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("deleted_at").is_none());
        assert_eq!(json["id"], 7);
        assert_eq!(json["comment"], "");
    }

    #[test]
    fn empty_update_detected() {
        assert!(ExpenseUpdate::default().is_empty());
        let update = ExpenseUpdate {
            note: Some("x".into()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
