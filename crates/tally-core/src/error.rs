// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tally expense pipeline.

use thiserror::Error;

/// The primary error type used across all Tally capability traits and the orchestrator.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Relational record store errors (connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The vector memory store could not be reached or rejected the operation.
    #[error("memory store unavailable: {message}")]
    StoreUnavailable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The embedding provider could not be reached or returned an unusable vector.
    #[error("embedding unavailable: {message}")]
    EmbeddingUnavailable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The embedding provider answered with zero vectors.
    #[error("embedding provider returned no vectors")]
    EmptyResult,

    /// Language-model provider errors (unreachable, rate limited, broken stream).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The accumulated model output was not a valid expense analysis.
    #[error("malformed model output: {message}")]
    MalformedModelOutput {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The caller does not own the record it tried to touch.
    #[error("forbidden: record belongs to another owner")]
    Forbidden,

    /// The requested record does not exist (or was deleted).
    #[error("not found: {0}")]
    NotFound(String),

    /// The request itself was unusable (empty description, bad filter).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TallyError {
    /// Returns true for failures of an external dependency that may succeed later.
    ///
    /// The pipeline never retries on its own; this only drives status mapping.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TallyError::StoreUnavailable { .. }
                | TallyError::EmbeddingUnavailable { .. }
                | TallyError::EmptyResult
                | TallyError::Provider { .. }
                | TallyError::Timeout { .. }
        )
    }

    /// Shorthand for a provider error without an underlying source.
    pub fn provider(message: impl Into<String>) -> Self {
        TallyError::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a memory store error without an underlying source.
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        TallyError::StoreUnavailable {
            message: message.into(),
            source: None,
        }
    }
}
