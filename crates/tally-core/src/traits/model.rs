// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming, tool-constrained analysis model capability.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::TallyError;
use crate::traits::adapter::PluginAdapter;
use crate::types::AnalysisRequest;

/// Ordered text fragments that concatenate into one JSON object.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, TallyError>> + Send>>;

/// Extracts a structured expense analysis from free text.
#[async_trait]
pub trait AnalysisModel: PluginAdapter {
    /// Starts one analysis and returns its fragment stream.
    ///
    /// The stream is finite and not restartable. An `Err` item means the
    /// stream broke; whatever was produced before it is not a valid result.
    async fn analyze(&self, request: AnalysisRequest) -> Result<FragmentStream, TallyError>;
}
