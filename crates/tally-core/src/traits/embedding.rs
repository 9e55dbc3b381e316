// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text-to-vector capability.

use async_trait::async_trait;

use crate::error::TallyError;
use crate::traits::adapter::PluginAdapter;

/// Converts text into a fixed-dimension vector.
///
/// Fails with [`TallyError::EmbeddingUnavailable`] on transport or provider
/// errors and [`TallyError::EmptyResult`] when no vector comes back. No
/// retries happen at this layer.
#[async_trait]
pub trait VectorEmbedder: PluginAdapter {
    /// Embeds a single text.
    async fn vectorize(&self, text: &str) -> Result<Vec<f32>, TallyError>;

    /// Dimension of every vector this embedder produces.
    fn dimensions(&self) -> usize;
}
