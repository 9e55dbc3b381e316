// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector encoding and similarity helpers.

use std::cmp::Ordering;

use tally_core::{MemoryEntry, ScoredMemory};

/// Encode a vector as little-endian f32 bytes for a BLOB column.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a BLOB column back into a vector. Trailing partial bytes are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in `-1.0..=1.0`.
///
/// Mismatched lengths, empty vectors and zero vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 { 0.0 } else { dot / denom }
}

/// Score `entries` against `query`, drop those under `threshold`, and keep
/// the `limit` best. Equal scores keep their input order.
pub fn rank(
    entries: Vec<MemoryEntry>,
    query: &[f32],
    threshold: Option<f32>,
    limit: usize,
) -> Vec<ScoredMemory> {
    let mut scored: Vec<ScoredMemory> = entries
        .into_iter()
        .map(|entry| {
            let score = cosine_similarity(&entry.embedding, query);
            ScoredMemory { entry, score }
        })
        .filter(|s| threshold.is_none_or(|t| s.score >= t))
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored.truncate(limit);
    scored
}
