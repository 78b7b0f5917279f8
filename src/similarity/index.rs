//! In-memory embedding index with cosine similarity search.
//!
//! Holds one vector per prompt id for the lifetime of the process. A
//! rebuild discards everything and repopulates from scratch; there is no
//! incremental update path.

use std::collections::HashMap;

/// In-memory embedding index for similarity search.
///
/// `ordered_ids` mirrors the insertion order of the map so iteration is
/// deterministic; both are cleared together on rebuild.
#[derive(Debug, Default)]
pub struct EmbeddingIndex {
    embeddings_by_id: HashMap<String, Vec<f32>>,
    ordered_ids: Vec<String>,
}

/// A scored candidate from the index.
#[derive(Debug, Clone)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

impl EmbeddingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ordered_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered_ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.embeddings_by_id.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.embeddings_by_id.get(id).map(|v| v.as_slice())
    }

    /// Prompt ids in insertion order.
    pub fn ids(&self) -> &[String] {
        &self.ordered_ids
    }

    /// Insert or replace the embedding for a prompt id.
    pub fn insert(&mut self, id: impl Into<String>, embedding: Vec<f32>) {
        let id = id.into();
        if self.embeddings_by_id.insert(id.clone(), embedding).is_none() {
            self.ordered_ids.push(id);
        }
    }

    /// Drop every entry. Both structures are emptied before a rebuild
    /// repopulates them.
    pub fn clear(&mut self) {
        self.embeddings_by_id.clear();
        self.ordered_ids.clear();
    }

    /// Score every indexed prompt except `exclude_id` against the query
    /// vector, best first, at most `limit` results.
    pub fn search(&self, query: &[f32], exclude_id: &str, limit: usize) -> Vec<ScoredId> {
        let mut results: Vec<ScoredId> = self
            .ordered_ids
            .iter()
            .filter(|id| id.as_str() != exclude_id)
            .filter_map(|id| {
                self.embeddings_by_id.get(id).map(|embedding| ScoredId {
                    id: id.clone(),
                    score: cosine_similarity(query, embedding),
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);

        results
    }
}

/// Cosine similarity of two vectors.
///
/// Returns 0.0 when either vector has (near) zero norm or the lengths
/// differ, so the caller never sees NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();

    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
