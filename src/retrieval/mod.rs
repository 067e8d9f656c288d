//! Nearest-neighbor retrieval over a loaded pattern index.
//!
//! Search is exact: every indexed embedding is scored by cosine similarity,
//! so results are deterministic for a given snapshot and query.


use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::embeddings::Embedder;
use crate::index::{IndexedUnit, PatternIndex};
use crate::parser::CodeUnit;
use crate::{Result, ReviewError};

pub const DEFAULT_TOP_K: usize = 5;

/// An indexed unit with its similarity to the query
#[derive(Debug, Clone, Copy)]
pub struct Neighbor<'a> {
    pub entry: &'a IndexedUnit,
    pub similarity: f32,
}

/// Cosine similarity, 0.0 when either vector has no magnitude
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// The `k` most similar units, highest similarity first, ties in insertion order
///
/// Returns exactly `min(k, index.len())` neighbors.
#[inline]
pub fn nearest<'a>(index: &'a PatternIndex, query: &[f32], k: usize) -> Result<Vec<Neighbor<'a>>> {
    if query.len() != index.dimension() {
        return Err(ReviewError::RetrievalBackendUnavailable(format!(
            "query has {} dimensions but index '{}' stores {}",
            query.len(),
            index.name(),
            index.dimension()
        )));
    }

    let mut scored: Vec<Neighbor<'a>> = index
        .units()
        .iter()
        .map(|entry| Neighbor {
            entry,
            similarity: cosine_similarity(query, &entry.embedding),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.entry.ordinal.cmp(&b.entry.ordinal))
    });
    scored.truncate(k);

    Ok(scored)
}

/// Embeds candidates and searches a snapshot
#[derive(Clone)]
pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl std::fmt::Debug for RetrievalEngine {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("embedder", &self.embedder.model_name())
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl RetrievalEngine {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
        Self { embedder, top_k }
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed one candidate unit
    ///
    /// Embedding failures are fatal for a review, so they surface as
    /// [`ReviewError::RetrievalBackendUnavailable`].
    #[inline]
    pub async fn embed_unit(&self, unit: &CodeUnit) -> Result<Vec<f32>> {
        self.embedder
            .embed(&crate::embeddings::embedding_text(unit))
            .await
            .map_err(|e| ReviewError::RetrievalBackendUnavailable(e.to_string()))
    }

    /// Embed every candidate unit in one batch, in input order
    #[inline]
    pub async fn embed_units(&self, units: &[CodeUnit]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = units
            .iter()
            .map(crate::embeddings::embedding_text)
            .collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| ReviewError::RetrievalBackendUnavailable(e.to_string()))?;

        if vectors.len() != units.len() {
            return Err(ReviewError::RetrievalBackendUnavailable(format!(
                "embedder returned {} vectors for {} units",
                vectors.len(),
                units.len()
            )));
        }
        Ok(vectors)
    }

    /// Embed `unit` and return its nearest indexed neighbors
    #[inline]
    pub async fn retrieve<'a>(
        &self,
        index: &'a PatternIndex,
        unit: &CodeUnit,
    ) -> Result<Vec<Neighbor<'a>>> {
        let query = self.embed_unit(unit).await?;
        let neighbors = nearest(index, &query, self.top_k)?;
        debug!(
            "Retrieved {} neighbors for {} from '{}'",
            neighbors.len(),
            unit.label(),
            index.name()
        );
        Ok(neighbors)
    }
}
