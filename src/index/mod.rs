//! Learned pattern indexes.
//!
//! A [`PatternIndex`] is an immutable snapshot of one learned repository:
//! every extracted unit with its fingerprint and embedding, in insertion
//! order, plus the aggregate norms of the whole repository. Rebuilding a
//! repository produces a new snapshot; the [`IndexRegistry`] swaps the name
//! binding so reviews that already hold the previous `Arc` are unaffected.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::parser::CodeUnit;
use crate::patterns::{IndexStatistics, PatternFingerprint, aggregate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedUnit {
    /// Position in insertion order, used to break similarity ties
    pub ordinal: usize,
    pub unit: CodeUnit,
    pub fingerprint: PatternFingerprint,
    pub embedding: Vec<f32>,
}

/// Identity and provenance of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub name: String,
    /// Repository path or URL the index was learned from
    pub source: String,
    /// Vector table holding this snapshot's rows
    pub table_name: String,
    pub embedding_model: String,
    pub dimension: usize,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternIndex {
    metadata: IndexMetadata,
    units: Vec<IndexedUnit>,
    statistics: IndexStatistics,
}

impl PatternIndex {
    /// Build a snapshot from triples in insertion order
    #[inline]
    pub fn build(
        metadata: IndexMetadata,
        entries: impl IntoIterator<Item = (CodeUnit, PatternFingerprint, Vec<f32>)>,
    ) -> Self {
        let units: Vec<IndexedUnit> = entries
            .into_iter()
            .enumerate()
            .map(|(ordinal, (unit, fingerprint, embedding))| IndexedUnit {
                ordinal,
                unit,
                fingerprint,
                embedding,
            })
            .collect();

        Self::from_units(metadata, units)
    }

    /// Rebuild a snapshot from stored rows, restoring insertion order
    #[inline]
    pub fn from_units(metadata: IndexMetadata, mut units: Vec<IndexedUnit>) -> Self {
        units.sort_by_key(|u| u.ordinal);
        let statistics = aggregate(units.iter().map(|u| (&u.unit, &u.fingerprint)));
        debug!(
            "Built pattern index '{}' with {} units",
            metadata.name,
            units.len()
        );

        Self {
            metadata,
            units,
            statistics,
        }
    }

    #[inline]
    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.metadata.dimension
    }

    #[inline]
    pub fn units(&self) -> &[IndexedUnit] {
        &self.units
    }

    #[inline]
    pub fn statistics(&self) -> &IndexStatistics {
        &self.statistics
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Name to snapshot bindings shared by learning and review
#[derive(Debug, Default)]
pub struct IndexRegistry {
    indexes: RwLock<HashMap<String, Arc<PatternIndex>>>,
}

impl IndexRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub async fn get(&self, name: &str) -> Option<Arc<PatternIndex>> {
        self.indexes.read().await.get(name).cloned()
    }

    /// Bind `index` under its name, returning the snapshot it replaced
    #[inline]
    pub async fn bind(&self, index: Arc<PatternIndex>) -> Option<Arc<PatternIndex>> {
        let name = index.name().to_string();
        self.indexes.write().await.insert(name, index)
    }

    #[inline]
    pub async fn remove(&self, name: &str) -> Option<Arc<PatternIndex>> {
        self.indexes.write().await.remove(name)
    }

    #[inline]
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexes.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
