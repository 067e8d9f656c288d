
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::patterns::IndexStatistics;

/// Catalog row binding an index name to its current vector table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PatternIndexRecord {
    pub id: i64,
    pub name: String,
    pub source: String,
    pub table_name: String,
    pub embedding_model: String,
    pub dimension: i64,
    pub unit_count: i64,
    pub file_count: i64,
    /// JSON encoded [`IndexStatistics`]
    pub statistics: String,
    pub created_date: NaiveDateTime,
    pub indexed_date: NaiveDateTime,
}

impl PatternIndexRecord {
    #[inline]
    pub fn parsed_statistics(&self) -> Result<IndexStatistics> {
        serde_json::from_str(&self.statistics)
            .with_context(|| format!("Corrupt statistics for index '{}'", self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPatternIndex {
    pub name: String,
    pub source: String,
    pub table_name: String,
    pub embedding_model: String,
    pub dimension: i64,
    pub unit_count: i64,
    pub file_count: i64,
    pub statistics: IndexStatistics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IndexWarning {
    pub id: i64,
    pub index_id: i64,
    pub file_path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIndexWarning {
    pub file_path: String,
    pub reason: String,
}

/// Outcome of binding a name to a new snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindOutcome {
    pub record: PatternIndexRecord,
    /// Vector table of the snapshot that was replaced, if any
    pub previous_table: Option<String>,
}
