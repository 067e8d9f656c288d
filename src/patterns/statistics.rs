use std::collections::BTreeMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::{NamingConvention, PatternFingerprint};
use crate::parser::CodeUnit;

const COMMON_IMPORT_LIMIT: usize = 10;

/// Aggregate norms of a learned repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub unit_count: usize,
    pub dominant_naming: NamingConvention,
    pub median_complexity: f64,
    pub mean_nesting: f64,
    /// `None` when no unit declares a function or class
    pub mean_documentation: Option<f64>,
    pub error_handling_fraction: f64,
    /// Most used imports with the number of units using them
    pub common_imports: Vec<(String, usize)>,
    pub units_by_kind: BTreeMap<String, usize>,
    pub units_by_language: BTreeMap<String, usize>,
}

impl Default for IndexStatistics {
    #[inline]
    fn default() -> Self {
        Self {
            unit_count: 0,
            dominant_naming: NamingConvention::Unknown,
            median_complexity: 0.0,
            mean_nesting: 0.0,
            mean_documentation: None,
            error_handling_fraction: 0.0,
            common_imports: Vec::new(),
            units_by_kind: BTreeMap::new(),
            units_by_language: BTreeMap::new(),
        }
    }
}

#[inline]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[inline]
pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let squared: Vec<f64> = values.iter().map(|v| (v - mu).powi(2)).collect();
    mean(&squared).map(f64::sqrt)
}

#[inline]
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted: Vec<f64> = values.iter().copied().sorted_by(f64::total_cmp).collect();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(f64::midpoint(sorted[mid - 1], sorted[mid]))
    } else {
        Some(sorted[mid])
    }
}

/// Compute repository norms over every indexed unit
#[inline]
pub fn aggregate<'a>(
    entries: impl IntoIterator<Item = (&'a CodeUnit, &'a PatternFingerprint)>,
) -> IndexStatistics {
    let entries: Vec<_> = entries.into_iter().collect();
    if entries.is_empty() {
        return IndexStatistics::default();
    }

    let fingerprints: Vec<&PatternFingerprint> = entries.iter().map(|(_, f)| *f).collect();

    let naming_counts: Vec<(NamingConvention, usize)> = fingerprints
        .iter()
        .map(|f| f.naming_convention)
        .filter(|c| c.is_concrete())
        .counts()
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .collect();
    let dominant_naming = match naming_counts.as_slice() {
        [] => NamingConvention::Unknown,
        [(winner, _)] => *winner,
        [(winner, top), (_, second), ..] if top > second => *winner,
        _ => NamingConvention::Mixed,
    };

    let complexities: Vec<f64> = fingerprints.iter().map(|f| f.complexity).collect();
    let nestings: Vec<f64> = fingerprints.iter().map(|f| f.avg_nesting).collect();
    let documentation: Vec<f64> = fingerprints
        .iter()
        .filter_map(|f| f.documentation_ratio)
        .collect();
    let handlers: Vec<f64> = fingerprints
        .iter()
        .map(|f| if f.has_error_handling { 1.0 } else { 0.0 })
        .collect();

    let common_imports = fingerprints
        .iter()
        .flat_map(|f| f.imports.iter().cloned())
        .counts()
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .take(COMMON_IMPORT_LIMIT)
        .collect();

    let units_by_kind = entries
        .iter()
        .map(|(u, _)| u.kind.as_str().to_string())
        .counts()
        .into_iter()
        .collect();
    let units_by_language = entries
        .iter()
        .map(|(u, _)| u.language.clone())
        .counts()
        .into_iter()
        .collect();

    IndexStatistics {
        unit_count: entries.len(),
        dominant_naming,
        median_complexity: median(&complexities).unwrap_or(0.0),
        mean_nesting: mean(&nestings).unwrap_or(0.0),
        mean_documentation: mean(&documentation),
        error_handling_fraction: mean(&handlers).unwrap_or(0.0),
        common_imports,
        units_by_kind,
        units_by_language,
    }
}
