//! Structural and stylistic fingerprints of code units.
//!
//! Extraction is a pure function of the [`CodeUnit`]: the same unit always
//! yields the same fingerprint, which keeps re-learning idempotent.


mod layout;
mod naming;
mod statistics;

use serde::{Deserialize, Serialize};

use crate::parser::{CodeUnit, DeclarationKind};

pub use layout::{Indentation, detect_indentation, longest_line};
pub use naming::{NamingConvention, NamingVote, classify, vote};
pub use statistics::{IndexStatistics, aggregate, mean, median, population_std_dev};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternFingerprint {
    pub naming_convention: NamingConvention,
    pub avg_nesting: f64,
    pub max_nesting: u32,
    /// Decision points per ten non-blank lines
    pub complexity: f64,
    /// Documented definitions over definitions; `None` without definitions
    pub documentation_ratio: Option<f64>,
    pub has_error_handling: bool,
    pub imports: Vec<String>,
    pub line_count: u32,
    #[serde(default)]
    pub naming_samples: Vec<String>,
    #[serde(default)]
    pub indentation: Indentation,
    #[serde(default)]
    pub max_line_length: u32,
    /// Writes to stdout or stderr directly
    #[serde(default)]
    pub prints: bool,
    /// Goes through a logger
    #[serde(default)]
    pub logs: bool,
}

/// Derive the fingerprint of a unit from its syntactic outline
#[inline]
pub fn extract(unit: &CodeUnit) -> PatternFingerprint {
    let outline = &unit.outline;

    // type names follow their own convention in every supported language
    let naming = vote(
        outline
            .declarations
            .iter()
            .filter(|d| d.kind != DeclarationKind::Class)
            .map(|d| d.name.as_str()),
    );

    let depths: Vec<f64> = outline.nesting_depths.iter().map(|d| f64::from(*d)).collect();
    let avg_nesting = mean(&depths).unwrap_or(0.0);
    let max_nesting = outline.nesting_depths.iter().copied().max().unwrap_or(0);

    let scale = (f64::from(outline.line_count) / 10.0).max(1.0);
    let complexity = (1.0 + f64::from(outline.branch_count)) / scale;

    let (documented, definitions) = outline
        .declarations
        .iter()
        .filter(|d| d.kind.is_definition())
        .fold((0_u32, 0_u32), |(documented, total), d| {
            (documented + u32::from(d.documented), total + 1)
        });
    let documentation_ratio =
        (definitions > 0).then(|| f64::from(documented) / f64::from(definitions));

    let mut imports = unit.imports.clone();
    imports.sort();
    imports.dedup();

    PatternFingerprint {
        naming_convention: naming.convention,
        avg_nesting,
        max_nesting,
        complexity,
        documentation_ratio,
        has_error_handling: outline.has_error_handling,
        imports,
        line_count: outline.line_count,
        naming_samples: naming.samples,
        indentation: detect_indentation(&unit.source),
        max_line_length: longest_line(&unit.source),
        prints: outline.print_calls > 0,
        logs: outline.logging_calls > 0,
    }
}
