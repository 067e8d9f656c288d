//! Comparing a candidate fingerprint against its retrieved neighbors.
//!
//! Everything here is deterministic: the same candidate and neighbors always
//! produce the same deviations in the same order.

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::patterns::{Indentation, NamingConvention, PatternFingerprint, mean, population_std_dev};
use crate::report::{Category, Severity};

/// A fingerprint attribute a deviation can be reported on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    NamingConvention,
    DocumentationRatio,
    Complexity,
    NestingDepth,
    ErrorHandling,
    Imports,
    Indentation,
    LineLength,
    Logging,
}

impl Attribute {
    pub const ALL: [Attribute; 9] = [
        Attribute::NamingConvention,
        Attribute::DocumentationRatio,
        Attribute::Complexity,
        Attribute::NestingDepth,
        Attribute::ErrorHandling,
        Attribute::Imports,
        Attribute::Indentation,
        Attribute::LineLength,
        Attribute::Logging,
    ];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Attribute::NamingConvention => "naming_convention",
            Attribute::DocumentationRatio => "documentation_ratio",
            Attribute::Complexity => "complexity",
            Attribute::NestingDepth => "nesting_depth",
            Attribute::ErrorHandling => "error_handling",
            Attribute::Imports => "imports",
            Attribute::Indentation => "indentation",
            Attribute::LineLength => "line_length",
            Attribute::Logging => "logging",
        }
    }

    #[inline]
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == normalized)
            .or(match normalized.as_str() {
                "naming" => Some(Attribute::NamingConvention),
                "documentation" | "docs" => Some(Attribute::DocumentationRatio),
                "nesting" => Some(Attribute::NestingDepth),
                "indent" => Some(Attribute::Indentation),
                "max_line_length" => Some(Attribute::LineLength),
                "print" | "output" => Some(Attribute::Logging),
                _ => None,
            })
    }

    #[inline]
    pub fn category(self) -> Category {
        match self {
            Attribute::NamingConvention | Attribute::Indentation | Attribute::LineLength => {
                Category::Style
            }
            Attribute::DocumentationRatio | Attribute::Imports => Category::Maintainability,
            Attribute::Complexity | Attribute::NestingDepth => Category::Structure,
            Attribute::ErrorHandling | Attribute::Logging => Category::BestPractice,
        }
    }

    #[inline]
    pub fn severity(self) -> Severity {
        match self {
            Attribute::NamingConvention | Attribute::Complexity | Attribute::Logging => {
                Severity::Medium
            }
            Attribute::DocumentationRatio
            | Attribute::NestingDepth
            | Attribute::Imports
            | Attribute::Indentation
            | Attribute::LineLength => Severity::Low,
            Attribute::ErrorHandling => Severity::High,
        }
    }

    /// Lowercase stems a free-text critique uses when talking about this attribute
    #[inline]
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Attribute::NamingConvention => &[
                "naming",
                "name",
                "camel",
                "snake",
                "pascal",
                "identifier",
                "convention",
            ],
            Attribute::DocumentationRatio => &["doc", "comment"],
            Attribute::Complexity => &["complex", "branch", "simplif", "cyclomatic"],
            Attribute::NestingDepth => &["nest", "indent", "depth", "early return"],
            Attribute::ErrorHandling => &["error", "exception", "try", "catch", "handl"],
            Attribute::Imports => &["import", "dependenc", "require", "library"],
            Attribute::Indentation => &["indentation", "tabs", "spaces"],
            Attribute::LineLength => &["line length", "long line", "characters", "wrap"],
            Attribute::Logging => &["print", "logging", "logger", "console."],
        }
    }

    #[inline]
    pub fn mentioned_in(self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.keywords().iter().any(|k| lowered.contains(k))
    }
}

impl fmt::Display for Attribute {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tolerances of the comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Standard deviations a numeric attribute may stray from the neighbor mean
    pub std_multiplier: f64,
    pub complexity_floor: f64,
    pub nesting_floor: f64,
    pub documentation_floor: f64,
    pub line_length_floor: f64,
    /// Fraction of neighbors handling errors above which a missing handler counts
    pub error_handling_consensus: f64,
}

impl Default for Thresholds {
    #[inline]
    fn default() -> Self {
        Self {
            std_multiplier: 1.0,
            complexity_floor: 0.5,
            nesting_floor: 0.5,
            documentation_floor: 0.25,
            line_length_floor: 20.0,
            error_handling_consensus: 0.8,
        }
    }
}

/// A measured difference between a candidate and the norm of its neighbors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deviation {
    pub attribute: Attribute,
    pub observed: String,
    pub expected: String,
    pub message: String,
    pub suggested_fix: String,
}

impl Deviation {
    #[inline]
    pub fn category(&self) -> Category {
        self.attribute.category()
    }

    #[inline]
    pub fn severity(&self) -> Severity {
        self.attribute.severity()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DifferenceAnalyzer {
    thresholds: Thresholds,
}

impl DifferenceAnalyzer {
    #[inline]
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    #[inline]
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Deviations of `candidate` from `neighbors`, in [`Attribute`] order.
    ///
    /// Without neighbors there is no norm and nothing deviates.
    #[inline]
    pub fn analyze(
        &self,
        candidate: &PatternFingerprint,
        neighbors: &[&PatternFingerprint],
    ) -> Vec<Deviation> {
        if neighbors.is_empty() {
            return Vec::new();
        }

        let deviations: Vec<Deviation> = [
            self.naming(candidate, neighbors),
            self.documentation(candidate, neighbors),
            self.complexity(candidate, neighbors),
            self.nesting(candidate, neighbors),
            self.error_handling(candidate, neighbors),
            self.imports(candidate, neighbors),
            self.indentation(candidate, neighbors),
            self.line_length(candidate, neighbors),
            self.logging(candidate, neighbors),
        ]
        .into_iter()
        .flatten()
        .collect();

        debug!(
            "{} deviations against {} neighbors",
            deviations.len(),
            neighbors.len()
        );
        deviations
    }

    fn tolerance(&self, values: &[f64], floor: f64) -> Option<(f64, f64)> {
        let mu = mean(values)?;
        let sigma = population_std_dev(values)?;
        Some((mu, (sigma * self.thresholds.std_multiplier).max(floor)))
    }

    fn naming(
        &self,
        candidate: &PatternFingerprint,
        neighbors: &[&PatternFingerprint],
    ) -> Option<Deviation> {
        if candidate.naming_convention == NamingConvention::Unknown {
            return None;
        }

        let known: Vec<NamingConvention> = neighbors
            .iter()
            .map(|n| n.naming_convention)
            .filter(|c| *c != NamingConvention::Unknown)
            .collect();
        let (norm, count) = known
            .iter()
            .copied()
            .counts()
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))?;

        // strict majority, and only a concrete convention can be a norm
        if count * 2 <= known.len() || !norm.is_concrete() || candidate.naming_convention == norm {
            return None;
        }

        let samples = if candidate.naming_samples.is_empty() {
            String::new()
        } else {
            format!(" ({})", candidate.naming_samples.join(", "))
        };
        let suggested_fix = candidate
            .naming_samples
            .first()
            .and_then(|sample| {
                norm.apply(sample)
                    .map(|renamed| format!("Rename `{sample}` to `{renamed}` and follow {norm} for the other identifiers"))
            })
            .unwrap_or_else(|| format!("Rename identifiers to follow {norm}"));

        Some(Deviation {
            attribute: Attribute::NamingConvention,
            observed: candidate.naming_convention.to_string(),
            expected: norm.to_string(),
            message: format!(
                "Identifiers use {}{} while similar code uses {}",
                candidate.naming_convention, samples, norm
            ),
            suggested_fix,
        })
    }

    fn documentation(
        &self,
        candidate: &PatternFingerprint,
        neighbors: &[&PatternFingerprint],
    ) -> Option<Deviation> {
        let observed = candidate.documentation_ratio?;
        let values: Vec<f64> = neighbors
            .iter()
            .filter_map(|n| n.documentation_ratio)
            .collect();
        let (mu, tolerance) = self.tolerance(&values, self.thresholds.documentation_floor)?;

        (observed < mu - tolerance).then(|| Deviation {
            attribute: Attribute::DocumentationRatio,
            observed: format!("{:.0}%", observed * 100.0),
            expected: format!("{:.0}%", mu * 100.0),
            message: format!(
                "{:.0}% of definitions are documented while similar code documents {:.0}%",
                observed * 100.0,
                mu * 100.0
            ),
            suggested_fix: "Add doc comments to the undocumented definitions".to_string(),
        })
    }

    fn complexity(
        &self,
        candidate: &PatternFingerprint,
        neighbors: &[&PatternFingerprint],
    ) -> Option<Deviation> {
        let values: Vec<f64> = neighbors.iter().map(|n| n.complexity).collect();
        let (mu, tolerance) = self.tolerance(&values, self.thresholds.complexity_floor)?;

        (candidate.complexity > mu + tolerance).then(|| Deviation {
            attribute: Attribute::Complexity,
            observed: format!("{:.2}", candidate.complexity),
            expected: format!("{mu:.2}"),
            message: format!(
                "Complexity of {:.2} decision points per ten lines is above the {:.2} of similar code",
                candidate.complexity, mu
            ),
            suggested_fix: "Split the logic into smaller functions or simplify the branching"
                .to_string(),
        })
    }

    fn nesting(
        &self,
        candidate: &PatternFingerprint,
        neighbors: &[&PatternFingerprint],
    ) -> Option<Deviation> {
        let values: Vec<f64> = neighbors.iter().map(|n| n.avg_nesting).collect();
        let (mu, tolerance) = self.tolerance(&values, self.thresholds.nesting_floor)?;

        (candidate.avg_nesting > mu + tolerance).then(|| Deviation {
            attribute: Attribute::NestingDepth,
            observed: format!("{:.2}", candidate.avg_nesting),
            expected: format!("{mu:.2}"),
            message: format!(
                "Average nesting depth of {:.2} (max {}) is deeper than the {:.2} of similar code",
                candidate.avg_nesting, candidate.max_nesting, mu
            ),
            suggested_fix: "Use early returns or extract nested blocks into helpers".to_string(),
        })
    }

    fn error_handling(
        &self,
        candidate: &PatternFingerprint,
        neighbors: &[&PatternFingerprint],
    ) -> Option<Deviation> {
        if candidate.has_error_handling {
            return None;
        }

        let handling: Vec<f64> = neighbors
            .iter()
            .map(|n| if n.has_error_handling { 1.0 } else { 0.0 })
            .collect();
        let fraction = mean(&handling)?;

        (fraction >= self.thresholds.error_handling_consensus).then(|| Deviation {
            attribute: Attribute::ErrorHandling,
            observed: "no error handling".to_string(),
            expected: format!("error handling in {:.0}% of similar code", fraction * 100.0),
            message: format!(
                "No error handling while {:.0}% of similar code handles errors",
                fraction * 100.0
            ),
            suggested_fix:
                "Handle failures of external calls the way similar code does (for example a try/except or error return)"
                    .to_string(),
        })
    }

    fn imports(
        &self,
        candidate: &PatternFingerprint,
        neighbors: &[&PatternFingerprint],
    ) -> Option<Deviation> {
        let known: BTreeSet<&str> = neighbors
            .iter()
            .flat_map(|n| n.imports.iter().map(String::as_str))
            .collect();
        if known.is_empty() {
            return None;
        }

        let unusual: Vec<&str> = candidate
            .imports
            .iter()
            .map(String::as_str)
            .filter(|i| !known.contains(i))
            .collect();
        if unusual.is_empty() {
            return None;
        }

        let listed = unusual.join(", ");
        Some(Deviation {
            attribute: Attribute::Imports,
            observed: listed.clone(),
            expected: known.iter().join(", "),
            message: format!("Imports {listed} which no similar code uses"),
            suggested_fix: format!(
                "Check whether {listed} is needed or use the libraries similar code relies on"
            ),
        })
    }

    fn indentation(
        &self,
        candidate: &PatternFingerprint,
        neighbors: &[&PatternFingerprint],
    ) -> Option<Deviation> {
        if !candidate.indentation.is_known() {
            return None;
        }

        let known: Vec<Indentation> = neighbors
            .iter()
            .map(|n| n.indentation)
            .filter(|i| i.is_known())
            .collect();
        let (norm, count) = known
            .iter()
            .copied()
            .counts()
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))?;

        if count * 2 <= known.len() || candidate.indentation == norm {
            return None;
        }

        Some(Deviation {
            attribute: Attribute::Indentation,
            observed: candidate.indentation.to_string(),
            expected: norm.to_string(),
            message: format!(
                "Indents with {} while similar code indents with {}",
                candidate.indentation, norm
            ),
            suggested_fix: format!("Re-indent the code with {norm}"),
        })
    }

    fn line_length(
        &self,
        candidate: &PatternFingerprint,
        neighbors: &[&PatternFingerprint],
    ) -> Option<Deviation> {
        let values: Vec<f64> = neighbors
            .iter()
            .map(|n| f64::from(n.max_line_length))
            .collect();
        let (mu, tolerance) = self.tolerance(&values, self.thresholds.line_length_floor)?;
        let observed = f64::from(candidate.max_line_length);
        if observed <= mu + tolerance {
            return None;
        }

        let limit = neighbors.iter().map(|n| n.max_line_length).max().unwrap_or(0);
        Some(Deviation {
            attribute: Attribute::LineLength,
            observed: candidate.max_line_length.to_string(),
            expected: format!("{mu:.0}"),
            message: format!(
                "Longest line has {} characters while the longest lines of similar code average {:.0}",
                candidate.max_line_length, mu
            ),
            suggested_fix: format!("Wrap lines to stay within {limit} characters"),
        })
    }

    fn logging(
        &self,
        candidate: &PatternFingerprint,
        neighbors: &[&PatternFingerprint],
    ) -> Option<Deviation> {
        if !candidate.prints || candidate.logs {
            return None;
        }

        let loggers = neighbors.iter().filter(|n| n.logs).count();
        if loggers == 0 || neighbors.iter().any(|n| n.prints) {
            return None;
        }

        Some(Deviation {
            attribute: Attribute::Logging,
            observed: "print calls".to_string(),
            expected: format!("a logger in {loggers} of {} similar units", neighbors.len()),
            message: "Writes output with print calls while similar code logs through a logger"
                .to_string(),
            suggested_fix: "Replace the print calls with the logger similar code uses".to_string(),
        })
    }
}
