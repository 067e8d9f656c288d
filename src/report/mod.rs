//! Findings and the review report exchange format.
//!
//! A [`Report`] is the terminal artifact of a review run. It serializes to
//! JSON with a stable field layout so bots and front ends can consume it
//! without knowing anything about fingerprints or embeddings.


use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Finding category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Style,
    Structure,
    BestPractice,
    Maintainability,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Style,
        Category::Structure,
        Category::BestPractice,
        Category::Maintainability,
    ];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Style => "style",
            Category::Structure => "structure",
            Category::BestPractice => "best-practice",
            Category::Maintainability => "maintainability",
        }
    }

    /// Map a free-form category label onto one of the four report categories.
    ///
    /// Returns `None` when the label is not recognizable.
    #[inline]
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        match normalized.as_str() {
            "style" | "naming" | "formatting" | "convention" | "conventions" => {
                Some(Category::Style)
            }
            "structure" | "structural" | "complexity" | "design" | "architecture" => {
                Some(Category::Structure)
            }
            "bestpractice" | "bestpractices" | "errorhandling" | "security" | "performance"
            | "bug" | "bugs" | "correctness" => Some(Category::BestPractice),
            "maintainability" | "documentation" | "readability" | "testing" | "tests" => {
                Some(Category::Maintainability)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finding severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    #[inline]
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" | "minor" | "info" => Some(Severity::Low),
            "medium" | "moderate" | "warning" => Some(Severity::Medium),
            "high" | "critical" | "major" | "error" => Some(Severity::High),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a finding is based on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Evidence {
    /// A measured deviation from the retrieved neighbors
    Deviation {
        attribute: String,
        observed: String,
        expected: String,
    },
    /// A statement from the model critique that was mapped onto the unit
    Model { statement: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub category: Category,
    pub severity: Severity,
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

/// Identity used to deduplicate findings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FindingKey {
    pub category: Category,
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
    pub message: String,
}

impl Finding {
    #[inline]
    pub fn key(&self) -> FindingKey {
        FindingKey {
            category: self.category,
            file: self.file.clone(),
            line_start: self.line_start,
            line_end: self.line_end,
            message: normalize_message(&self.message),
        }
    }

    #[inline]
    pub fn has_evidence(&self) -> bool {
        !self.evidence.is_empty()
    }

    /// Whether a structural deviation backs this finding
    #[inline]
    pub fn is_structural(&self) -> bool {
        self.evidence
            .iter()
            .any(|e| matches!(e, Evidence::Deviation { .. }))
    }
}

/// Lowercase, collapse whitespace and drop trailing punctuation
#[inline]
pub fn normalize_message(message: &str) -> String {
    message
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .trim_end_matches(['.', '!', ';', ':', ','])
        .to_string()
}

/// A candidate unit that matches the learned norms with nothing to report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Praise {
    pub file: String,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub total: usize,
    #[serde(default)]
    pub by_category: BTreeMap<String, usize>,
    /// Set when the qualitative (model-backed) pass was skipped for any unit
    #[serde(default)]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Summary {
    fn from_findings(findings: &[Finding], degraded: bool, notes: Vec<String>) -> Self {
        let mut summary = Summary {
            degraded,
            notes,
            ..Default::default()
        };

        for finding in findings {
            match finding.severity {
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }
            *summary
                .by_category
                .entry(finding.category.as_str().to_string())
                .or_default() += 1;
        }
        summary.total = findings.len();

        summary
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub index_name: String,
    pub summary: Summary,
    pub findings: Vec<Finding>,
    pub praised: Vec<Praise>,
}

impl Report {
    /// Assemble a report: drops unsupported findings, deduplicates, orders by
    /// severity and location, and computes the summary.
    #[inline]
    pub fn assemble(
        index_name: impl Into<String>,
        findings: Vec<Finding>,
        praised: Vec<Praise>,
        degraded: bool,
        notes: Vec<String>,
    ) -> Self {
        let mut findings = dedup_findings(findings.into_iter().filter(Finding::has_evidence));
        sort_findings(&mut findings);

        Self {
            index_name: index_name.into(),
            summary: Summary::from_findings(&findings, degraded, notes),
            findings,
            praised,
        }
    }

    #[inline]
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize report: {}", e).into())
    }

    #[inline]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| anyhow::anyhow!("Failed to parse report: {}", e).into())
    }
}

/// Merge findings that share a [`FindingKey`], keeping the first occurrence
/// and folding in the evidence and suggested fix of later ones.
#[inline]
pub fn dedup_findings(findings: impl IntoIterator<Item = Finding>) -> Vec<Finding> {
    let mut merged: Vec<Finding> = Vec::new();
    let mut positions: HashMap<FindingKey, usize> = HashMap::new();

    for finding in findings {
        let key = finding.key();
        if let Some(&idx) = positions.get(&key) {
            let existing = &mut merged[idx];
            // Structural severity is deterministic and wins over model severity
            if finding.is_structural() && !existing.is_structural() {
                existing.severity = finding.severity;
            }
            for evidence in finding.evidence {
                if !existing.evidence.contains(&evidence) {
                    existing.evidence.push(evidence);
                }
            }
            if existing.suggested_fix.is_none() {
                existing.suggested_fix = finding.suggested_fix;
            }
        } else {
            positions.insert(key, merged.len());
            merged.push(finding);
        }
    }

    merged
}

/// High severity first, then by location
#[inline]
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.file.cmp(&b.file))
            .then_with(|| a.line_start.cmp(&b.line_start))
            .then_with(|| a.line_end.cmp(&b.line_end))
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| a.message.cmp(&b.message))
    });
}

/// Distinct (category, location, message) keys, for invariant checks
#[inline]
pub fn distinct_keys(findings: &[Finding]) -> HashSet<FindingKey> {
    findings.iter().map(Finding::key).collect()
}
