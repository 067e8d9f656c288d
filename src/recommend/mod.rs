//! Turning deviations and model critique into findings.
//!
//! Structural findings come straight from the [`Deviation`]s and are fully
//! deterministic. The model pass may add findings or extra evidence, but it
//! never changes the severity or category of a structural finding, and any
//! failure of the model only drops its contribution.

mod answer;
mod prompt;


use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::analysis::Deviation;
use crate::config::CategoryToggles;
use crate::llm::ModelBackend;
use crate::parser::CodeUnit;
use crate::report::{Evidence, Finding, Praise};
use crate::retrieval::Neighbor;

pub use answer::{ModelIssue, parse_answer};
pub use prompt::{MAX_EXAMPLES, SYSTEM_PROMPT, build_prompt, neighbor_summary};

/// Whether the model critique contributed to a unit's findings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualitativePass {
    Completed,
    /// Structural findings only, with the reason
    Skipped(String),
}

impl QualitativePass {
    #[inline]
    pub fn is_skipped(&self) -> bool {
        matches!(self, QualitativePass::Skipped(_))
    }
}

/// Outcome of reviewing one candidate unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReview {
    pub findings: Vec<Finding>,
    pub praise: Option<Praise>,
    pub qualitative: QualitativePass,
}

/// One finding per deviation, located on the whole unit
#[inline]
pub fn structural_findings(unit: &CodeUnit, deviations: &[Deviation]) -> Vec<Finding> {
    deviations
        .iter()
        .map(|deviation| Finding {
            category: deviation.category(),
            severity: deviation.severity(),
            file: unit.file_path.clone(),
            line_start: unit.start_line,
            line_end: unit.end_line,
            message: deviation.message.clone(),
            suggested_fix: Some(deviation.suggested_fix.clone()).filter(|fix| !fix.is_empty()),
            evidence: vec![Evidence::Deviation {
                attribute: deviation.attribute.as_str().to_string(),
                observed: deviation.observed.clone(),
                expected: deviation.expected.clone(),
            }],
        })
        .collect()
}

fn model_finding(unit: &CodeUnit, issue: ModelIssue) -> Finding {
    Finding {
        category: issue.category,
        severity: issue.severity,
        file: unit.file_path.clone(),
        line_start: issue.line_start,
        line_end: issue.line_end,
        evidence: vec![Evidence::Model {
            statement: issue.message.clone(),
        }],
        message: issue.message,
        suggested_fix: issue.suggested_fix,
    }
}

/// Fold model issues into the structural findings built from `deviations`.
///
/// An issue joins a structural finding when it names the same attribute, or
/// shares its category and talks about the attribute. Unmatched issues
/// become findings of their own.
#[inline]
pub fn merge(unit: &CodeUnit, deviations: &[Deviation], issues: Vec<ModelIssue>) -> Vec<Finding> {
    let mut findings = structural_findings(unit, deviations);

    for issue in issues {
        let matched = deviations.iter().position(|deviation| {
            issue.attribute == Some(deviation.attribute)
                || (issue.category == deviation.category()
                    && deviation.attribute.mentioned_in(&issue.message))
        });

        match matched {
            Some(position) => {
                let finding = &mut findings[position];
                let evidence = Evidence::Model {
                    statement: issue.message,
                };
                if !finding.evidence.contains(&evidence) {
                    finding.evidence.push(evidence);
                }
                if finding.suggested_fix.is_none() {
                    finding.suggested_fix = issue.suggested_fix;
                }
            }
            None => findings.push(model_finding(unit, issue)),
        }
    }

    findings
}

#[derive(Clone)]
pub struct RecommendationGenerator {
    backend: Option<Arc<dyn ModelBackend>>,
    categories: CategoryToggles,
}

impl std::fmt::Debug for RecommendationGenerator {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecommendationGenerator")
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .field("categories", &self.categories)
            .finish()
    }
}

impl RecommendationGenerator {
    #[inline]
    pub fn new(backend: Option<Arc<dyn ModelBackend>>, categories: CategoryToggles) -> Self {
        Self {
            backend,
            categories,
        }
    }

    #[inline]
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    async fn critique(
        &self,
        unit: &CodeUnit,
        neighbors: &[Neighbor<'_>],
        deviations: &[Deviation],
        cancel: &CancellationToken,
    ) -> Result<Vec<ModelIssue>, String> {
        let Some(backend) = &self.backend else {
            return Err("no model backend configured".to_string());
        };
        if cancel.is_cancelled() {
            return Err("review cancelled".to_string());
        }

        let prompt = build_prompt(unit, neighbors, deviations);
        let answer = tokio::select! {
            () = cancel.cancelled() => return Err("review cancelled".to_string()),
            answer = backend.complete(SYSTEM_PROMPT, &prompt) => answer,
        };

        answer
            .and_then(|text| parse_answer(&text, unit))
            .map_err(|e| e.to_string())
    }

    /// Findings for one unit; never fails, the model pass degrades instead
    #[inline]
    pub async fn review_unit(
        &self,
        unit: &CodeUnit,
        neighbors: &[Neighbor<'_>],
        deviations: &[Deviation],
        cancel: &CancellationToken,
    ) -> UnitReview {
        let (issues, qualitative) = match self.critique(unit, neighbors, deviations, cancel).await {
            Ok(issues) => (issues, QualitativePass::Completed),
            Err(reason) => {
                if self.backend.is_some() {
                    warn!("Qualitative review of {} skipped: {}", unit.label(), reason);
                }
                (Vec::new(), QualitativePass::Skipped(reason))
            }
        };

        let findings: Vec<Finding> = merge(unit, deviations, issues)
            .into_iter()
            .filter(|f| self.categories.is_enabled(f.category))
            .collect();

        // without neighbors there is no norm the unit could have matched
        let praise = (findings.is_empty() && !unit.low_confidence && !neighbors.is_empty())
            .then(|| Praise {
                file: unit.file_path.clone(),
                unit: unit.name.clone(),
            });
        debug!(
            "{}: {} findings{}",
            unit.label(),
            findings.len(),
            if praise.is_some() { ", praised" } else { "" }
        );

        UnitReview {
            findings,
            praise,
            qualitative,
        }
    }
}
