use itertools::Itertools;

use crate::analysis::{Attribute, Deviation};
use crate::parser::CodeUnit;
use crate::patterns::{PatternFingerprint, mean};
use crate::retrieval::Neighbor;

/// Neighbor snippets quoted in the prompt
pub const MAX_EXAMPLES: usize = 3;
/// Lines kept from each quoted snippet
pub const MAX_EXAMPLE_LINES: usize = 40;

pub const SYSTEM_PROMPT: &str = "You are a senior engineer reviewing code for consistency with the repository it will be merged into. \
Only report problems you can point to in the candidate code. Answer with JSON only.";

const ANSWER_SCHEMA: &str = r#"Answer with a JSON array and nothing else. Each element:
{"category": "style" | "structure" | "best-practice" | "maintainability",
 "severity": "low" | "medium" | "high",
 "attribute": "naming_convention" | "documentation_ratio" | "complexity" | "nesting_depth" | "error_handling" | "imports" | "indentation" | "line_length" | "logging" | null,
 "line_start": <first line number>, "line_end": <last line number>,
 "message": "<one sentence>",
 "suggested_fix": "<concrete change>" | null}
Use the line numbers shown in the candidate. Answer [] when the candidate already follows the repository's conventions."#;

fn format_mean(values: &[f64]) -> String {
    mean(values).map_or_else(|| "n/a".to_string(), |m| format!("{m:.2}"))
}

/// Compact description of what the neighbors have in common
#[inline]
pub fn neighbor_summary(neighbors: &[&PatternFingerprint]) -> String {
    let total = neighbors.len();
    let naming = neighbors
        .iter()
        .map(|f| f.naming_convention)
        .counts()
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .map(|(convention, count)| format!("{convention} ({count} of {total})"))
        .join(", ");

    let complexity: Vec<f64> = neighbors.iter().map(|f| f.complexity).collect();
    let nesting: Vec<f64> = neighbors.iter().map(|f| f.avg_nesting).collect();
    let documentation: Vec<f64> = neighbors
        .iter()
        .filter_map(|f| f.documentation_ratio)
        .collect();
    let handlers = neighbors.iter().filter(|f| f.has_error_handling).count();
    let indentation = neighbors
        .iter()
        .map(|f| f.indentation)
        .filter(|i| i.is_known())
        .counts()
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .map(|(style, count)| format!("{style} ({count} of {total})"))
        .join(", ");
    let line_lengths: Vec<f64> = neighbors.iter().map(|f| f64::from(f.max_line_length)).collect();
    let loggers = neighbors.iter().filter(|f| f.logs).count();
    let printers = neighbors.iter().filter(|f| f.prints).count();
    let imports = neighbors
        .iter()
        .flat_map(|f| f.imports.iter())
        .counts()
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)))
        .take(8)
        .map(|(name, _)| name.as_str())
        .join(", ");

    [
        format!("- naming: {naming}"),
        format!("- complexity (decision points per ten lines): mean {}", format_mean(&complexity)),
        format!("- nesting depth: mean {}", format_mean(&nesting)),
        format!("- documentation ratio: mean {}", format_mean(&documentation)),
        format!("- error handling: {handlers} of {total} units"),
        format!(
            "- indentation: {}",
            if indentation.is_empty() { "n/a" } else { indentation.as_str() }
        ),
        format!("- longest line: mean {} characters", format_mean(&line_lengths)),
        format!("- output: {loggers} of {total} units log, {printers} print"),
        format!(
            "- common imports: {}",
            if imports.is_empty() { "none" } else { imports.as_str() }
        ),
    ]
    .join("\n")
}

fn example(index: usize, neighbor: &Neighbor<'_>) -> String {
    let unit = &neighbor.entry.unit;
    let lines = unit.source.lines().count();
    let mut snippet = unit.source.lines().take(MAX_EXAMPLE_LINES).join("\n");
    if lines > MAX_EXAMPLE_LINES {
        snippet.push_str("\n...");
    }
    format!(
        "Example {} from {} (similarity {:.2}):\n```{}\n{}\n```",
        index + 1,
        unit.label(),
        neighbor.similarity,
        unit.language,
        snippet
    )
}

fn deviation_line(deviation: &Deviation) -> String {
    format!(
        "- {} ({}): observed {}, repository norm {}",
        deviation.attribute,
        deviation.category(),
        deviation.observed,
        deviation.expected
    )
}

/// Grounding prompt for one candidate unit
#[inline]
pub fn build_prompt(unit: &CodeUnit, neighbors: &[Neighbor<'_>], deviations: &[Deviation]) -> String {
    let mut sections = vec![
        format!(
            "Review the {} {} `{}` from {} (lines {}-{}).",
            unit.language, unit.kind, unit.name, unit.file_path, unit.start_line, unit.end_line
        ),
        format!(
            "Candidate:\n```{}\n{}\n```",
            unit.language,
            unit.numbered_source()
        ),
    ];

    if neighbors.is_empty() {
        sections.push("No similar code was found in the repository.".to_string());
    } else {
        let fingerprints: Vec<&PatternFingerprint> =
            neighbors.iter().map(|n| &n.entry.fingerprint).collect();
        sections.push(format!(
            "Norms of the {} most similar repository units:\n{}",
            neighbors.len(),
            neighbor_summary(&fingerprints)
        ));
        sections.extend(
            neighbors
                .iter()
                .take(MAX_EXAMPLES)
                .enumerate()
                .map(|(i, n)| example(i, n)),
        );
    }

    if deviations.is_empty() {
        sections.push("No measured deviations from the repository norms.".to_string());
    } else {
        sections.push(format!(
            "Measured deviations:\n{}",
            deviations.iter().map(deviation_line).join("\n")
        ));
    }

    let attributes = Attribute::ALL.iter().map(|a| a.as_str()).join(", ");
    sections.push(format!(
        "Known attributes: {attributes}. Mention the attribute when an issue is about one of them."
    ));
    sections.push(ANSWER_SCHEMA.to_string());

    sections.join("\n\n")
}
