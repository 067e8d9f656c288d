use serde_json::Value;
use tracing::debug;

use crate::analysis::Attribute;
use crate::parser::CodeUnit;
use crate::report::{Category, Severity};
use crate::{Result, ReviewError};

/// One issue raised by the model, already mapped onto the candidate unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelIssue {
    pub category: Category,
    pub severity: Severity,
    pub attribute: Option<Attribute>,
    pub line_start: u32,
    pub line_end: u32,
    pub message: String,
    pub suggested_fix: Option<String>,
}

/// The JSON array inside `answer`, tolerating code fences and surrounding prose
fn json_array(answer: &str) -> Option<&str> {
    let start = answer.find('[')?;
    let end = answer.rfind(']')?;
    if end < start {
        return None;
    }
    answer.get(start..=end)
}

fn text(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| item.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn line(item: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter()
        .filter_map(|key| item.get(*key))
        .find_map(|value| {
            value
                .as_u64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        })
        .and_then(|n| u32::try_from(n).ok())
}

fn issue(item: &Value, unit: &CodeUnit) -> Option<ModelIssue> {
    let Some(category) = text(item, &["category", "type"]).and_then(|c| Category::from_label(&c))
    else {
        debug!("Dropping model issue without a known category: {}", item);
        return None;
    };
    let message = text(item, &["message", "description", "issue"])?;

    let (line_start, line_end) = match (
        line(item, &["line_start", "start_line", "line"]),
        line(item, &["line_end", "end_line"]),
    ) {
        (Some(start), Some(end)) => (start, end),
        (Some(start), None) => (start, start),
        (None, Some(end)) => (end, end),
        (None, None) => (unit.start_line, unit.end_line),
    };
    if !unit.contains_lines(line_start, line_end) {
        debug!(
            "Dropping model issue on lines {}-{} outside {}",
            line_start,
            line_end,
            unit.label()
        );
        return None;
    }

    Some(ModelIssue {
        category,
        severity: text(item, &["severity", "priority"])
            .and_then(|s| Severity::from_label(&s))
            .unwrap_or(Severity::Low),
        attribute: text(item, &["attribute"]).and_then(|a| Attribute::parse(&a)),
        line_start,
        line_end,
        message,
        suggested_fix: text(item, &["suggested_fix", "suggestion", "fix"]),
    })
}

/// Parse a model answer into issues grounded in `unit`.
///
/// Items that cannot be mapped are dropped; an answer that is not a JSON
/// array at all is a [`ReviewError::ModelBackendRejected`].
#[inline]
pub fn parse_answer(answer: &str, unit: &CodeUnit) -> Result<Vec<ModelIssue>> {
    let array = json_array(answer).ok_or_else(|| {
        ReviewError::ModelBackendRejected("answer contains no JSON array".to_string())
    })?;
    let items: Vec<Value> = serde_json::from_str(array)
        .map_err(|e| ReviewError::ModelBackendRejected(format!("malformed answer: {e}")))?;

    let issues: Vec<ModelIssue> = items.iter().filter_map(|item| issue(item, unit)).collect();
    debug!(
        "Kept {} of {} model issues for {}",
        issues.len(),
        items.len(),
        unit.label()
    );
    Ok(issues)
}
