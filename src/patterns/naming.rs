use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NamingConvention {
    #[serde(rename = "snake_case")]
    SnakeCase,
    #[serde(rename = "camelCase")]
    CamelCase,
    #[serde(rename = "PascalCase")]
    PascalCase,
    #[serde(rename = "SCREAMING_SNAKE_CASE")]
    ScreamingSnakeCase,
    #[serde(rename = "mixed")]
    Mixed,
    #[serde(rename = "unknown")]
    Unknown,
}

impl NamingConvention {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            NamingConvention::SnakeCase => "snake_case",
            NamingConvention::CamelCase => "camelCase",
            NamingConvention::PascalCase => "PascalCase",
            NamingConvention::ScreamingSnakeCase => "SCREAMING_SNAKE_CASE",
            NamingConvention::Mixed => "mixed",
            NamingConvention::Unknown => "unknown",
        }
    }

    /// One of the four concrete conventions, as opposed to a vote outcome
    #[inline]
    pub fn is_concrete(self) -> bool {
        !matches!(self, NamingConvention::Mixed | NamingConvention::Unknown)
    }

    /// Rewrite `identifier` in this convention; `None` for non-concrete ones
    #[inline]
    pub fn apply(self, identifier: &str) -> Option<String> {
        let words = split_words(identifier);
        if words.is_empty() {
            return None;
        }

        let capitalize = |w: &String| {
            let mut chars = w.chars();
            chars
                .next()
                .map(|first| first.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default()
        };

        match self {
            NamingConvention::SnakeCase => Some(words.join("_")),
            NamingConvention::ScreamingSnakeCase => Some(words.join("_").to_uppercase()),
            NamingConvention::PascalCase => Some(words.iter().map(capitalize).collect()),
            NamingConvention::CamelCase => {
                let (first, rest) = words.split_first()?;
                Some(std::iter::once(first.clone()).chain(rest.iter().map(capitalize)).collect())
            }
            NamingConvention::Mixed | NamingConvention::Unknown => None,
        }
    }
}

impl fmt::Display for NamingConvention {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase words of an identifier in any of the supported conventions
fn split_words(identifier: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;

    for c in identifier.chars() {
        if c == '_' || c == '-' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            previous_lower = false;
            continue;
        }
        if c.is_uppercase() && previous_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        previous_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
}

/// Classify one identifier.
///
/// Returns `None` for identifiers that fit more than one convention: single
/// letters, single lowercase words, all-caps words without separators, and
/// the receiver names `self`, `cls` and `_`.
#[inline]
pub fn classify(identifier: &str) -> Option<NamingConvention> {
    if matches!(identifier, "self" | "cls" | "this" | "_") {
        return None;
    }

    let core = identifier.trim_matches('_');
    if core.chars().count() < 2 || !core.chars().any(char::is_alphabetic) {
        return None;
    }
    if !core.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }

    let has_lower = core.chars().any(char::is_lowercase);
    let has_upper = core.chars().any(char::is_uppercase);

    if core.contains('_') {
        return match (has_lower, has_upper) {
            (true, false) => Some(NamingConvention::SnakeCase),
            (false, true) => Some(NamingConvention::ScreamingSnakeCase),
            _ => None,
        };
    }

    let starts_upper = core.chars().next().is_some_and(char::is_uppercase);
    match (starts_upper, has_lower, has_upper) {
        (false, true, true) => Some(NamingConvention::CamelCase),
        (true, true, _) => Some(NamingConvention::PascalCase),
        _ => None,
    }
}

/// Outcome of a majority vote over identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingVote {
    pub convention: NamingConvention,
    /// Up to three identifiers that voted for the winning convention
    pub samples: Vec<String>,
}

pub(crate) const MAX_SAMPLES: usize = 3;

/// Majority vote over identifiers; a tie for first place is `Mixed`, no
/// classifiable identifier is `Unknown`.
#[inline]
pub fn vote<'a>(identifiers: impl IntoIterator<Item = &'a str>) -> NamingVote {
    let votes: Vec<(&str, NamingConvention)> = identifiers
        .into_iter()
        .filter_map(|name| classify(name).map(|c| (name, c)))
        .collect();

    let ranked: Vec<(NamingConvention, usize)> = votes
        .iter()
        .map(|(_, c)| *c)
        .counts()
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .collect();

    let convention = match ranked.as_slice() {
        [] => NamingConvention::Unknown,
        [(winner, _)] => *winner,
        [(winner, top), (_, second), ..] if top > second => *winner,
        _ => NamingConvention::Mixed,
    };

    let samples = votes
        .iter()
        .filter(|(_, c)| convention == NamingConvention::Mixed || *c == convention)
        .map(|(name, _)| (*name).to_string())
        .unique()
        .take(MAX_SAMPLES)
        .collect();

    NamingVote {
        convention,
        samples,
    }
}
