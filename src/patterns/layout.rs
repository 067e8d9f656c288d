use std::fmt;

use serde::{Deserialize, Serialize};

/// How a unit indents its nested lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indentation {
    Tabs,
    Spaces(u32),
    /// Nothing in the unit is indented deeper than its first line
    #[default]
    Unknown,
}

impl Indentation {
    #[inline]
    pub fn is_known(self) -> bool {
        self != Indentation::Unknown
    }
}

impl fmt::Display for Indentation {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Indentation::Tabs => f.write_str("tabs"),
            Indentation::Spaces(width) => write!(f, "{width} spaces"),
            Indentation::Unknown => f.write_str("unknown"),
        }
    }
}

/// Indentation step relative to the unit's first line.
///
/// Any tab in the extra indent wins; otherwise the smallest extra run of
/// spaces is the step, so aligned continuation lines do not widen it.
#[inline]
pub fn detect_indentation(source: &str) -> Indentation {
    let mut lines = source.lines().filter(|l| !l.trim().is_empty());
    let Some(first) = lines.next() else {
        return Indentation::Unknown;
    };
    let base = leading(first).count();

    let mut step: Option<u32> = None;
    for line in lines {
        let extra: Vec<char> = leading(line).skip(base).collect();
        if extra.is_empty() {
            continue;
        }
        if extra.contains(&'\t') {
            return Indentation::Tabs;
        }
        let width = u32::try_from(extra.len()).unwrap_or(u32::MAX);
        step = Some(step.map_or(width, |s| s.min(width)));
    }

    step.map_or(Indentation::Unknown, Indentation::Spaces)
}

/// Characters on the longest line, trailing whitespace excluded
#[inline]
pub fn longest_line(source: &str) -> u32 {
    let longest = source
        .lines()
        .map(|l| l.trim_end().chars().count())
        .max()
        .unwrap_or(0);
    u32::try_from(longest).unwrap_or(u32::MAX)
}

fn leading(line: &str) -> impl Iterator<Item = char> + '_ {
    line.chars().take_while(|c| *c == ' ' || *c == '\t')
}
