//! Splitting source files into analyzable code units.
//!
//! Each supported language is a [`LanguageParser`]. The registry picks one by
//! declared language name or by file extension; nothing downstream of the
//! parser branches on the language.

#[cfg(test)]
mod tests;

mod go;
mod javascript;
mod python;
mod rust;
mod syntax;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Result, ReviewError};

use go::Go;
use javascript::JavaScript;
use python::Python;
use rust::Rust;
use syntax::TreeSitterParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Class,
    Function,
    Module,
}

impl UnitKind {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            UnitKind::Class => "class",
            UnitKind::Function => "function",
            UnitKind::Module => "module",
        }
    }

    #[inline]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "class" => Some(UnitKind::Class),
            "function" => Some(UnitKind::Function),
            "module" => Some(UnitKind::Module),
            _ => None,
        }
    }
}

impl fmt::Display for UnitKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    Function,
    Class,
    Parameter,
    Variable,
}

impl DeclarationKind {
    /// Functions and classes are the definitions documentation is measured on
    #[inline]
    pub fn is_definition(self) -> bool {
        matches!(self, DeclarationKind::Function | DeclarationKind::Class)
    }
}

/// A named thing declared inside a unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclarationKind,
    #[serde(default)]
    pub documented: bool,
}

/// Raw syntactic observations gathered while walking a unit's syntax tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOutline {
    pub declarations: Vec<Declaration>,
    pub branch_count: u32,
    pub has_error_handling: bool,
    /// Control-flow nesting depth of every statement in the unit
    pub nesting_depths: Vec<u32>,
    /// Non-blank lines
    pub line_count: u32,
    /// Calls that write straight to stdout or stderr
    #[serde(default)]
    pub print_calls: u32,
    #[serde(default)]
    pub logging_calls: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeUnit {
    pub id: Uuid,
    pub file_path: String,
    pub name: String,
    pub language: String,
    pub kind: UnitKind,
    /// 1-based, inclusive
    pub start_line: u32,
    /// 1-based, inclusive
    pub end_line: u32,
    pub source: String,
    #[serde(default)]
    pub low_confidence: bool,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub outline: UnitOutline,
}

impl CodeUnit {
    /// Stable identifier derived from the unit's location
    #[inline]
    pub fn unit_id(file_path: &str, kind: UnitKind, name: &str, start_line: u32) -> Uuid {
        let key = format!("{file_path}:{kind}:{name}:{start_line}");
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
    }

    /// `path:name` label used in logs and notes
    #[inline]
    pub fn label(&self) -> String {
        format!("{}:{}", self.file_path, self.name)
    }

    #[inline]
    pub fn contains_lines(&self, start: u32, end: u32) -> bool {
        start <= end && start >= self.start_line && end <= self.end_line
    }

    /// Source text prefixed with original line numbers
    #[inline]
    pub fn numbered_source(&self) -> String {
        self.source
            .lines()
            .zip(self.start_line..)
            .map(|(line, number)| format!("{number:>5} | {line}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A language-specific splitter from source text to code units
pub trait LanguageParser: Send + Sync {
    /// Canonical lowercase language name
    fn name(&self) -> &'static str;

    /// File extensions handled, without the leading dot
    fn extensions(&self) -> &'static [&'static str];

    /// Names accepted as a declared language besides [`LanguageParser::name`]
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Split `source` into units ordered by start line.
    ///
    /// Malformed input yields a single whole-file module unit marked
    /// low-confidence instead of an error.
    fn parse(&self, path: &str, source: &str) -> Result<Vec<CodeUnit>>;
}

#[derive(Clone)]
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn LanguageParser>>,
}

impl fmt::Debug for ParserRegistry {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.parsers.iter().map(|p| p.name()))
            .finish()
    }
}

impl Default for ParserRegistry {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl ParserRegistry {
    /// Registry with every built-in language
    #[inline]
    pub fn new() -> Self {
        Self::empty()
            .with_parser(TreeSitterParser::new(Python))
            .with_parser(TreeSitterParser::new(JavaScript))
            .with_parser(TreeSitterParser::new(Rust))
            .with_parser(TreeSitterParser::new(Go))
    }

    #[inline]
    pub fn empty() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    #[inline]
    pub fn with_parser(mut self, parser: impl LanguageParser + 'static) -> Self {
        self.parsers.push(Arc::new(parser));
        self
    }

    #[inline]
    pub fn languages(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    /// Every extension some parser handles
    #[inline]
    pub fn extensions(&self) -> Vec<&'static str> {
        self.parsers
            .iter()
            .flat_map(|p| p.extensions().iter().copied())
            .collect()
    }

    #[inline]
    pub fn for_language(&self, language: &str) -> Result<Arc<dyn LanguageParser>> {
        let wanted = language.trim().to_lowercase();
        self.parsers
            .iter()
            .find(|p| p.name() == wanted || p.aliases().contains(&wanted.as_str()))
            .cloned()
            .ok_or_else(|| ReviewError::UnsupportedLanguage(language.to_string()))
    }

    #[inline]
    pub fn for_path(&self, path: &Path) -> Result<Arc<dyn LanguageParser>> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| ReviewError::UnsupportedLanguage(path.display().to_string()))?;

        self.parsers
            .iter()
            .find(|p| p.extensions().contains(&extension.as_str()))
            .cloned()
            .ok_or_else(|| ReviewError::UnsupportedLanguage(format!(".{extension}")))
    }

    /// Pick a parser from the declared language, falling back to the extension
    #[inline]
    pub fn resolve(&self, path: &Path, declared: Option<&str>) -> Result<Arc<dyn LanguageParser>> {
        match declared {
            Some(language) => self.for_language(language),
            None => self.for_path(path),
        }
    }

    #[inline]
    pub fn parse(&self, path: &str, source: &str, declared: Option<&str>) -> Result<Vec<CodeUnit>> {
        self.resolve(Path::new(path), declared)?.parse(path, source)
    }
}
