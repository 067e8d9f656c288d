use super::*;

const PYTHON_SOURCE: &str = r#"import os
from collections import defaultdict

CONSTANT = 3

def load_user(user_id):
    """Load a user."""
    try:
        return os.path.join("a", user_id)
    except OSError:
        return None


class UserStore:
    def __init__(self, path):
        self.base_path = path

    def fetch_all(self):
        return []
"#;

const JAVASCRIPT_SOURCE: &str = r#"import React from "react";
const helpers = require("lodash/fp");

// Fetch a user record.
export async function fetchUser(userId) {
  try {
    return await api.get(userId);
  } catch (err) {
    return null;
  }
}

const formatName = (firstName, lastName) => firstName + lastName;

class UserCard {
  render() {
    return null;
  }
}
"#;

const RUST_SOURCE: &str = r#"use std::collections::HashMap;

/// A cache of parsed values.
#[derive(Debug)]
pub struct Cache {
    entries: HashMap<String, u32>,
}

impl Cache {
    pub fn lookup(&self, key: &str) -> Result<u32, String> {
        let value = self.entries.get(key).copied().ok_or_else(|| key.to_string())?;
        Ok(value)
    }
}

fn helper() {}
"#;

const GO_SOURCE: &str = r#"package store

import (
	"errors"
	"net/http"
)

// Store keeps records.
type Store struct {
	items map[string]int
}

// Get returns an item.
func (s *Store) Get(key string) (int, error) {
	value, err := lookup(key)
	if err != nil {
		return 0, err
	}
	return value, nil
}

func lookup(key string) (int, error) {
	return 0, errors.New("missing")
}
"#;

fn unit<'a>(units: &'a [CodeUnit], name: &str) -> &'a CodeUnit {
    units
        .iter()
        .find(|u| u.name == name)
        .unwrap_or_else(|| panic!("no unit named {name} in {:?}", names(units)))
}

fn names(units: &[CodeUnit]) -> Vec<&str> {
    units.iter().map(|u| u.name.as_str()).collect()
}

#[test]
fn registry_selects_by_extension_and_name() {
    let registry = ParserRegistry::new();

    assert_eq!(
        registry
            .for_path(Path::new("pkg/app.py"))
            .expect("python by extension")
            .name(),
        "python"
    );
    assert_eq!(
        registry
            .for_path(Path::new("web/index.MJS"))
            .expect("javascript by extension")
            .name(),
        "javascript"
    );
    assert_eq!(
        registry.for_language("Golang").expect("go alias").name(),
        "go"
    );
    assert_eq!(
        registry
            .resolve(Path::new("snippet.txt"), Some("rust"))
            .expect("declared language wins")
            .name(),
        "rust"
    );
    assert_eq!(registry.languages(), vec!["python", "javascript", "rust", "go"]);
}

#[test]
fn unsupported_language_is_reported() {
    let registry = ParserRegistry::new();

    assert!(matches!(
        registry.for_path(Path::new("legacy/report.cbl")),
        Err(ReviewError::UnsupportedLanguage(_))
    ));
    assert!(matches!(
        registry.for_path(Path::new("Makefile")),
        Err(ReviewError::UnsupportedLanguage(_))
    ));
    assert!(matches!(
        registry.parse("a.txt", "hello", Some("cobol")),
        Err(ReviewError::UnsupportedLanguage(_))
    ));
}

#[test]
fn python_units_in_line_order() {
    let units = ParserRegistry::new()
        .parse("src/users.py", PYTHON_SOURCE, None)
        .expect("python should parse");

    assert_eq!(
        names(&units),
        vec![
            "users",
            "load_user",
            "UserStore",
            "UserStore.__init__",
            "UserStore.fetch_all"
        ]
    );

    let module = unit(&units, "users");
    assert_eq!(module.kind, UnitKind::Module);
    assert_eq!((module.start_line, module.end_line), (4, 4));

    let load_user = unit(&units, "load_user");
    assert_eq!(load_user.kind, UnitKind::Function);
    assert_eq!((load_user.start_line, load_user.end_line), (6, 11));
    assert_eq!(load_user.language, "python");
    assert!(!load_user.low_confidence);
    assert!(load_user.source.starts_with("def load_user(user_id):"));
    assert_eq!(load_user.imports, vec!["collections", "os"]);

    let store = unit(&units, "UserStore");
    assert_eq!(store.kind, UnitKind::Class);
    assert_eq!((store.start_line, store.end_line), (14, 19));

    let init = unit(&units, "UserStore.__init__");
    assert_eq!(init.kind, UnitKind::Function);
    assert_eq!((init.start_line, init.end_line), (15, 16));
}

#[test]
fn python_outline_observations() {
    let units = ParserRegistry::new()
        .parse("src/users.py", PYTHON_SOURCE, None)
        .expect("python should parse");

    let load_user = unit(&units, "load_user");
    let outline = &load_user.outline;
    assert!(outline.has_error_handling);
    assert_eq!(outline.branch_count, 1);
    assert_eq!(outline.nesting_depths.iter().max(), Some(&1));
    assert_eq!(outline.line_count, 6);

    let own = &outline.declarations[0];
    assert_eq!(own.name, "load_user");
    assert_eq!(own.kind, DeclarationKind::Function);
    assert!(own.documented, "docstring counts as documentation");
    assert!(
        outline
            .declarations
            .iter()
            .any(|d| d.name == "user_id" && d.kind == DeclarationKind::Parameter)
    );

    let init = unit(&units, "UserStore.__init__");
    assert!(!init.outline.has_error_handling);
    assert!(!init.outline.declarations[0].documented);
    assert!(
        init.outline
            .declarations
            .iter()
            .any(|d| d.name == "base_path" && d.kind == DeclarationKind::Variable)
    );
}

#[test]
fn python_comment_above_decorator_documents_function() {
    let source = "import functools\n\n# Cached lookup.\n@functools.cache\ndef lookup(key):\n    return key\n";
    let units = ParserRegistry::new()
        .parse("cache.py", source, None)
        .expect("python should parse");

    assert_eq!(names(&units), vec!["lookup"]);
    let lookup = &units[0];
    assert_eq!(lookup.start_line, 4, "decorators belong to the unit");
    assert!(lookup.outline.declarations[0].documented);
}

#[test]
fn syntax_errors_fall_back_to_whole_file() {
    let source = "def broken(:\n    pass\n\nvalue = 1\n";
    let units = ParserRegistry::new()
        .parse("broken.py", source, None)
        .expect("malformed input is not an error");

    assert_eq!(units.len(), 1);
    let whole = &units[0];
    assert_eq!(whole.kind, UnitKind::Module);
    assert!(whole.low_confidence);
    assert_eq!(whole.start_line, 1);
    assert_eq!(whole.end_line, 4);
    assert_eq!(whole.name, "broken");
}

#[test]
fn empty_file_has_no_units() {
    let units = ParserRegistry::new()
        .parse("empty.py", "", None)
        .expect("empty input parses");
    assert!(units.is_empty());

    let only_imports = ParserRegistry::new()
        .parse("imports.py", "import os\n# nothing else\n", None)
        .expect("imports parse");
    assert!(only_imports.is_empty());
}

#[test]
fn javascript_units() {
    let units = ParserRegistry::new()
        .parse("web/user.js", JAVASCRIPT_SOURCE, None)
        .expect("javascript should parse");

    assert_eq!(
        names(&units),
        vec!["fetchUser", "formatName", "UserCard", "UserCard.render"]
    );

    let fetch = unit(&units, "fetchUser");
    assert_eq!(fetch.start_line, 5);
    assert!(fetch.outline.has_error_handling);
    assert!(fetch.outline.declarations[0].documented);
    assert_eq!(fetch.imports, vec!["lodash", "react"]);

    let format = unit(&units, "formatName");
    assert_eq!(format.kind, UnitKind::Function);
    assert!(!format.outline.has_error_handling);
    assert!(
        format
            .outline
            .declarations
            .iter()
            .any(|d| d.name == "firstName" && d.kind == DeclarationKind::Parameter)
    );

    assert_eq!(unit(&units, "UserCard").kind, UnitKind::Class);
}

#[test]
fn rust_units_and_error_handling() {
    let units = ParserRegistry::new()
        .parse("src/cache.rs", RUST_SOURCE, None)
        .expect("rust should parse");

    assert_eq!(
        names(&units),
        vec!["Cache", "Cache", "Cache::lookup", "helper"]
    );

    let strukt = &units[0];
    assert_eq!(strukt.kind, UnitKind::Class);
    assert!(
        strukt.outline.declarations[0].documented,
        "doc comment above an attribute documents the item"
    );

    let lookup = unit(&units, "Cache::lookup");
    assert!(lookup.outline.has_error_handling);
    assert_eq!(lookup.imports, vec!["std"]);
    assert!(
        lookup
            .outline
            .declarations
            .iter()
            .any(|d| d.name == "key" && d.kind == DeclarationKind::Parameter)
    );

    let helper = unit(&units, "helper");
    assert!(!helper.outline.has_error_handling);
    assert!(!helper.outline.declarations[0].documented);
}

#[test]
fn go_units_and_receivers() {
    let units = ParserRegistry::new()
        .parse("store/store.go", GO_SOURCE, None)
        .expect("go should parse");

    assert_eq!(names(&units), vec!["Store", "Store.Get", "lookup"]);

    let store = unit(&units, "Store");
    assert_eq!(store.kind, UnitKind::Class);
    assert!(store.outline.declarations[0].documented);

    let get = unit(&units, "Store.Get");
    assert!(get.outline.has_error_handling);
    assert!(get.outline.declarations[0].documented);
    assert_eq!(get.imports, vec!["errors", "net/http"]);
    assert!(
        get.outline
            .declarations
            .iter()
            .any(|d| d.name == "value" && d.kind == DeclarationKind::Variable)
    );

    let lookup = unit(&units, "lookup");
    assert!(!lookup.outline.has_error_handling);
}

#[test]
fn parsing_is_deterministic() {
    let registry = ParserRegistry::new();
    let first = registry
        .parse("src/users.py", PYTHON_SOURCE, None)
        .expect("first parse");
    let second = registry
        .parse("src/users.py", PYTHON_SOURCE, None)
        .expect("second parse");

    assert_eq!(first, second);
    assert_eq!(
        first[1].id,
        CodeUnit::unit_id("src/users.py", UnitKind::Function, "load_user", 6)
    );
}

#[test]
fn numbered_source_uses_file_lines() {
    let units = ParserRegistry::new()
        .parse("src/users.py", PYTHON_SOURCE, None)
        .expect("python should parse");
    let init = unit(&units, "UserStore.__init__");

    let numbered = init.numbered_source();
    let first = numbered.lines().next().expect("numbered line");
    assert!(first.trim_start().starts_with("15 | "));
    assert!(init.contains_lines(15, 16));
    assert!(!init.contains_lines(14, 16));
    assert!(!init.contains_lines(16, 15));
}

#[test]
fn class_outline_leaves_methods_to_their_own_units() {
    let source = "class RecordStore:\n    page_size = 50\n\n    def loadRecord(self, recordId):\n        try:\n            if recordId:\n                return fetch(recordId)\n        except KeyError:\n            return None\n";
    let units = ParserRegistry::new()
        .parse("app/store.py", source, None)
        .expect("python should parse");

    let class = unit(&units, "RecordStore");
    let names: Vec<&str> = class
        .outline
        .declarations
        .iter()
        .map(|d| d.name.as_str())
        .collect();
    assert!(names.contains(&"RecordStore"));
    assert!(names.contains(&"page_size"));
    assert!(!names.contains(&"loadRecord"));
    assert!(!names.contains(&"recordId"));
    assert!(!class.outline.has_error_handling);
    assert_eq!(class.outline.branch_count, 0);
    // the class still spans its methods
    assert_eq!((class.start_line, class.end_line), (1, 9));

    let method = unit(&units, "RecordStore.loadRecord");
    assert!(method.outline.has_error_handling);
    assert_eq!(method.outline.branch_count, 1);
}

#[test]
fn print_and_logger_calls_are_told_apart() {
    let registry = ParserRegistry::new();
    let cases = [
        (
            "app/report.py",
            "def report(total):\n    print(total)\n    logger.info(\"total %s\", total)\n    logging.warning(\"done\")\n    items.append(total)\n",
            (1, 2),
        ),
        (
            "web/report.js",
            "function report(total) {\n  console.log(total);\n  logger.warn(total);\n  items.push(total);\n}\n",
            (1, 1),
        ),
        (
            "src/report.rs",
            "fn report(total: u32) {\n    println!(\"{total}\");\n    tracing::info!(total);\n    log::debug!(\"done\");\n    let _ = vec![total];\n}\n",
            (1, 2),
        ),
        (
            "cmd/report.go",
            "package main\n\nfunc report(total int) error {\n\tfmt.Println(total)\n\tlog.Printf(\"%d\", total)\n\tlogger.Info(\"done\")\n\treturn fmt.Errorf(\"total %d\", total)\n}\n",
            (1, 2),
        ),
    ];

    for (path, source, expected) in cases {
        let units = registry.parse(path, source, None).expect("source should parse");
        let report = unit(&units, "report");
        assert_eq!(
            (report.outline.print_calls, report.outline.logging_calls),
            expected,
            "{path}"
        );
    }
}
