use tree_sitter::{Language, Node};

use super::syntax::{
    Definition, Grammar, Item, NodeKinds, Output, identifiers_in, named_children, push_names,
    strip_quotes, text,
};
use super::{Declaration, DeclarationKind, UnitKind};

static KINDS: NodeKinds = NodeKinds {
    functions: &[
        "function_declaration",
        "generator_function_declaration",
        "method_definition",
    ],
    classes: &["class_declaration"],
    imports: &["import_statement"],
    comments: &["comment"],
    decorators: &["decorator"],
    wrappers: &["export_statement"],
    branches: &[
        "if_statement",
        "for_statement",
        "for_in_statement",
        "while_statement",
        "do_statement",
        "switch_case",
        "catch_clause",
        "ternary_expression",
    ],
    logical: &["binary_expression"],
    nesting: &[
        "if_statement",
        "for_statement",
        "for_in_statement",
        "while_statement",
        "do_statement",
        "try_statement",
        "switch_statement",
    ],
    blocks: &["statement_block", "switch_case", "switch_default", "program"],
    non_statements: &[],
};

const FUNCTION_VALUES: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
];

const LOG_METHODS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct JavaScript;

impl JavaScript {
    fn definition<'t>(anchor: Node<'t>, node: Node<'t>, src: &str) -> Option<Definition<'t>> {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" => Some(Definition {
                kind: UnitKind::Function,
                name: text(node.child_by_field_name("name")?, src).to_string(),
                anchor,
                node,
                owner: None,
            }),
            "class_declaration" => Some(Definition {
                kind: UnitKind::Class,
                name: text(node.child_by_field_name("name")?, src).to_string(),
                anchor,
                node,
                owner: None,
            }),
            "lexical_declaration" | "variable_declaration" => {
                let declarators = named_children(node);
                let [declarator] = declarators.as_slice() else {
                    return None;
                };
                let name = declarator.child_by_field_name("name")?;
                let value = declarator.child_by_field_name("value")?;
                if name.kind() != "identifier" {
                    return None;
                }
                let kind = if FUNCTION_VALUES.contains(&value.kind()) {
                    UnitKind::Function
                } else if value.kind() == "class" {
                    UnitKind::Class
                } else {
                    return None;
                };
                Some(Definition {
                    kind,
                    name: text(name, src).to_string(),
                    anchor,
                    node: value,
                    owner: None,
                })
            }
            _ => None,
        }
    }

    fn require_target(node: Node<'_>, src: &str) -> Option<String> {
        if node.kind() != "call_expression" {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        if function.kind() != "identifier" || text(function, src) != "require" {
            return None;
        }
        let argument = node.child_by_field_name("arguments")?.named_child(0)?;
        (argument.kind() == "string").then(|| module_root(strip_quotes(text(argument, src))))
    }

    fn requires(node: Node<'_>, src: &str, out: &mut Vec<String>) {
        if let Some(root) = Self::require_target(node, src) {
            out.push(root);
            return;
        }
        for child in named_children(node) {
            Self::requires(child, src, out);
        }
    }
}

/// `lodash/fp` → `lodash`, `@scope/pkg/sub` → `@scope/pkg`; relative paths
/// are kept whole.
fn module_root(specifier: &str) -> String {
    if specifier.starts_with('.') || specifier.starts_with('/') {
        return specifier.to_string();
    }
    let segments = if specifier.starts_with('@') { 2 } else { 1 };
    specifier
        .split('/')
        .take(segments)
        .collect::<Vec<_>>()
        .join("/")
}

impl Grammar for JavaScript {
    fn name(&self) -> &'static str {
        "javascript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["js", "mjs", "cjs", "jsx"]
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["js", "node", "jsx"]
    }

    fn language(&self) -> Language {
        tree_sitter_javascript::LANGUAGE.into()
    }

    fn kinds(&self) -> &'static NodeKinds {
        &KINDS
    }

    fn item<'t>(&self, node: Node<'t>, src: &str) -> Item<'t> {
        match node.kind() {
            "import_statement" => Item::Import,
            "comment" => Item::Skip,
            "expression_statement"
                if node.named_child(0).is_some_and(|n| n.kind() == "string") =>
            {
                // directive prologue such as "use strict"
                Item::Skip
            }
            "export_statement" => node
                .child_by_field_name("declaration")
                .and_then(|declaration| Self::definition(node, declaration, src))
                .map_or(Item::Statement, Item::Definition),
            "lexical_declaration" | "variable_declaration" => {
                if let Some(definition) = Self::definition(node, node, src) {
                    return Item::Definition(definition);
                }
                let mut required = Vec::new();
                Self::requires(node, src, &mut required);
                if required.is_empty() {
                    Item::Statement
                } else {
                    Item::Import
                }
            }
            _ => Self::definition(node, node, src).map_or(Item::Statement, Item::Definition),
        }
    }

    fn members<'t>(&self, class: &Definition<'t>, src: &str) -> Vec<Definition<'t>> {
        let Some(body) = class.node.child_by_field_name("body") else {
            return Vec::new();
        };

        named_children(body)
            .into_iter()
            .filter_map(|member| match member.kind() {
                "method_definition" => Some(Definition {
                    kind: UnitKind::Function,
                    name: text(member.child_by_field_name("name")?, src).to_string(),
                    anchor: member,
                    node: member,
                    owner: None,
                }),
                "field_definition" => {
                    let value = member.child_by_field_name("value")?;
                    if !FUNCTION_VALUES.contains(&value.kind()) {
                        return None;
                    }
                    Some(Definition {
                        kind: UnitKind::Function,
                        name: text(member.child_by_field_name("property")?, src).to_string(),
                        anchor: member,
                        node: value,
                        owner: None,
                    })
                }
                _ => None,
            })
            .collect()
    }

    fn import_roots(&self, node: Node<'_>, src: &str) -> Vec<String> {
        if node.kind() == "import_statement" {
            return node
                .child_by_field_name("source")
                .map(|source| module_root(strip_quotes(text(source, src))))
                .into_iter()
                .collect();
        }

        let mut roots = Vec::new();
        Self::requires(node, src, &mut roots);
        roots
    }

    fn inline_import(&self, node: Node<'_>, src: &str) -> Option<String> {
        Self::require_target(node, src)
    }

    fn declarations(&self, node: Node<'_>, src: &str, out: &mut Vec<Declaration>) {
        match node.kind() {
            "formal_parameters" => {
                let mut names = Vec::new();
                for param in named_children(node) {
                    match param.kind() {
                        "identifier" => names.push(text(param, src).to_string()),
                        "assignment_pattern" => {
                            if let Some(left) = param.child_by_field_name("left") {
                                identifiers_in(left, src, &mut names);
                            }
                        }
                        "rest_pattern" => identifiers_in(param, src, &mut names),
                        _ => {}
                    }
                }
                push_names(names, DeclarationKind::Parameter, out);
            }
            "arrow_function" => {
                if let Some(param) = node
                    .child_by_field_name("parameter")
                    .filter(|p| p.kind() == "identifier")
                {
                    push_names(
                        [text(param, src).to_string()],
                        DeclarationKind::Parameter,
                        out,
                    );
                }
            }
            "variable_declarator" => {
                let mut names = Vec::new();
                if let Some(name) = node.child_by_field_name("name") {
                    identifiers_in(name, src, &mut names);
                }
                push_names(names, DeclarationKind::Variable, out);
            }
            _ => {}
        }
    }

    fn handles_errors(&self, node: Node<'_>, src: &str) -> bool {
        match node.kind() {
            "try_statement" => true,
            "call_expression" => node
                .child_by_field_name("function")
                .filter(|f| f.kind() == "member_expression")
                .and_then(|f| f.child_by_field_name("property"))
                .is_some_and(|p| text(p, src) == "catch"),
            _ => false,
        }
    }

    fn output(&self, node: Node<'_>, src: &str) -> Option<Output> {
        if node.kind() != "call_expression" {
            return None;
        }
        let function = node
            .child_by_field_name("function")
            .filter(|f| f.kind() == "member_expression")?;
        let object = text(function.child_by_field_name("object")?, src);
        let property = text(function.child_by_field_name("property")?, src);
        if object == "console" {
            Some(Output::Print)
        } else if LOG_METHODS.contains(&property) {
            Some(Output::Log)
        } else {
            None
        }
    }
}
