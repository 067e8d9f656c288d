use tree_sitter::{Language, Node};

use super::syntax::{
    Definition, Grammar, Item, NodeKinds, Output, identifiers_in, named_children, push_names,
    text,
};
use super::{Declaration, DeclarationKind, UnitKind};

static KINDS: NodeKinds = NodeKinds {
    functions: &["function_item"],
    classes: &["struct_item", "enum_item", "union_item", "trait_item"],
    imports: &["use_declaration", "extern_crate_declaration"],
    comments: &["line_comment", "block_comment"],
    decorators: &["attribute_item"],
    wrappers: &[],
    branches: &[
        "if_expression",
        "match_arm",
        "while_expression",
        "loop_expression",
        "for_expression",
    ],
    logical: &["binary_expression"],
    nesting: &[
        "if_expression",
        "match_expression",
        "while_expression",
        "loop_expression",
        "for_expression",
    ],
    blocks: &["block", "match_block", "declaration_list"],
    non_statements: &[],
};

const PRINT_MACROS: &[&str] = &["print", "println", "eprint", "eprintln", "dbg"];

const LOG_MACROS: &[&str] = &["trace", "debug", "info", "warn", "error"];

const ERROR_COMBINATORS: &[&str] = &[
    "map_err",
    "ok_or",
    "ok_or_else",
    "unwrap_or_else",
    "context",
    "with_context",
];

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Rust;

/// `crate::model::Foo<T>` → `Foo`
fn type_name(node: Node<'_>, src: &str) -> String {
    let full = text(node, src);
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::")
        .next()
        .unwrap_or(base)
        .trim_start_matches('&')
        .trim()
        .to_string()
}

/// Bindings in a pattern; capitalized identifiers are variants or types
fn bindings(pattern: Node<'_>, src: &str) -> Vec<String> {
    let mut names = Vec::new();
    identifiers_in(pattern, src, &mut names);
    names.retain(|n| !n.starts_with(|c: char| c.is_ascii_uppercase()));
    names
}

impl Grammar for Rust {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["rs"]
    }

    fn language(&self) -> Language {
        tree_sitter_rust::LANGUAGE.into()
    }

    fn kinds(&self) -> &'static NodeKinds {
        &KINDS
    }

    fn owner_separator(&self) -> &'static str {
        "::"
    }

    fn item<'t>(&self, node: Node<'t>, src: &str) -> Item<'t> {
        let kind = match node.kind() {
            "function_item" => UnitKind::Function,
            "struct_item" | "enum_item" | "union_item" | "trait_item" | "impl_item" => {
                UnitKind::Class
            }
            "mod_item" => {
                return match (node.child_by_field_name("name"), node.child_by_field_name("body")) {
                    (Some(name), Some(body)) => Item::Container {
                        prefix: text(name, src).to_string(),
                        body,
                    },
                    _ => Item::Skip,
                };
            }
            "use_declaration" | "extern_crate_declaration" => return Item::Import,
            "line_comment" | "block_comment" | "attribute_item" | "inner_attribute_item"
            | "empty_statement" => return Item::Skip,
            _ => return Item::Statement,
        };

        let name = if node.kind() == "impl_item" {
            node.child_by_field_name("type").map(|t| type_name(t, src))
        } else {
            node.child_by_field_name("name")
                .map(|n| text(n, src).to_string())
        };

        match name {
            Some(name) => Item::Definition(Definition {
                kind,
                name,
                anchor: node,
                node,
                owner: None,
            }),
            None => Item::Statement,
        }
    }

    fn members<'t>(&self, class: &Definition<'t>, src: &str) -> Vec<Definition<'t>> {
        if !matches!(class.node.kind(), "impl_item" | "trait_item") {
            return Vec::new();
        }
        let Some(body) = class.node.child_by_field_name("body") else {
            return Vec::new();
        };

        named_children(body)
            .into_iter()
            .filter(|member| member.kind() == "function_item")
            .filter_map(|member| {
                Some(Definition {
                    kind: UnitKind::Function,
                    name: text(member.child_by_field_name("name")?, src).to_string(),
                    anchor: member,
                    node: member,
                    owner: None,
                })
            })
            .collect()
    }

    fn import_roots(&self, node: Node<'_>, src: &str) -> Vec<String> {
        let target = match node.kind() {
            "use_declaration" => node.child_by_field_name("argument"),
            _ => node.child_by_field_name("name"),
        };

        target
            .and_then(|t| {
                text(t, src)
                    .trim_start_matches("::")
                    .trim_start_matches('{')
                    .split("::")
                    .next()
                    .and_then(|root| root.split_whitespace().next())
                    .map(|root| root.trim_end_matches([',', '}', ';']).to_string())
            })
            .filter(|root| !root.is_empty())
            .into_iter()
            .collect()
    }

    fn declarations(&self, node: Node<'_>, src: &str, out: &mut Vec<Declaration>) {
        match node.kind() {
            "parameters" => {
                let names = named_children(node)
                    .into_iter()
                    .filter(|p| p.kind() == "parameter")
                    .filter_map(|p| p.child_by_field_name("pattern"))
                    .flat_map(|pattern| bindings(pattern, src))
                    .collect::<Vec<_>>();
                push_names(names, DeclarationKind::Parameter, out);
            }
            "closure_parameters" => {
                push_names(bindings(node, src), DeclarationKind::Parameter, out);
            }
            "let_declaration" => {
                if let Some(pattern) = node.child_by_field_name("pattern") {
                    push_names(bindings(pattern, src), DeclarationKind::Variable, out);
                }
            }
            "const_item" | "static_item" | "field_declaration" => {
                if let Some(name) = node.child_by_field_name("name") {
                    push_names(
                        [text(name, src).to_string()],
                        DeclarationKind::Variable,
                        out,
                    );
                }
            }
            _ => {}
        }
    }

    fn handles_errors(&self, node: Node<'_>, src: &str) -> bool {
        match node.kind() {
            "try_expression" => true,
            "call_expression" => node
                .child_by_field_name("function")
                .filter(|f| f.kind() == "field_expression")
                .and_then(|f| f.child_by_field_name("field"))
                .is_some_and(|field| ERROR_COMBINATORS.contains(&text(field, src))),
            _ => false,
        }
    }

    fn output(&self, node: Node<'_>, src: &str) -> Option<Output> {
        if node.kind() != "macro_invocation" {
            return None;
        }
        let path = text(node.child_by_field_name("macro")?, src);
        let name = path.rsplit("::").next().unwrap_or(path);
        if PRINT_MACROS.contains(&name) {
            Some(Output::Print)
        } else if LOG_MACROS.contains(&name) {
            Some(Output::Log)
        } else {
            None
        }
    }
}
