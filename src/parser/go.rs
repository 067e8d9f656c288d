use tree_sitter::{Language, Node};

use super::syntax::{
    Definition, Grammar, Item, NodeKinds, Output, identifiers_in, named_children, push_names,
    strip_quotes, text,
};
use super::{Declaration, DeclarationKind, UnitKind};

static KINDS: NodeKinds = NodeKinds {
    functions: &["function_declaration", "method_declaration"],
    classes: &["type_declaration"],
    imports: &["import_declaration"],
    comments: &["comment"],
    decorators: &[],
    wrappers: &[],
    branches: &[
        "if_statement",
        "for_statement",
        "expression_case",
        "type_case",
        "communication_case",
    ],
    logical: &["binary_expression"],
    nesting: &[
        "if_statement",
        "for_statement",
        "expression_switch_statement",
        "type_switch_statement",
        "select_statement",
    ],
    blocks: &[
        "block",
        "statement_list",
        "expression_case",
        "default_case",
        "type_case",
        "communication_case",
    ],
    non_statements: &[
        "expression_list",
        "type_identifier",
        "qualified_type",
        "pointer_type",
        "generic_type",
        "slice_type",
        "array_type",
        "map_type",
        "channel_type",
        "function_type",
        "interface_type",
        "struct_type",
        "parenthesized_type",
    ],
};

const LOG_METHODS: &[&str] = &["Debug", "Info", "Warn", "Error"];

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Go;

/// Name of the first spec in a `type` declaration
fn type_declaration_name(node: Node<'_>, src: &str) -> Option<String> {
    named_children(node)
        .into_iter()
        .filter(|spec| matches!(spec.kind(), "type_spec" | "type_alias"))
        .find_map(|spec| spec.child_by_field_name("name"))
        .map(|name| text(name, src).to_string())
}

/// Receiver type of a method, without pointer or type arguments
fn receiver_type(method: Node<'_>, src: &str) -> Option<String> {
    fn first_type_identifier(node: Node<'_>) -> Option<Node<'_>> {
        if node.kind() == "type_identifier" {
            return Some(node);
        }
        named_children(node)
            .into_iter()
            .find_map(first_type_identifier)
    }

    let receiver = method.child_by_field_name("receiver")?;
    let declaration = named_children(receiver)
        .into_iter()
        .find(|p| p.kind() == "parameter_declaration")?;
    let ty = declaration.child_by_field_name("type")?;
    first_type_identifier(ty).map(|t| text(t, src).to_string())
}

fn field_names(node: Node<'_>, src: &str) -> Vec<String> {
    let mut cursor = node.walk();
    node.children_by_field_name("name", &mut cursor)
        .map(|n| text(n, src).to_string())
        .collect()
}

impl Grammar for Go {
    fn name(&self) -> &'static str {
        "go"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["golang"]
    }

    fn language(&self) -> Language {
        tree_sitter_go::LANGUAGE.into()
    }

    fn kinds(&self) -> &'static NodeKinds {
        &KINDS
    }

    fn item<'t>(&self, node: Node<'t>, src: &str) -> Item<'t> {
        let (kind, name, owner) = match node.kind() {
            "function_declaration" => (
                UnitKind::Function,
                node.child_by_field_name("name")
                    .map(|n| text(n, src).to_string()),
                None,
            ),
            "method_declaration" => (
                UnitKind::Function,
                node.child_by_field_name("name")
                    .map(|n| text(n, src).to_string()),
                receiver_type(node, src),
            ),
            "type_declaration" => (UnitKind::Class, type_declaration_name(node, src), None),
            "import_declaration" => return Item::Import,
            "package_clause" | "comment" => return Item::Skip,
            _ => return Item::Statement,
        };

        match name {
            Some(name) => Item::Definition(Definition {
                kind,
                name,
                anchor: node,
                node,
                owner,
            }),
            None => Item::Statement,
        }
    }

    fn members<'t>(&self, _class: &Definition<'t>, _src: &str) -> Vec<Definition<'t>> {
        // methods are declared at file level with a receiver
        Vec::new()
    }

    fn definition_name(&self, node: Node<'_>, src: &str) -> Option<String> {
        if node.kind() == "type_declaration" {
            return type_declaration_name(node, src);
        }
        node.child_by_field_name("name")
            .map(|n| text(n, src).to_string())
    }

    fn import_roots(&self, node: Node<'_>, src: &str) -> Vec<String> {
        fn specs<'t>(node: Node<'t>, out: &mut Vec<Node<'t>>) {
            for child in named_children(node) {
                match child.kind() {
                    "import_spec" => out.push(child),
                    "import_spec_list" => specs(child, out),
                    _ => {}
                }
            }
        }

        let mut found = Vec::new();
        specs(node, &mut found);
        found
            .into_iter()
            .filter_map(|spec| spec.child_by_field_name("path"))
            .map(|path| strip_quotes(text(path, src)).to_string())
            .filter(|path| !path.is_empty())
            .collect()
    }

    fn declarations(&self, node: Node<'_>, src: &str, out: &mut Vec<Declaration>) {
        match node.kind() {
            "parameter_declaration" | "variadic_parameter_declaration" => {
                push_names(field_names(node, src), DeclarationKind::Parameter, out);
            }
            "var_spec" | "const_spec" | "field_declaration" => {
                push_names(field_names(node, src), DeclarationKind::Variable, out);
            }
            "short_var_declaration" | "range_clause" => {
                if let Some(left) = node.child_by_field_name("left") {
                    let mut names = Vec::new();
                    identifiers_in(left, src, &mut names);
                    names.retain(|n| n != "_");
                    push_names(names, DeclarationKind::Variable, out);
                }
            }
            _ => {}
        }
    }

    fn handles_errors(&self, node: Node<'_>, src: &str) -> bool {
        if node.kind() != "if_statement" {
            return false;
        }
        node.child_by_field_name("condition").is_some_and(|condition| {
            let compact: String = text(condition, src)
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_lowercase();
            compact.contains("err!=nil")
        })
    }

    fn output(&self, node: Node<'_>, src: &str) -> Option<Output> {
        if node.kind() != "call_expression" {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        match function.kind() {
            "identifier" if matches!(text(function, src), "print" | "println") => {
                Some(Output::Print)
            }
            "selector_expression" => {
                let package = text(function.child_by_field_name("operand")?, src);
                let method = text(function.child_by_field_name("field")?, src);
                if package == "fmt" {
                    method.starts_with("Print").then_some(Output::Print)
                } else if matches!(package, "log" | "slog")
                    || LOG_METHODS.contains(&method.trim_end_matches('f'))
                {
                    Some(Output::Log)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}
