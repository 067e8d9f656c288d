use tree_sitter::{Language, Node};

use super::syntax::{
    Definition, Grammar, Item, NodeKinds, Output, identifiers_in, named_children, push_names,
    text,
};
use super::{Declaration, DeclarationKind, UnitKind};

static KINDS: NodeKinds = NodeKinds {
    functions: &["function_definition"],
    classes: &["class_definition"],
    imports: &["import_statement", "import_from_statement", "future_import_statement"],
    comments: &["comment"],
    decorators: &["decorator"],
    wrappers: &["decorated_definition"],
    branches: &[
        "if_statement",
        "elif_clause",
        "for_statement",
        "while_statement",
        "except_clause",
        "conditional_expression",
        "boolean_operator",
        "case_clause",
        "for_in_clause",
        "if_clause",
    ],
    logical: &[],
    nesting: &[
        "if_statement",
        "for_statement",
        "while_statement",
        "try_statement",
        "with_statement",
        "match_statement",
    ],
    blocks: &["block", "module"],
    non_statements: &[],
};

const LOG_METHODS: &[&str] = &[
    "debug",
    "info",
    "warning",
    "warn",
    "error",
    "critical",
    "exception",
];

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Python;

impl Python {
    /// Unwrap `decorated_definition` to the function or class it decorates
    fn definition<'t>(node: Node<'t>, src: &str) -> Option<Definition<'t>> {
        let inner = if node.kind() == "decorated_definition" {
            node.child_by_field_name("definition")?
        } else {
            node
        };

        let kind = match inner.kind() {
            "function_definition" => UnitKind::Function,
            "class_definition" => UnitKind::Class,
            _ => return None,
        };

        Some(Definition {
            kind,
            name: text(inner.child_by_field_name("name")?, src).to_string(),
            anchor: node,
            node: inner,
            owner: None,
        })
    }
}

impl Grammar for Python {
    fn name(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py", "pyi"]
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["py", "python3"]
    }

    fn language(&self) -> Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn kinds(&self) -> &'static NodeKinds {
        &KINDS
    }

    fn item<'t>(&self, node: Node<'t>, src: &str) -> Item<'t> {
        match node.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => {
                Item::Import
            }
            "comment" => Item::Skip,
            _ => match Self::definition(node, src) {
                Some(definition) => Item::Definition(definition),
                None => Item::Statement,
            },
        }
    }

    fn members<'t>(&self, class: &Definition<'t>, src: &str) -> Vec<Definition<'t>> {
        let Some(body) = class.node.child_by_field_name("body") else {
            return Vec::new();
        };

        named_children(body)
            .into_iter()
            .filter_map(|child| Self::definition(child, src))
            .filter(|d| d.kind == UnitKind::Function)
            .collect()
    }

    fn import_roots(&self, node: Node<'_>, src: &str) -> Vec<String> {
        let modules: Vec<Node<'_>> = match node.kind() {
            "import_from_statement" => node
                .child_by_field_name("module_name")
                .into_iter()
                .collect(),
            "future_import_statement" => return vec!["__future__".to_string()],
            _ => {
                let mut cursor = node.walk();
                node.children_by_field_name("name", &mut cursor)
                    .map(|n| {
                        if n.kind() == "aliased_import" {
                            n.child_by_field_name("name").unwrap_or(n)
                        } else {
                            n
                        }
                    })
                    .collect()
            }
        };

        modules
            .into_iter()
            .filter_map(|module| {
                let root = text(module, src)
                    .trim_start_matches('.')
                    .split('.')
                    .next()
                    .unwrap_or_default()
                    .trim();
                (!root.is_empty()).then(|| root.to_string())
            })
            .collect()
    }

    fn declarations(&self, node: Node<'_>, src: &str, out: &mut Vec<Declaration>) {
        match node.kind() {
            "parameters" | "lambda_parameters" => {
                let mut names = Vec::new();
                for param in named_children(node) {
                    let target = match param.kind() {
                        "identifier" => Some(param),
                        "default_parameter" | "typed_default_parameter" => {
                            param.child_by_field_name("name")
                        }
                        "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                            param.named_child(0)
                        }
                        _ => None,
                    };
                    if let Some(target) = target.filter(|t| t.kind() == "identifier") {
                        names.push(text(target, src).to_string());
                    }
                }
                push_names(names, DeclarationKind::Parameter, out);
            }
            "assignment" => {
                let Some(left) = node.child_by_field_name("left") else {
                    return;
                };
                let mut names = Vec::new();
                if left.kind() == "attribute" {
                    let on_self = left
                        .child_by_field_name("object")
                        .is_some_and(|o| text(o, src) == "self");
                    if let Some(attribute) = left.child_by_field_name("attribute").filter(|_| on_self)
                    {
                        names.push(text(attribute, src).to_string());
                    }
                } else {
                    identifiers_in(left, src, &mut names);
                }
                push_names(names, DeclarationKind::Variable, out);
            }
            _ => {}
        }
    }

    fn handles_errors(&self, node: Node<'_>, _src: &str) -> bool {
        node.kind() == "try_statement"
    }

    fn has_docstring(&self, definition: Node<'_>, _src: &str) -> bool {
        definition
            .child_by_field_name("body")
            .and_then(|body| body.named_child(0))
            .filter(|first| first.kind() == "expression_statement")
            .and_then(|statement| statement.named_child(0))
            .is_some_and(|expr| expr.kind() == "string")
    }

    fn output(&self, node: Node<'_>, src: &str) -> Option<Output> {
        if node.kind() != "call" {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        match function.kind() {
            "identifier" if text(function, src) == "print" => Some(Output::Print),
            "attribute" => function
                .child_by_field_name("attribute")
                .filter(|method| LOG_METHODS.contains(&text(*method, src)))
                .map(|_| Output::Log),
            _ => None,
        }
    }
}
