//! Tree-sitter driven unit extraction shared by every language.

use std::collections::BTreeSet;

use tracing::debug;
use tree_sitter::{Language, Node, Parser};

use super::{CodeUnit, Declaration, DeclarationKind, LanguageParser, UnitKind, UnitOutline};
use crate::{Result, ReviewError};

/// Node kind tables a grammar is described by
pub(crate) struct NodeKinds {
    pub functions: &'static [&'static str],
    pub classes: &'static [&'static str],
    pub imports: &'static [&'static str],
    pub comments: &'static [&'static str],
    /// Decorators and attributes sitting between a doc comment and its item
    pub decorators: &'static [&'static str],
    /// Nodes wrapping a definition (`decorated_definition`, `export_statement`)
    pub wrappers: &'static [&'static str],
    pub branches: &'static [&'static str],
    /// Binary expressions that count as a branch when short-circuiting
    pub logical: &'static [&'static str],
    pub nesting: &'static [&'static str],
    /// Nodes whose named children are statements
    pub blocks: &'static [&'static str],
    /// Children of block nodes that are not statements, like case labels
    pub non_statements: &'static [&'static str],
}

/// A function or class found at file level or inside a class body
pub(crate) struct Definition<'t> {
    pub kind: UnitKind,
    pub name: String,
    /// Node whose span and preceding comments belong to the definition
    pub anchor: Node<'t>,
    /// Node walked for the outline
    pub node: Node<'t>,
    /// Receiver type for methods declared outside their type
    pub owner: Option<String>,
}

pub(crate) enum Item<'t> {
    Definition(Definition<'t>),
    /// Items nested in a named scope, such as an inline Rust module
    Container { prefix: String, body: Node<'t> },
    Import,
    Skip,
    Statement,
}

/// Where a call sends its output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Output {
    Print,
    Log,
}

/// Language-specific hooks over the shared walk
pub(crate) trait Grammar: Send + Sync {
    fn name(&self) -> &'static str;

    fn extensions(&self) -> &'static [&'static str];

    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    fn language(&self) -> Language;

    fn kinds(&self) -> &'static NodeKinds;

    fn owner_separator(&self) -> &'static str {
        "."
    }

    /// Classify a file-level node
    fn item<'t>(&self, node: Node<'t>, src: &str) -> Item<'t>;

    /// Methods declared in a class-like definition
    fn members<'t>(&self, class: &Definition<'t>, src: &str) -> Vec<Definition<'t>>;

    /// Name of a nested function or class node
    fn definition_name(&self, node: Node<'_>, src: &str) -> Option<String> {
        node.child_by_field_name("name")
            .map(|n| text(n, src).to_string())
    }

    fn import_roots(&self, node: Node<'_>, src: &str) -> Vec<String>;

    /// Parameters and variables introduced by `node`
    fn declarations(&self, node: Node<'_>, src: &str, out: &mut Vec<Declaration>);

    fn handles_errors(&self, node: Node<'_>, src: &str) -> bool;

    fn has_docstring(&self, _definition: Node<'_>, _src: &str) -> bool {
        false
    }

    /// Imports that live outside the grammar's import nodes, like `require()`
    fn inline_import(&self, _node: Node<'_>, _src: &str) -> Option<String> {
        None
    }

    fn output(&self, _node: Node<'_>, _src: &str) -> Option<Output> {
        None
    }
}

#[inline]
pub(crate) fn text<'s>(node: Node<'_>, src: &'s str) -> &'s str {
    src.get(node.byte_range()).unwrap_or_default()
}

/// Last row the node really occupies; nodes that swallow a trailing newline
/// end at column zero of the next row.
#[inline]
pub(crate) fn last_row(node: Node<'_>) -> usize {
    let start = node.start_position();
    let end = node.end_position();
    if end.column == 0 && end.row > start.row {
        end.row - 1
    } else {
        end.row
    }
}

#[inline]
pub(crate) fn strip_quotes(value: &str) -> &str {
    value.trim_matches(|c| c == '"' || c == '\'' || c == '`')
}

#[inline]
pub(crate) fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Identifier leaves under a pattern node
#[inline]
pub(crate) fn identifiers_in(node: Node<'_>, src: &str, out: &mut Vec<String>) {
    if node.kind() == "identifier" {
        out.push(text(node, src).to_string());
        return;
    }
    for child in named_children(node) {
        identifiers_in(child, src, out);
    }
}

#[inline]
pub(crate) fn push_names(
    names: impl IntoIterator<Item = String>,
    kind: DeclarationKind,
    out: &mut Vec<Declaration>,
) {
    out.extend(
        names
            .into_iter()
            .filter(|n| !n.is_empty())
            .map(|name| Declaration {
                name,
                kind,
                documented: false,
            }),
    );
}

/// [`LanguageParser`] over a tree-sitter [`Grammar`]
#[derive(Debug, Clone, Default)]
pub(crate) struct TreeSitterParser<G> {
    grammar: G,
}

impl<G> TreeSitterParser<G> {
    #[inline]
    pub(crate) fn new(grammar: G) -> Self {
        Self { grammar }
    }
}

impl<G: Grammar> LanguageParser for TreeSitterParser<G> {
    #[inline]
    fn name(&self) -> &'static str {
        self.grammar.name()
    }

    #[inline]
    fn extensions(&self) -> &'static [&'static str] {
        self.grammar.extensions()
    }

    #[inline]
    fn aliases(&self) -> &'static [&'static str] {
        self.grammar.aliases()
    }

    #[inline]
    fn parse(&self, path: &str, source: &str) -> Result<Vec<CodeUnit>> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.grammar.language())
            .map_err(|e| ReviewError::ParseFailure {
                path: path.to_string(),
                message: format!("grammar rejected: {e}"),
            })?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ReviewError::ParseFailure {
                path: path.to_string(),
                message: "parser produced no syntax tree".to_string(),
            })?;

        let extraction = Extraction::new(&self.grammar, path, source);
        let root = tree.root_node();

        let units = if root.has_error() {
            debug!("Syntax errors in {}, falling back to a whole-file unit", path);
            extraction.whole_file(root)
        } else {
            extraction.units(root)
        };

        debug!("Parsed {} into {} units", path, units.len());
        Ok(units)
    }
}

struct Extraction<'a, G> {
    grammar: &'a G,
    path: &'a str,
    src: &'a str,
    lines: Vec<&'a str>,
}

impl<'a, G: Grammar> Extraction<'a, G> {
    fn new(grammar: &'a G, path: &'a str, src: &'a str) -> Self {
        Self {
            grammar,
            path,
            src,
            lines: src.lines().collect(),
        }
    }

    fn units(&self, root: Node<'_>) -> Vec<CodeUnit> {
        let mut definitions = Vec::new();
        let mut statements = Vec::new();
        let mut file_imports = BTreeSet::new();

        self.collect_items(root, "", &mut definitions, &mut statements, &mut file_imports);

        let mut units = Vec::new();
        for (definition, qualified) in definitions {
            let is_class = definition.kind == UnitKind::Class;
            let members = if is_class {
                self.grammar.members(&definition, self.src)
            } else {
                Vec::new()
            };

            units.push(self.definition_unit(&definition, &qualified, &members, &file_imports));

            for member in &members {
                let name = format!(
                    "{}{}{}",
                    qualified,
                    self.grammar.owner_separator(),
                    member.name
                );
                units.push(self.definition_unit(member, &name, &[], &file_imports));
            }
        }

        if let Some(module) = self.module_unit(&statements, &file_imports) {
            units.push(module);
        }

        units.sort_by(|a, b| {
            a.start_line
                .cmp(&b.start_line)
                .then_with(|| a.kind.cmp(&b.kind))
                .then_with(|| a.name.cmp(&b.name))
        });
        units
    }

    fn collect_items<'t>(
        &self,
        scope: Node<'t>,
        prefix: &str,
        definitions: &mut Vec<(Definition<'t>, String)>,
        statements: &mut Vec<Node<'t>>,
        imports: &mut BTreeSet<String>,
    ) {
        for child in named_children(scope) {
            match self.grammar.item(child, self.src) {
                Item::Definition(definition) => {
                    let base = match &definition.owner {
                        Some(owner) => format!(
                            "{}{}{}",
                            owner,
                            self.grammar.owner_separator(),
                            definition.name
                        ),
                        None => definition.name.clone(),
                    };
                    let qualified = format!("{prefix}{base}");
                    definitions.push((definition, qualified));
                }
                Item::Container {
                    prefix: inner,
                    body,
                } => {
                    let nested = format!("{prefix}{inner}{}", self.grammar.owner_separator());
                    self.collect_items(body, &nested, definitions, statements, imports);
                }
                Item::Import => {
                    imports.extend(self.grammar.import_roots(child, self.src));
                }
                Item::Skip => {}
                Item::Statement => {
                    if !self.grammar.kinds().comments.contains(&child.kind()) {
                        statements.push(child);
                    }
                }
            }
        }
    }

    /// Members become units of their own, so the walk stops at them
    fn definition_unit(
        &self,
        definition: &Definition<'_>,
        name: &str,
        members: &[Definition<'_>],
        file_imports: &BTreeSet<String>,
    ) -> CodeUnit {
        let mut walker = OutlineWalker::new(self.grammar, self.src);
        walker.excluded = members
            .iter()
            .flat_map(|member| [member.anchor.id(), member.node.id()])
            .collect();
        let documented = walker.is_documented(definition.anchor)
            || self.grammar.has_docstring(definition.node, self.src);
        walker.outline.declarations.push(Declaration {
            name: definition.name.clone(),
            kind: match definition.kind {
                UnitKind::Class => DeclarationKind::Class,
                _ => DeclarationKind::Function,
            },
            documented,
        });
        walker.visit(definition.node, 0, false);

        let start = definition.anchor.start_position().row;
        let end = last_row(definition.anchor).max(last_row(definition.node));
        self.build_unit(definition.kind, name, (start, end), walker, file_imports, false)
    }

    fn module_unit(&self, statements: &[Node<'_>], file_imports: &BTreeSet<String>) -> Option<CodeUnit> {
        let first = statements.first()?;
        let last = statements.last()?;

        let mut walker = OutlineWalker::new(self.grammar, self.src);
        for statement in statements {
            walker.outline.nesting_depths.push(0);
            walker.visit(*statement, 0, true);
        }

        Some(self.build_unit(
            UnitKind::Module,
            &module_name(self.path),
            (first.start_position().row, last_row(*last)),
            walker,
            file_imports,
            false,
        ))
    }

    fn whole_file(&self, root: Node<'_>) -> Vec<CodeUnit> {
        if self.src.trim().is_empty() {
            return Vec::new();
        }

        let mut walker = OutlineWalker::new(self.grammar, self.src);
        for child in named_children(root) {
            if !self.grammar.kinds().comments.contains(&child.kind()) {
                walker.outline.nesting_depths.push(0);
            }
            walker.visit(child, 0, true);
        }

        let end = self.lines.len().saturating_sub(1);
        vec![self.build_unit(
            UnitKind::Module,
            &module_name(self.path),
            (0, end),
            walker,
            &BTreeSet::new(),
            true,
        )]
    }

    fn build_unit(
        &self,
        kind: UnitKind,
        name: &str,
        (start_row, end_row): (usize, usize),
        walker: OutlineWalker<'_, G>,
        file_imports: &BTreeSet<String>,
        low_confidence: bool,
    ) -> CodeUnit {
        let end_row = end_row.max(start_row);
        let source = self
            .lines
            .get(start_row..=end_row.min(self.lines.len().saturating_sub(1)))
            .map(|lines| lines.join("\n"))
            .unwrap_or_default();

        let OutlineWalker {
            mut outline,
            imports,
            ..
        } = walker;
        outline.line_count = u32::try_from(source.lines().filter(|l| !l.trim().is_empty()).count())
            .unwrap_or(u32::MAX);

        let imports: Vec<String> = file_imports.union(&imports).cloned().collect();
        let start_line = to_line(start_row);

        CodeUnit {
            id: CodeUnit::unit_id(self.path, kind, name, start_line),
            file_path: self.path.to_string(),
            name: name.to_string(),
            language: self.grammar.name().to_string(),
            kind,
            start_line,
            end_line: to_line(end_row),
            source,
            low_confidence,
            imports,
            outline,
        }
    }
}

fn to_line(row: usize) -> u32 {
    u32::try_from(row + 1).unwrap_or(u32::MAX)
}

fn module_name(path: &str) -> String {
    std::path::Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("<module>")
        .to_string()
}

struct OutlineWalker<'a, G> {
    grammar: &'a G,
    src: &'a str,
    outline: UnitOutline,
    imports: BTreeSet<String>,
    /// Ids of nodes the walk does not enter
    excluded: BTreeSet<usize>,
}

impl<'a, G: Grammar> OutlineWalker<'a, G> {
    fn new(grammar: &'a G, src: &'a str) -> Self {
        Self {
            grammar,
            src,
            outline: UnitOutline::default(),
            imports: BTreeSet::new(),
            excluded: BTreeSet::new(),
        }
    }

    fn visit(&mut self, node: Node<'_>, depth: u32, include_self: bool) {
        let kinds = self.grammar.kinds();
        let kind = node.kind();

        if include_self {
            let declared = if kinds.functions.contains(&kind) {
                Some(DeclarationKind::Function)
            } else if kinds.classes.contains(&kind) {
                Some(DeclarationKind::Class)
            } else {
                None
            };
            if let Some((declared, name)) =
                declared.and_then(|d| Some((d, self.grammar.definition_name(node, self.src)?)))
            {
                let anchor = node
                    .parent()
                    .filter(|p| kinds.wrappers.contains(&p.kind()))
                    .unwrap_or(node);
                let documented =
                    self.is_documented(anchor) || self.grammar.has_docstring(node, self.src);
                self.outline.declarations.push(Declaration {
                    name,
                    kind: declared,
                    documented,
                });
            }
        }

        if kinds.imports.contains(&kind) {
            self.imports.extend(self.grammar.import_roots(node, self.src));
            return;
        }
        if let Some(root) = self.grammar.inline_import(node, self.src) {
            self.imports.insert(root);
        }

        if self.is_branch(node) {
            self.outline.branch_count += 1;
        }
        if !self.outline.has_error_handling && self.grammar.handles_errors(node, self.src) {
            self.outline.has_error_handling = true;
        }
        match self.grammar.output(node, self.src) {
            Some(Output::Print) => self.outline.print_calls += 1,
            Some(Output::Log) => self.outline.logging_calls += 1,
            None => {}
        }
        self.grammar
            .declarations(node, self.src, &mut self.outline.declarations);

        let child_depth = if kinds.nesting.contains(&kind) {
            depth + 1
        } else {
            depth
        };
        let is_block = kinds.blocks.contains(&kind);

        for child in named_children(node) {
            if self.excluded.contains(&child.id()) {
                continue;
            }
            let child_kind = child.kind();
            if is_block
                && !kinds.blocks.contains(&child_kind)
                && !kinds.comments.contains(&child_kind)
                && !kinds.non_statements.contains(&child_kind)
            {
                self.outline.nesting_depths.push(child_depth);
            }
            self.visit(child, child_depth, true);
        }
    }

    fn is_branch(&self, node: Node<'_>) -> bool {
        let kinds = self.grammar.kinds();
        if kinds.branches.contains(&node.kind()) {
            return true;
        }
        kinds.logical.contains(&node.kind())
            && node
                .child_by_field_name("operator")
                .is_some_and(|op| matches!(op.kind(), "&&" | "||" | "??"))
    }

    /// A comment ends on the line right above the definition, looking past
    /// any decorators or attributes in between.
    fn is_documented(&self, anchor: Node<'_>) -> bool {
        let kinds = self.grammar.kinds();
        let mut row = anchor.start_position().row;
        let mut previous = anchor.prev_named_sibling();

        while let Some(node) = previous {
            if last_row(node) + 1 != row {
                return false;
            }
            if kinds.comments.contains(&node.kind()) {
                return true;
            }
            if !kinds.decorators.contains(&node.kind()) {
                return false;
            }
            row = node.start_position().row;
            previous = node.prev_named_sibling();
        }

        false
    }
}
