//! Language front-ends and the scope-tracking collector they share

pub mod python;
pub mod typescript;

use std::collections::HashSet;

use depgraph_core::module_id::node_id;
use depgraph_core::{
    AnalysisWarning, Confidence, EdgeType, FileAnalysis, GraphEdge, GraphNode, NodeType,
    Parameter, Severity, warning_kind,
};
use tree_sitter::Node;

use crate::extractor::SourceFile;
use crate::imports::ImportTable;
use crate::resolver::SymbolResolver;

pub use python::PythonExtractor;
pub use typescript::TypeScriptExtractor;

/// 1-based line of a syntax node.
pub(crate) fn line(node: Node<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

fn end_line(node: Node<'_>) -> u32 {
    node.end_position().row as u32 + 1
}

/// First ERROR or MISSING node in document order.
fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = first_error(child) {
            return Some(found);
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Class,
    Function,
}

#[derive(Debug, Clone)]
struct Scope {
    kind: ScopeKind,
    name: String,
}

/// A name reference waiting for the resolver.
#[derive(Debug, Clone)]
struct RawReference {
    from: String,
    name: String,
    edge_type: EdgeType,
    verb: &'static str,
    line: u32,
    class_scope: Option<String>,
}

/// Accumulates one file's nodes and references while a front-end walks
/// the syntax tree. Resolution happens in [`Collector::finish`], once the
/// whole import table is known.
pub(crate) struct Collector<'a> {
    file: &'a SourceFile,
    source: &'a str,
    pub imports: ImportTable,
    nodes: Vec<GraphNode>,
    seen: HashSet<String>,
    edges: Vec<GraphEdge>,
    refs: Vec<RawReference>,
    warnings: Vec<AnalysisWarning>,
    scopes: Vec<Scope>,
}

impl<'a> Collector<'a> {
    pub fn new(file: &'a SourceFile, source: &'a str) -> Self {
        let file_node = GraphNode {
            end_line_number: Some(source.lines().count().max(1) as u32),
            ..GraphNode::file(file.module.clone(), file.file_path.clone(), file.file_name())
        };
        Collector {
            file,
            source,
            imports: ImportTable::new(),
            seen: HashSet::from([file_node.id.clone()]),
            nodes: vec![file_node],
            edges: Vec::new(),
            refs: Vec::new(),
            warnings: Vec::new(),
            scopes: Vec::new(),
        }
    }

    pub fn text(&self, node: Node<'_>) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    pub fn module(&self) -> &'a str {
        let file: &'a SourceFile = self.file;
        &file.module
    }

    pub fn is_package(&self) -> bool {
        self.file.is_package()
    }

    fn file_id(&self) -> String {
        self.file.module.clone()
    }

    pub fn set_file_docstring(&mut self, docstring: Option<String>) {
        if let Some(file_node) = self.nodes.first_mut() {
            file_node.docstring = docstring;
        }
    }

    pub fn at_module_level(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn in_class_body(&self) -> bool {
        self.scopes.last().is_some_and(|s| s.kind == ScopeKind::Class)
    }

    fn qualified(&self, upto: usize, name: Option<&str>) -> String {
        let mut parts: Vec<&str> = self.scopes[..upto].iter().map(|s| s.name.as_str()).collect();
        parts.extend(name);
        parts.join(".")
    }

    /// Node id a definition named `name` would get in the current scope.
    pub fn id_for(&self, name: &str) -> String {
        node_id(self.module(), Some(&self.qualified(self.scopes.len(), Some(name))))
    }

    /// Nearest enclosing named function, else the file node.
    fn owner(&self) -> String {
        match self.scopes.iter().rposition(|s| s.kind == ScopeKind::Function) {
            Some(i) => node_id(self.module(), Some(&self.qualified(i + 1, None))),
            None => self.file_id(),
        }
    }

    /// Qualified name of the nearest enclosing class.
    fn class_scope(&self) -> Option<String> {
        self.scopes
            .iter()
            .rposition(|s| s.kind == ScopeKind::Class)
            .map(|i| self.qualified(i + 1, None))
    }

    /// A node for a definition at `node`, named `name`, in the current scope.
    pub fn symbol(&self, node_type: NodeType, name: &str, node: Node<'_>) -> GraphNode {
        GraphNode {
            id: self.id_for(name),
            node_type,
            file_path: self.file.file_path.clone(),
            line_number: line(node),
            name: name.to_string(),
            docstring: None,
            parameters: Vec::new(),
            return_type: None,
            end_line_number: Some(end_line(node)),
        }
    }

    /// Record a definition. Redefinitions keep the first node.
    pub fn define(&mut self, node: GraphNode) -> String {
        let id = node.id.clone();
        if self.seen.insert(id.clone()) {
            self.nodes.push(node);
        }
        id
    }

    /// Shorthand for a callable definition.
    pub fn define_callable(
        &mut self,
        name: &str,
        node: Node<'_>,
        parameters: Vec<Parameter>,
        return_type: Option<String>,
        docstring: Option<String>,
    ) -> String {
        let node_type = if self.in_class_body() {
            NodeType::Method
        } else {
            NodeType::Function
        };
        let symbol = GraphNode {
            parameters,
            return_type,
            docstring,
            ..self.symbol(node_type, name, node)
        };
        self.define(symbol)
    }

    pub fn enter(&mut self, kind: ScopeKind, name: &str) {
        self.scopes.push(Scope {
            kind,
            name: name.to_string(),
        });
    }

    pub fn exit(&mut self) {
        self.scopes.pop();
    }

    /// A reference from the nearest named function (or the file).
    pub fn reference(&mut self, edge_type: EdgeType, verb: &'static str, name: String, line: u32) {
        let from = self.owner();
        self.reference_from(from, edge_type, verb, name, line);
    }

    /// A reference from an explicit node, e.g. a class to its base.
    pub fn reference_from(
        &mut self,
        from: String,
        edge_type: EdgeType,
        verb: &'static str,
        name: String,
        line: u32,
    ) {
        if name.is_empty() {
            return;
        }
        let class_scope = self.class_scope();
        self.refs.push(RawReference {
            from,
            name,
            edge_type,
            verb,
            line,
            class_scope,
        });
    }

    /// A literal import of module `target`.
    pub fn import(&mut self, target: String, line: u32) {
        if target.is_empty() {
            return;
        }
        self.edges.push(GraphEdge {
            from_node: self.file_id(),
            label: format!("imports {}", target),
            to_node: target,
            edge_type: EdgeType::Import,
            confidence: Confidence::High,
            line_number: line,
        });
    }

    /// An import whose module is computed at runtime.
    pub fn dynamic_import(&mut self, expression: &str, line: u32) {
        self.edges.push(GraphEdge {
            from_node: self.file_id(),
            to_node: expression.to_string(),
            edge_type: EdgeType::Import,
            confidence: Confidence::Unsafe,
            line_number: line,
            label: format!("imports {}", expression),
        });
        self.warn(
            warning_kind::DYNAMIC_IMPORT,
            line,
            format!("dynamic import of `{}` cannot be resolved statically", expression),
            Severity::Medium,
        );
    }

    pub fn warn(&mut self, kind: &str, line: u32, description: String, severity: Severity) {
        self.warnings.push(AnalysisWarning::new(
            kind,
            self.file.file_path.clone(),
            line,
            description,
            severity,
        ));
    }

    /// Emit a parse_error warning for the first syntax error under `root`.
    pub fn report_syntax_errors(&mut self, root: Node<'_>) {
        if let Some(error) = first_error(root) {
            let at = line(error);
            self.warn(
                warning_kind::PARSE_ERROR,
                at,
                format!("syntax error at line {}; results are partial", at),
                Severity::High,
            );
        }
    }

    /// Resolve every collected reference and assemble the file result.
    pub fn finish(self, resolver: &SymbolResolver) -> FileAnalysis {
        let Collector {
            file,
            imports,
            nodes,
            mut edges,
            refs,
            mut warnings,
            ..
        } = self;

        for reference in refs {
            let resolution = resolver.resolve_reference(
                &reference.name,
                &imports,
                &file.module,
                reference.class_scope.as_deref(),
            );
            if let Some(kind) = resolution.warning {
                warnings.push(AnalysisWarning::new(
                    kind,
                    file.file_path.clone(),
                    reference.line,
                    format!("`{}` cannot be resolved statically", reference.name),
                    Severity::Medium,
                ));
            }
            edges.push(GraphEdge {
                from_node: reference.from,
                to_node: resolution.target,
                edge_type: reference.edge_type,
                confidence: resolution.confidence,
                line_number: reference.line,
                label: format!("{} {}", reference.verb, reference.name),
            });
        }

        FileAnalysis {
            nodes,
            edges,
            warnings,
        }
    }
}

/// Trim every line of a doc comment body and drop blank edges.
pub(crate) fn clean_doc(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw.lines().map(str::trim).collect();
    let text = lines.join("\n");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
