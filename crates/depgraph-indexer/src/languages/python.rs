//! Python language extractor using tree-sitter

use std::path::Path;

use anyhow::Result;
use depgraph_core::module_id::{python_module, python_relative_module};
use depgraph_core::{EdgeType, FileAnalysis, LanguageFamily, NodeType, Parameter, Severity, warning_kind};
use tree_sitter::Node;

use super::{Collector, ScopeKind, clean_doc, line};
use crate::extractor::{LanguageExtractor, SourceFile};
use crate::parser_pool::{ParseRequest, ParserPool};
use crate::resolver::SymbolResolver;

/// Files that make `module` importable below `root`.
fn python_module_exists(root: &Path, module: &str) -> bool {
    let base = root.join(module);
    let candidates = [
        base.with_extension("py"),
        base.with_extension("pyi"),
        base.join("__init__.py"),
        base.join("__init__.pyi"),
    ];
    candidates.iter().any(|candidate| candidate.is_file())
}

/// Calls that load a module by name at runtime.
const IMPORT_FUNCTIONS: &[&str] = &["importlib.import_module", "import_module", "__import__"];

pub struct PythonExtractor {
    parser_pool: ParserPool,
    resolver: SymbolResolver,
}

impl PythonExtractor {
    pub fn new(parser_pool: ParserPool) -> Self {
        Self {
            parser_pool,
            resolver: SymbolResolver::new(LanguageFamily::Script),
        }
    }
}

impl LanguageExtractor for PythonExtractor {
    fn extract(&self, file: &SourceFile, content: &str) -> Result<FileAnalysis> {
        let parsed = self.parser_pool.parse(ParseRequest {
            language: file.language,
            content: content.to_string(),
            path: file.path.clone(),
        })?;
        let root = parsed.tree.root_node();

        let mut walker = Walker {
            c: Collector::new(file, content),
        };
        walker.c.report_syntax_errors(root);
        let docstring = walker.docstring(root);
        walker.c.set_file_docstring(docstring);
        walker.collect_imports(root);
        walker.visit(root);
        Ok(walker.c.finish(&self.resolver))
    }
}

struct Walker<'a> {
    c: Collector<'a>,
}

impl<'a> Walker<'a> {
    /// Literal value of a plain string; `None` for f-strings and non-strings.
    fn string_literal(&self, node: Node<'_>) -> Option<String> {
        if node.kind() != "string" {
            return None;
        }
        let mut value = String::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "interpolation" => return None,
                "string_content" => value.push_str(self.c.text(child)),
                _ => {}
            }
        }
        Some(value)
    }

    /// Docstring of a module or block: a leading string expression statement.
    fn docstring(&self, body: Node<'_>) -> Option<String> {
        let mut cursor = body.walk();
        let first = body
            .named_children(&mut cursor)
            .find(|n| n.kind() != "comment")?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let literal = self.string_literal(first.named_child(0)?)?;
        clean_doc(&literal)
    }

    fn collect_imports(&mut self, node: Node<'_>) {
        match node.kind() {
            "import_statement" => self.import_statement(node),
            "import_from_statement" => self.import_from_statement(node),
            _ => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    self.collect_imports(child);
                }
            }
        }
    }

    /// `import a.b` and `import a.b as c`.
    fn import_statement(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let (dotted, alias) = match name.kind() {
                "aliased_import" => {
                    let dotted = name.child_by_field_name("name").map(|n| self.c.text(n));
                    let alias = name.child_by_field_name("alias").map(|n| self.c.text(n));
                    (dotted.unwrap_or(""), alias)
                }
                _ => (self.c.text(name), None),
            };
            let module = python_module(dotted);
            match alias {
                Some(alias) => self.c.imports.bind_module(alias, module.clone()),
                None => {
                    // `import a.b` also binds `a`; the dotted binding wins for `a.b.x`.
                    if let Some((head, _)) = dotted.split_once('.') {
                        self.c.imports.bind_module(head, python_module(head));
                    }
                    self.c.imports.bind_module(dotted, module.clone());
                }
            }
            self.c.import(module, line(node));
        }
    }

    /// `from m import x as y`, relative forms and wildcards.
    fn import_from_statement(&mut self, node: Node<'_>) {
        let Some(source) = node.child_by_field_name("module_name") else {
            return;
        };
        let module = if source.kind() == "relative_import" {
            let mut level = 0;
            let mut rest = None;
            let mut cursor = source.walk();
            for part in source.named_children(&mut cursor) {
                match part.kind() {
                    "import_prefix" => level = self.c.text(part).matches('.').count(),
                    "dotted_name" => rest = Some(self.c.text(part)),
                    _ => {}
                }
            }
            python_relative_module(self.c.module(), self.c.is_package(), level, rest)
        } else {
            python_module(self.c.text(source))
        };

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "wildcard_import" {
                self.c.warn(
                    warning_kind::WILDCARD_IMPORT,
                    line(node),
                    format!("wildcard import from {} hides which names are used", module),
                    Severity::Low,
                );
            }
        }

        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let (member, alias) = match name.kind() {
                "aliased_import" => (
                    name.child_by_field_name("name").map(|n| self.c.text(n)).unwrap_or(""),
                    name.child_by_field_name("alias").map(|n| self.c.text(n)),
                ),
                _ => (self.c.text(name), None),
            };
            if member.is_empty() {
                continue;
            }
            // `from pkg import base` names the submodule when one exists.
            let submodule = match module.as_str() {
                "" => python_module(member),
                parent => format!("{}/{}", parent, python_module(member)),
            };
            if self.is_project_module(&submodule) {
                self.c.imports.bind_module(alias.unwrap_or(member), submodule.clone());
                self.c.import(submodule, line(node));
            } else {
                self.c
                    .imports
                    .bind_member(alias.unwrap_or(member), module.clone(), member);
            }
        }
        self.c.import(module, line(node));
    }

    fn is_project_module(&self, module: &str) -> bool {
        self.c
            .file
            .project_root()
            .is_some_and(|root| python_module_exists(&root, module))
    }

    fn visit_children(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child);
        }
    }

    fn visit(&mut self, node: Node<'_>) {
        match node.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => {}
            "class_definition" => self.visit_class(node, &[]),
            "function_definition" => self.visit_function(node, &[]),
            "decorated_definition" => {
                let mut cursor = node.walk();
                let decorators: Vec<Node<'_>> = node
                    .named_children(&mut cursor)
                    .filter(|c| c.kind() == "decorator")
                    .collect();
                match node.child_by_field_name("definition") {
                    Some(def) if def.kind() == "class_definition" => self.visit_class(def, &decorators),
                    Some(def) if def.kind() == "function_definition" => {
                        self.visit_function(def, &decorators)
                    }
                    _ => self.visit_children(node),
                }
            }
            "call" => self.visit_call(node),
            "assignment" => self.visit_assignment(node),
            _ => self.visit_children(node),
        }
    }

    fn decorate(&mut self, target: &str, decorators: &[Node<'_>]) {
        for decorator in decorators {
            let Some(expression) = decorator.named_child(0) else {
                continue;
            };
            let callee = if expression.kind() == "call" {
                if let Some(arguments) = expression.child_by_field_name("arguments") {
                    self.visit(arguments);
                }
                expression.child_by_field_name("function")
            } else {
                Some(expression)
            };
            if let Some(name) = callee.and_then(|n| self.reference_name(n)) {
                self.c
                    .reference_from(target.to_string(), EdgeType::Call, "decorated by", name, line(*decorator));
            }
        }
    }

    fn visit_class(&mut self, node: Node<'_>, decorators: &[Node<'_>]) {
        let name = node.child_by_field_name("name").map(|n| self.c.text(n)).unwrap_or("");
        if name.is_empty() {
            self.visit_children(node);
            return;
        }
        let body = node.child_by_field_name("body");
        let mut class = self.c.symbol(NodeType::Class, name, node);
        class.docstring = body.and_then(|b| self.docstring(b));
        let id = self.c.define(class);
        self.decorate(&id, decorators);

        if let Some(bases) = node.child_by_field_name("superclasses") {
            let mut cursor = bases.walk();
            for base in bases.named_children(&mut cursor) {
                if base.kind() == "keyword_argument" {
                    continue;
                }
                let base = match base.kind() {
                    "subscript" => base.child_by_field_name("value").unwrap_or(base),
                    _ => base,
                };
                if let Some(base_name) = self.reference_name(base) {
                    self.c
                        .reference_from(id.clone(), EdgeType::Inherit, "inherits from", base_name, line(node));
                }
            }
        }

        self.c.enter(ScopeKind::Class, name);
        if let Some(body) = body {
            self.visit(body);
        }
        self.c.exit();
    }

    fn visit_function(&mut self, node: Node<'_>, decorators: &[Node<'_>]) {
        let name = node.child_by_field_name("name").map(|n| self.c.text(n)).unwrap_or("");
        let parameters = node.child_by_field_name("parameters");
        let body = node.child_by_field_name("body");
        let return_type = node
            .child_by_field_name("return_type")
            .map(|n| self.c.text(n).to_string());
        let docstring = body.and_then(|b| self.docstring(b));
        let params = parameters.map(|p| self.parameters(p)).unwrap_or_default();

        let id = self
            .c
            .define_callable(name, node, params, return_type, docstring);
        self.decorate(&id, decorators);
        // Defaults are evaluated in the enclosing scope.
        if let Some(parameters) = parameters {
            self.visit(parameters);
        }

        self.c.enter(ScopeKind::Function, name);
        if let Some(body) = body {
            self.visit(body);
        }
        self.c.exit();
    }

    fn parameters(&self, node: Node<'_>) -> Vec<Parameter> {
        let mut params = Vec::new();
        let mut cursor = node.walk();
        for param in node.named_children(&mut cursor) {
            let field_text = |field: &str| param.child_by_field_name(field).map(|n| self.c.text(n));
            let (name, ty) = match param.kind() {
                "identifier" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                    (Some(self.c.text(param)), None)
                }
                "typed_parameter" => (param.named_child(0).map(|n| self.c.text(n)), field_text("type")),
                "default_parameter" => (field_text("name"), None),
                "typed_default_parameter" => (field_text("name"), field_text("type")),
                _ => (None, None),
            };
            if let Some(name) = name.filter(|n| !n.is_empty()) {
                params.push(Parameter::new(name, ty.map(str::to_string)));
            }
        }
        params
    }

    /// `x = ...` at module level defines a variable, or a function when the
    /// value is a lambda.
    fn visit_assignment(&mut self, node: Node<'_>) {
        let left = node.child_by_field_name("left");
        let right = node.child_by_field_name("right");
        let target = left
            .filter(|l| l.kind() == "identifier" && self.c.at_module_level())
            .map(|l| self.c.text(l));

        match (target, right) {
            (Some(name), Some(lambda)) if lambda.kind() == "lambda" => {
                let params = lambda
                    .child_by_field_name("parameters")
                    .map(|p| self.parameters(p))
                    .unwrap_or_default();
                self.c.define_callable(name, node, params, None, None);
                self.c.enter(ScopeKind::Function, name);
                if let Some(body) = lambda.child_by_field_name("body") {
                    self.visit(body);
                }
                self.c.exit();
            }
            (Some(name), _) => {
                let variable = self.c.symbol(NodeType::Variable, name, node);
                self.c.define(variable);
                if let Some(right) = right {
                    self.visit(right);
                }
            }
            (None, _) => self.visit_children(node),
        }
    }

    fn visit_call(&mut self, node: Node<'_>) {
        let function = node.child_by_field_name("function");
        let arguments = node.child_by_field_name("arguments");
        let callee = function.map(|f| self.c.text(f)).unwrap_or("");

        if IMPORT_FUNCTIONS.contains(&callee) {
            self.dynamic_import_call(node, arguments);
        } else if callee == "getattr" {
            match self.getattr_target(node) {
                Some(target) => self.c.reference(EdgeType::Reference, "references", target, line(node)),
                None => self.c.reference(EdgeType::Call, "calls", callee.to_string(), line(node)),
            }
        } else if let Some(name) = function.and_then(|f| self.reference_name(f)) {
            self.c.reference(EdgeType::Call, "calls", name, line(node));
        }
        self.visit_children(node);
    }

    fn dynamic_import_call(&mut self, node: Node<'_>, arguments: Option<Node<'_>>) {
        let Some(first) = arguments.and_then(|a| a.named_child(0)) else {
            return;
        };
        match self.string_literal(first) {
            Some(name) => {
                let level = name.len() - name.trim_start_matches('.').len();
                let module = if level > 0 {
                    python_relative_module(
                        self.c.module(),
                        self.c.is_package(),
                        level,
                        Some(&name[level..]),
                    )
                } else {
                    python_module(&name)
                };
                self.c.import(module, line(node));
            }
            None => {
                let expression = self.c.text(first);
                self.c.dynamic_import(expression, line(node));
            }
        }
    }

    /// `getattr(obj, "name")` reads as `obj.name`.
    fn getattr_target(&self, call: Node<'_>) -> Option<String> {
        let arguments = call.child_by_field_name("arguments")?;
        let object = self.reference_name(arguments.named_child(0)?)?;
        let attribute = self.string_literal(arguments.named_child(1)?)?;
        Some(format!("{}.{}", object, attribute))
    }

    /// Dotted name of a callee or base expression, with computed parts kept
    /// in brackets so the resolver can flag them.
    fn reference_name(&self, node: Node<'_>) -> Option<String> {
        match node.kind() {
            "identifier" => Some(self.c.text(node).to_string()),
            "attribute" => {
                let object = self.reference_name(node.child_by_field_name("object")?)?;
                let attribute = self.c.text(node.child_by_field_name("attribute")?);
                Some(format!("{}.{}", object, attribute))
            }
            "subscript" => {
                let value = self.reference_name(node.child_by_field_name("value")?)?;
                let index = node.child_by_field_name("subscript")?;
                Some(match self.string_literal(index) {
                    Some(key) => format!("{}.{}", value, key),
                    None => format!("{}[{}]", value, self.c.text(index)),
                })
            }
            "call" => {
                let function = node.child_by_field_name("function")?;
                if self.c.text(function) == "getattr" {
                    return self.getattr_target(node).or_else(|| {
                        let arguments = node.child_by_field_name("arguments")?;
                        let object = self.reference_name(arguments.named_child(0)?)?;
                        let attribute = self.c.text(arguments.named_child(1)?);
                        Some(format!("{}[{}]", object, attribute))
                    });
                }
                self.reference_name(function)
            }
            "parenthesized_expression" | "await" => self.reference_name(node.named_child(0)?),
            _ => None,
        }
    }
}
