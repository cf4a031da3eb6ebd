//! JavaScript / TypeScript extractor using tree-sitter
//!
//! One walker serves `.js`, `.ts` and `.tsx`; the grammars share node kinds
//! for everything the graph cares about. TypeScript-only constructs
//! (`implements`, typed parameters, `import x = require()`) are handled where
//! they appear.

use anyhow::Result;
use depgraph_core::module_id::brace_specifier_module;
use depgraph_core::{EdgeType, FileAnalysis, LanguageFamily, NodeType, Parameter};
use tree_sitter::Node;

use super::{Collector, ScopeKind, clean_doc, line};
use crate::extractor::{LanguageExtractor, SourceFile};
use crate::parser_pool::{ParseRequest, ParserPool};
use crate::resolver::SymbolResolver;

const FUNCTION_VALUES: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
];

pub struct TypeScriptExtractor {
    parser_pool: ParserPool,
    resolver: SymbolResolver,
}

impl TypeScriptExtractor {
    pub fn new(parser_pool: ParserPool) -> Self {
        Self {
            parser_pool,
            resolver: SymbolResolver::new(LanguageFamily::Brace),
        }
    }
}

impl LanguageExtractor for TypeScriptExtractor {
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
        walker.collect_imports(root);
        walker.visit(root);
        Ok(walker.c.finish(&self.resolver))
    }
}

struct Walker<'a> {
    c: Collector<'a>,
}

impl<'a> Walker<'a> {
    /// Literal value of a quoted string or a template without substitutions.
    fn string_literal(&self, node: Node<'_>) -> Option<String> {
        if node.kind() != "string" && node.kind() != "template_string" {
            return None;
        }
        let mut value = String::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "template_substitution" => return None,
                "string_fragment" | "escape_sequence" => value.push_str(self.c.text(child)),
                _ => {}
            }
        }
        Some(value)
    }

    fn specifier_module(&self, specifier: &str) -> String {
        brace_specifier_module(self.c.module(), self.c.is_package(), specifier)
    }

    /// Preceding `/** ... */` block of a declaration, looking through an
    /// enclosing `export` statement.
    fn jsdoc(&self, node: Node<'_>) -> Option<String> {
        let mut target = node;
        while let Some(parent) = target.parent() {
            match parent.kind() {
                "export_statement" | "lexical_declaration" | "variable_declaration" => target = parent,
                _ => break,
            }
        }
        let comment = target.prev_named_sibling()?;
        if comment.kind() != "comment" {
            return None;
        }
        let text = self.c.text(comment);
        let body = text.strip_prefix("/**")?.strip_suffix("*/")?;
        let lines: Vec<&str> = body
            .lines()
            .map(|l| l.trim().trim_start_matches('*').trim())
            .collect();
        clean_doc(&lines.join("\n"))
    }

    /// Bind import aliases first so that later references resolve no matter
    /// where the import sits in the file.
    fn collect_imports(&mut self, node: Node<'_>) {
        match node.kind() {
            "import_statement" => self.import_statement(node),
            "export_statement" => {
                if let Some(source) = node.child_by_field_name("source") {
                    if let Some(specifier) = self.string_literal(source) {
                        let module = self.specifier_module(&specifier);
                        self.c.import(module, line(node));
                    }
                } else {
                    self.collect_children(node);
                }
            }
            "variable_declarator" => {
                self.require_binding(node);
                self.collect_children(node);
            }
            _ => self.collect_children(node),
        }
    }

    fn collect_children(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.collect_imports(child);
        }
    }

    fn import_statement(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        let mut source = node.child_by_field_name("source");
        let mut clause = None;
        let mut require_alias = None;
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "import_clause" => clause = Some(child),
                "import_require_clause" => {
                    source = child.child_by_field_name("source");
                    require_alias = child.named_child(0).map(|n| self.c.text(n));
                }
                _ => {}
            }
        }
        let Some(specifier) = source.and_then(|s| self.string_literal(s)) else {
            return;
        };
        let module = self.specifier_module(&specifier);

        if let Some(alias) = require_alias {
            self.c.imports.bind_module(alias, module.clone());
        }
        if let Some(clause) = clause {
            let mut cursor = clause.walk();
            for binding in clause.named_children(&mut cursor) {
                match binding.kind() {
                    "identifier" => {
                        let alias = self.c.text(binding);
                        self.c.imports.bind_module(alias, module.clone());
                    }
                    "namespace_import" => {
                        if let Some(alias) = binding.named_child(0).map(|n| self.c.text(n)) {
                            self.c.imports.bind_module(alias, module.clone());
                        }
                    }
                    "named_imports" => self.named_imports(binding, &module),
                    _ => {}
                }
            }
        }
        self.c.import(module, line(node));
    }

    fn named_imports(&mut self, node: Node<'_>, module: &str) {
        let mut cursor = node.walk();
        for specifier in node.named_children(&mut cursor) {
            if specifier.kind() != "import_specifier" {
                continue;
            }
            let Some(name) = specifier.child_by_field_name("name") else {
                continue;
            };
            let member = self
                .string_literal(name)
                .unwrap_or_else(|| self.c.text(name).to_string());
            let alias = specifier
                .child_by_field_name("alias")
                .map(|a| self.c.text(a).to_string())
                .unwrap_or_else(|| member.clone());
            self.c.imports.bind_member(alias, module, member);
        }
    }

    /// Literal specifier of `require("x")` or `import("x")`, looking through `await`.
    fn loader_specifier(&self, value: Node<'_>) -> Option<String> {
        let call = match value.kind() {
            "await_expression" => value.named_child(0)?,
            _ => value,
        };
        if call.kind() != "call_expression" || !self.is_loader(call) {
            return None;
        }
        let argument = call.child_by_field_name("arguments")?.named_child(0)?;
        self.string_literal(argument)
    }

    fn is_loader(&self, call: Node<'_>) -> bool {
        call.child_by_field_name("function")
            .is_some_and(|f| f.kind() == "import" || (f.kind() == "identifier" && self.c.text(f) == "require"))
    }

    /// `const x = require("m")` and `const { a, b: c } = require("m")`.
    fn require_binding(&mut self, declarator: Node<'_>) {
        let (Some(name), Some(value)) = (
            declarator.child_by_field_name("name"),
            declarator.child_by_field_name("value"),
        ) else {
            return;
        };
        let Some(specifier) = self.loader_specifier(value) else {
            return;
        };
        let module = self.specifier_module(&specifier);

        match name.kind() {
            "identifier" => {
                let alias = self.c.text(name);
                self.c.imports.bind_module(alias, module);
            }
            "object_pattern" => {
                let mut cursor = name.walk();
                for property in name.named_children(&mut cursor) {
                    match property.kind() {
                        "shorthand_property_identifier_pattern" => {
                            let member = self.c.text(property);
                            self.c.imports.bind_member(member, module.clone(), member);
                        }
                        "pair_pattern" => {
                            let key = property.child_by_field_name("key").map(|k| self.c.text(k));
                            let alias = property.child_by_field_name("value").map(|v| self.c.text(v));
                            if let (Some(key), Some(alias)) = (key, alias) {
                                self.c.imports.bind_member(alias, module.clone(), key);
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn visit_children(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child);
        }
    }

    fn visit(&mut self, node: Node<'_>) {
        match node.kind() {
            "import_statement" | "decorator" | "interface_declaration" | "type_alias_declaration" => {}
            "export_statement" if node.child_by_field_name("source").is_some() => {}
            "class_declaration" | "abstract_class_declaration" | "class" => self.visit_class(node, None),
            "function_declaration" | "generator_function_declaration" => self.visit_function(node),
            "method_definition" if self.c.in_class_body() => self.visit_method(node, &[]),
            "lexical_declaration" | "variable_declaration" => {
                let mut cursor = node.walk();
                let declarators: Vec<Node<'_>> = node
                    .named_children(&mut cursor)
                    .filter(|d| d.kind() == "variable_declarator")
                    .collect();
                for declarator in declarators {
                    self.visit_declarator(declarator);
                }
            }
            "call_expression" => self.visit_call(node),
            "new_expression" => self.visit_new(node),
            _ => self.visit_children(node),
        }
    }

    fn decorate(&mut self, target: &str, decorators: &[Node<'_>]) {
        for decorator in decorators {
            let Some(expression) = decorator.named_child(0) else {
                continue;
            };
            let callee = if expression.kind() == "call_expression" {
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

    fn decorators_of<'t>(node: Node<'t>) -> Vec<Node<'t>> {
        let mut cursor = node.walk();
        let decorators = node
            .children(&mut cursor)
            .filter(|c| c.kind() == "decorator")
            .collect();
        decorators
    }

    fn visit_class(&mut self, node: Node<'_>, name_hint: Option<&str>) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.c.text(n))
            .or(name_hint)
            .unwrap_or("");
        if name.is_empty() {
            self.visit_children(node);
            return;
        }
        let mut class = self.c.symbol(NodeType::Class, name, node);
        class.docstring = self.jsdoc(node);
        let id = self.c.define(class);

        let mut decorators = Self::decorators_of(node);
        if let Some(parent) = node.parent().filter(|p| p.kind() == "export_statement") {
            decorators.extend(Self::decorators_of(parent));
        }
        self.decorate(&id, &decorators);

        let mut cursor = node.walk();
        let heritage = node
            .children(&mut cursor)
            .find(|c| c.kind() == "class_heritage");
        if let Some(heritage) = heritage {
            self.heritage(&id, heritage, line(node));
        }

        self.c.enter(ScopeKind::Class, name);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit_class_body(body);
        }
        self.c.exit();
    }

    fn heritage(&mut self, class_id: &str, heritage: Node<'_>, at: u32) {
        let mut cursor = heritage.walk();
        for clause in heritage.named_children(&mut cursor) {
            match clause.kind() {
                "extends_clause" => {
                    let mut inner = clause.walk();
                    for base in clause.named_children(&mut inner) {
                        if base.kind() == "type_arguments" {
                            continue;
                        }
                        if let Some(name) = self.reference_name(base) {
                            self.c
                                .reference_from(class_id.to_string(), EdgeType::Inherit, "inherits from", name, at);
                        }
                    }
                }
                "implements_clause" => {
                    let mut inner = clause.walk();
                    for contract in clause.named_children(&mut inner) {
                        let name = self.type_name(contract);
                        self.c
                            .reference_from(class_id.to_string(), EdgeType::Reference, "implements", name, at);
                    }
                }
                _ => {
                    if let Some(name) = self.reference_name(clause) {
                        self.c
                            .reference_from(class_id.to_string(), EdgeType::Inherit, "inherits from", name, at);
                    }
                }
            }
        }
    }

    /// `Foo`, `ns.Foo` or `Foo<T>` as a plain dotted name.
    fn type_name(&self, node: Node<'_>) -> String {
        match node.kind() {
            "generic_type" => node
                .child_by_field_name("name")
                .map(|n| self.type_name(n))
                .unwrap_or_default(),
            _ => self.c.text(node).to_string(),
        }
    }

    fn visit_class_body(&mut self, body: Node<'_>) {
        let mut pending: Vec<Node<'_>> = Vec::new();
        let mut cursor = body.walk();
        let members: Vec<Node<'_>> = body.named_children(&mut cursor).collect();
        for member in members {
            match member.kind() {
                "decorator" => pending.push(member),
                "method_definition" => {
                    let mut decorators = std::mem::take(&mut pending);
                    decorators.extend(Self::decorators_of(member));
                    self.visit_method(member, &decorators);
                }
                "public_field_definition" | "field_definition" => {
                    let mut decorators = std::mem::take(&mut pending);
                    decorators.extend(Self::decorators_of(member));
                    self.visit_field(member, &decorators);
                }
                _ => self.visit(member),
            }
        }
    }

    fn member_name(&self, node: Option<Node<'_>>) -> Option<String> {
        let node = node?;
        match node.kind() {
            "property_identifier" | "private_property_identifier" | "identifier" => {
                Some(self.c.text(node).to_string())
            }
            "string" => self.string_literal(node),
            _ => None,
        }
    }

    fn visit_method(&mut self, node: Node<'_>, decorators: &[Node<'_>]) {
        let Some(name) = self.member_name(node.child_by_field_name("name")) else {
            self.visit_children(node);
            return;
        };
        self.visit_callable(&name, node, node, decorators);
    }

    /// Class fields whose value is a function are methods.
    fn visit_field(&mut self, node: Node<'_>, decorators: &[Node<'_>]) {
        let name = self.member_name(
            node.child_by_field_name("name")
                .or_else(|| node.child_by_field_name("property")),
        );
        let value = node.child_by_field_name("value");
        match (name, value) {
            (Some(name), Some(value)) if FUNCTION_VALUES.contains(&value.kind()) => {
                self.visit_callable(&name, node, value, decorators);
            }
            (_, Some(value)) => self.visit(value),
            _ => {}
        }
    }

    fn visit_function(&mut self, node: Node<'_>) {
        let name = node.child_by_field_name("name").map(|n| self.c.text(n)).unwrap_or("");
        if name.is_empty() {
            self.visit_children(node);
            return;
        }
        self.visit_callable(name, node, node, &[]);
    }

    /// Define a named callable: `decl` is where the name lives, `function`
    /// carries parameters and body (they differ for `const f = () => {}`).
    fn visit_callable(&mut self, name: &str, decl: Node<'_>, function: Node<'_>, decorators: &[Node<'_>]) {
        let params = self.parameters(function);
        let return_type = function
            .child_by_field_name("return_type")
            .map(|t| annotation_text(self.c.text(t)));
        let docstring = self.jsdoc(decl);
        let id = self
            .c
            .define_callable(name, decl, params, return_type, docstring);
        self.decorate(&id, decorators);
        if let Some(parameters) = function.child_by_field_name("parameters") {
            self.visit(parameters);
        }

        self.c.enter(ScopeKind::Function, name);
        if let Some(body) = function.child_by_field_name("body") {
            self.visit(body);
        }
        self.c.exit();
    }

    fn parameters(&self, function: Node<'_>) -> Vec<Parameter> {
        if let Some(single) = function.child_by_field_name("parameter") {
            return vec![Parameter::new(self.c.text(single), None)];
        }
        let Some(list) = function.child_by_field_name("parameters") else {
            return Vec::new();
        };
        let mut params = Vec::new();
        let mut cursor = list.walk();
        for param in list.named_children(&mut cursor) {
            let (name, ty) = match param.kind() {
                "identifier" | "rest_pattern" | "object_pattern" | "array_pattern" => {
                    (Some(self.c.text(param)), None)
                }
                "assignment_pattern" => (param.child_by_field_name("left").map(|n| self.c.text(n)), None),
                "required_parameter" | "optional_parameter" => (
                    param.child_by_field_name("pattern").map(|n| self.c.text(n)),
                    param
                        .child_by_field_name("type")
                        .map(|t| annotation_text(self.c.text(t))),
                ),
                _ => (None, None),
            };
            if let Some(name) = name.filter(|n| !n.is_empty()) {
                params.push(Parameter::new(name, ty));
            }
        }
        params
    }

    fn visit_declarator(&mut self, declarator: Node<'_>) {
        let name = declarator
            .child_by_field_name("name")
            .filter(|n| n.kind() == "identifier")
            .map(|n| self.c.text(n));
        let value = declarator.child_by_field_name("value");

        match (name, value) {
            (Some(name), Some(value)) if FUNCTION_VALUES.contains(&value.kind()) => {
                self.visit_callable(name, declarator, value, &[]);
            }
            (Some(name), Some(value)) if value.kind() == "class" => self.visit_class(value, Some(name)),
            (Some(name), value) => {
                let is_import = value.is_some_and(|v| self.loader_specifier(v).is_some());
                if self.c.at_module_level() && !is_import {
                    let mut variable = self.c.symbol(NodeType::Variable, name, declarator);
                    variable.docstring = self.jsdoc(declarator);
                    self.c.define(variable);
                }
                if let Some(value) = value {
                    self.visit(value);
                }
            }
            (None, Some(value)) => self.visit(value),
            (None, None) => {}
        }
    }

    fn visit_call(&mut self, node: Node<'_>) {
        if self.is_loader(node) {
            self.loader_call(node);
            return;
        }
        if let Some(name) = node
            .child_by_field_name("function")
            .and_then(|f| self.reference_name(f))
        {
            self.c.reference(EdgeType::Call, "calls", name, line(node));
        }
        self.visit_children(node);
    }

    /// `require(...)` and `import(...)`: literal specifiers are imports,
    /// anything else is a dynamic import.
    fn loader_call(&mut self, node: Node<'_>) {
        let Some(arguments) = node.child_by_field_name("arguments") else {
            return;
        };
        let Some(first) = arguments.named_child(0) else {
            return;
        };
        match self.string_literal(first) {
            Some(specifier) => {
                let module = self.specifier_module(&specifier);
                self.c.import(module, line(node));
            }
            None => {
                let expression = self.c.text(first);
                self.c.dynamic_import(expression, line(node));
                self.visit(arguments);
            }
        }
    }

    fn visit_new(&mut self, node: Node<'_>) {
        if let Some(name) = node
            .child_by_field_name("constructor")
            .and_then(|c| self.reference_name(c))
        {
            self.c.reference(EdgeType::Call, "instantiates", name, line(node));
        }
        self.visit_children(node);
    }

    /// Dotted name of a callee, with computed members kept in brackets.
    fn reference_name(&self, node: Node<'_>) -> Option<String> {
        match node.kind() {
            "identifier" | "this" | "super" => Some(self.c.text(node).to_string()),
            "member_expression" => {
                let object = self.reference_name(node.child_by_field_name("object")?)?;
                let property = self.c.text(node.child_by_field_name("property")?);
                Some(format!("{}.{}", object, property))
            }
            "subscript_expression" => {
                let object = self.reference_name(node.child_by_field_name("object")?)?;
                let index = node.child_by_field_name("index")?;
                Some(match self.string_literal(index) {
                    Some(key) => format!("{}.{}", object, key),
                    None => format!("{}[{}]", object, self.c.text(index)),
                })
            }
            "call_expression" => self.reference_name(node.child_by_field_name("function")?),
            "parenthesized_expression" | "non_null_expression" | "await_expression" => {
                self.reference_name(node.named_child(0)?)
            }
            _ => None,
        }
    }
}

/// `: Promise<User>` becomes `Promise<User>`.
fn annotation_text(text: &str) -> String {
    text.trim_start_matches(':').trim().to_string()
}
