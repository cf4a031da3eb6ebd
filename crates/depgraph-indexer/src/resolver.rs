//! Symbol Resolver: maps raw references to node ids with a confidence tier.
//!
//! Rules, first match wins:
//! 1. leading segment bound by an import: High, `<module>:<remainder>`
//! 2. language built-in: High, the literal name
//! 3. computed access or reflection: Unsafe, plus a warning
//! 4. `self.x` / `this.x` inside a class: Medium, `<module>:<Class>.x`
//! 5. undotted name: Medium, `<module>:<name>`
//! 6. anything else: Medium, the raw name verbatim

use depgraph_core::module_id::node_id;
use depgraph_core::{Confidence, LanguageFamily, warning_kind};

use crate::imports::ImportTable;

const SCRIPT_BUILTINS: &[&str] = &[
    "abs", "all", "any", "bin", "bool", "bytearray", "bytes", "callable", "chr", "classmethod",
    "delattr", "dict", "dir", "divmod", "enumerate", "filter", "float", "format", "frozenset",
    "hasattr", "hash", "hex", "id", "input", "int", "isinstance", "issubclass", "iter", "len",
    "list", "map", "max", "memoryview", "min", "next", "object", "oct", "open", "ord", "pow",
    "print", "property", "range", "repr", "reversed", "round", "set", "setattr", "slice",
    "sorted", "staticmethod", "str", "sum", "super", "tuple", "type", "vars", "zip",
    "Exception", "BaseException", "ValueError", "TypeError", "KeyError", "IndexError",
    "AttributeError", "RuntimeError", "NotImplementedError", "StopIteration", "OSError",
    "IOError", "FileNotFoundError", "PermissionError", "ImportError", "AssertionError",
];

const BRACE_BUILTINS: &[&str] = &[
    "console", "Object", "Array", "Promise", "JSON", "Math", "String", "Number", "Boolean",
    "Symbol", "BigInt", "Map", "Set", "WeakMap", "WeakSet", "Date", "RegExp", "Error",
    "TypeError", "RangeError", "SyntaxError", "parseInt", "parseFloat", "isNaN", "isFinite",
    "setTimeout", "clearTimeout", "setInterval", "clearInterval", "queueMicrotask",
    "structuredClone", "encodeURIComponent", "decodeURIComponent", "encodeURI", "decodeURI",
    "fetch", "Buffer", "process", "globalThis", "window", "document", "Proxy", "Intl",
    "URL", "URLSearchParams", "TextEncoder", "TextDecoder", "AbortController", "super",
];

const SCRIPT_REFLECTION: &[&str] = &["eval", "exec", "getattr", "__import__", "compile"];

const BRACE_REFLECTION: &[&str] = &["eval", "Function", "Reflect"];

/// Outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub target: String,
    pub confidence: Confidence,
    /// Warning kind for references that cannot be resolved statically.
    pub warning: Option<&'static str>,
}

impl Resolution {
    fn new(target: impl Into<String>, confidence: Confidence) -> Self {
        Resolution {
            target: target.into(),
            confidence,
            warning: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SymbolResolver {
    builtins: &'static [&'static str],
    reflection: &'static [&'static str],
    receiver: &'static str,
}

impl SymbolResolver {
    pub fn new(family: LanguageFamily) -> Self {
        match family {
            LanguageFamily::Script => SymbolResolver {
                builtins: SCRIPT_BUILTINS,
                reflection: SCRIPT_REFLECTION,
                receiver: "self",
            },
            LanguageFamily::Brace => SymbolResolver {
                builtins: BRACE_BUILTINS,
                reflection: BRACE_REFLECTION,
                receiver: "this",
            },
        }
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtins.contains(&name)
    }

    pub fn is_reflection(&self, name: &str) -> bool {
        self.reflection.contains(&name)
    }

    /// Resolve `raw_name` as seen from `module`, optionally inside a class
    /// whose qualified name is `class_scope`.
    pub fn resolve_reference(
        &self,
        raw_name: &str,
        imports: &ImportTable,
        module: &str,
        class_scope: Option<&str>,
    ) -> Resolution {
        if let Some(target) = imports.resolve(raw_name) {
            return Resolution::new(target, Confidence::High);
        }

        let head = raw_name
            .split(['.', '['])
            .next()
            .unwrap_or(raw_name);
        if self.is_builtin(head) && !raw_name.contains('[') {
            return Resolution::new(raw_name, Confidence::High);
        }

        if raw_name.contains('[') || raw_name.contains('(') {
            return Resolution {
                target: raw_name.to_string(),
                confidence: Confidence::Unsafe,
                warning: Some(warning_kind::DYNAMIC_CALL),
            };
        }
        if self.is_reflection(head) {
            return Resolution {
                target: raw_name.to_string(),
                confidence: Confidence::Unsafe,
                warning: Some(warning_kind::REFLECTION_CALL),
            };
        }

        if let (Some(class), Some(member)) = (
            class_scope,
            raw_name
                .strip_prefix(self.receiver)
                .and_then(|rest| rest.strip_prefix('.')),
        ) {
            return Resolution::new(
                node_id(module, Some(&format!("{}.{}", class, member))),
                Confidence::Medium,
            );
        }

        if !raw_name.contains('.') {
            return Resolution::new(node_id(module, Some(raw_name)), Confidence::Medium);
        }

        Resolution::new(raw_name, Confidence::Medium)
    }
}
