//! Core data structures for the dependency graph

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Version of the serialized `ProjectGraph` layout.
pub const GRAPH_FORMAT_VERSION: &str = "1.0";

/// Discriminates what kind of code entity a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    File,
    Class,
    Function,
    Method,
    Variable,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::File => "file",
            NodeType::Class => "class",
            NodeType::Function => "function",
            NodeType::Method => "method",
            NodeType::Variable => "variable",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, NodeType::Function | NodeType::Method)
    }
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    Import,
    Call,
    Inherit,
    Reference,
}

/// How sure the resolver is about an edge's target. Ordered weakest first,
/// so `a >= b` reads as "a is at least as trustworthy as b".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Unsafe,
    Low,
    Medium,
    High,
}

impl Confidence {
    pub const ALL: [Confidence; 4] = [
        Confidence::High,
        Confidence::Medium,
        Confidence::Low,
        Confidence::Unsafe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
            Confidence::Unsafe => "unsafe",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warning severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Source languages the engine has a front-end for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Tsx,
}

/// The two front-end families. Every `Language` belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageFamily {
    /// Indentation-block scripting language.
    Script,
    /// Brace-block language, optionally typed.
    Brace,
}

impl Language {
    /// Detect language from file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str())? {
            "py" | "pyi" => Some(Language::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" | "mts" | "cts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            _ => None,
        }
    }

    pub fn family(&self) -> LanguageFamily {
        match self {
            Language::Python => LanguageFamily::Script,
            Language::JavaScript | Language::TypeScript | Language::Tsx => LanguageFamily::Brace,
        }
    }
}

/// A declared parameter: its name plus the type text, when one was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_annotation: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, type_annotation: Option<String>) -> Self {
        Parameter {
            name: name.into(),
            type_annotation,
        }
    }
}

/// A single node in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// `module` for files, `module:Qualified.name` for everything else.
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Path of the source file that owns this node.
    pub file_path: String,
    /// 1-based.
    pub line_number: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line_number: Option<u32>,
}

impl GraphNode {
    /// The one File node every parse emits.
    pub fn file(id: impl Into<String>, file_path: impl Into<String>, name: impl Into<String>) -> Self {
        GraphNode {
            id: id.into(),
            node_type: NodeType::File,
            file_path: file_path.into(),
            line_number: 1,
            name: name.into(),
            docstring: None,
            parameters: Vec::new(),
            return_type: None,
            end_line_number: None,
        }
    }
}

/// A directed dependency. `to_node` may name a node that is not in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from_node: String,
    pub to_node: String,
    pub edge_type: EdgeType,
    pub confidence: Confidence,
    pub line_number: u32,
    /// Human-readable label, e.g. "calls fetch_user".
    pub label: String,
}

/// Short codes used in `AnalysisWarning::kind`.
pub mod warning_kind {
    pub const PARSE_ERROR: &str = "parse_error";
    pub const READ_ERROR: &str = "read_error";
    pub const WORKER_FAULT: &str = "worker_fault";
    pub const DYNAMIC_CALL: &str = "dynamic_call";
    pub const REFLECTION_CALL: &str = "reflection_call";
    pub const DYNAMIC_IMPORT: &str = "dynamic_import";
    pub const WILDCARD_IMPORT: &str = "wildcard_import";
    pub const CIRCULAR_DEPENDENCY: &str = "circular_dependency";
    pub const MODULE_COLLISION: &str = "module_collision";
}

/// Something the analysis could not resolve with confidence. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWarning {
    #[serde(rename = "type")]
    pub kind: String,
    pub file: String,
    pub line: u32,
    pub description: String,
    pub severity: Severity,
}

impl AnalysisWarning {
    pub fn new(
        kind: &str,
        file: impl Into<String>,
        line: u32,
        description: impl Into<String>,
        severity: Severity,
    ) -> Self {
        AnalysisWarning {
            kind: kind.to_string(),
            file: file.into(),
            line,
            description: description.into(),
            severity,
        }
    }

    /// A file-scoped failure: the file could not be read or parsed.
    pub fn file_fault(kind: &str, file: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(kind, file, 0, description, Severity::High)
    }
}

/// Everything one front-end pass produced for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub warnings: Vec<AnalysisWarning>,
}

/// Summary statistics for a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub files: usize,
    /// Functions and methods.
    pub functions: usize,
    pub classes: usize,
    pub edges: usize,
    pub high_confidence_edges: usize,
    pub medium_confidence_edges: usize,
    pub low_confidence_edges: usize,
    pub unsafe_edges: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_time_ms: Option<u64>,
}

impl GraphSummary {
    pub fn edges_with(&self, confidence: Confidence) -> usize {
        match confidence {
            Confidence::High => self.high_confidence_edges,
            Confidence::Medium => self.medium_confidence_edges,
            Confidence::Low => self.low_confidence_edges,
            Confidence::Unsafe => self.unsafe_edges,
        }
    }
}

/// Complete project dependency graph, as returned over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectGraph {
    pub version: String,
    pub project_root: String,
    pub analysis_timestamp: String,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub warnings: Vec<AnalysisWarning>,
    pub summary: GraphSummary,
}

/// Result of a "what depends on this" query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactReport {
    pub changed_file: String,
    #[serde(default)]
    pub changed_function: Option<String>,
    pub affected_files: Vec<String>,
    pub affected_functions: Vec<String>,
    pub suggested_tests: Vec<String>,
    /// Tier counts over the queried node's direct incoming edges only.
    pub confidence_breakdown: BTreeMap<Confidence, usize>,
    pub impact_depth: usize,
    pub has_circular_dependencies: bool,
}

impl ImpactReport {
    /// The report for a node nothing depends on (or that does not exist).
    pub fn empty(node_id: &str) -> Self {
        let (file, function) = crate::module_id::split_node_id(node_id);
        ImpactReport {
            changed_file: file.to_string(),
            changed_function: function.map(str::to_string),
            ..Default::default()
        }
    }
}
