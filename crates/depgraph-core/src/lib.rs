//! depgraph core: node/edge model, live graph, builder and impact queries

pub mod builder;
pub mod config;
pub mod graph;
pub mod impact;
pub mod model;
pub mod module_id;

#[cfg(test)]
pub mod tests;

pub use builder::{GraphBuilder, snapshot, summarize};
pub use config::{BraceBackend, BraceParserConfig, ConfigError, EngineConfig};
pub use graph::Graph;
pub use impact::{ImpactAnalyzer, ImpactOptions};
pub use model::{
    AnalysisWarning, Confidence, EdgeType, FileAnalysis, GraphEdge, GraphNode, GraphSummary,
    ImpactReport, Language, LanguageFamily, NodeType, Parameter, ProjectGraph, Severity,
    warning_kind,
};
