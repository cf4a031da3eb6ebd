//! Graph Builder: assembles per-file results into one graph and tallies it.

use std::collections::HashMap;

use crate::graph::Graph;
use crate::model::{
    AnalysisWarning, Confidence, FileAnalysis, GraphEdge, GraphNode, GraphSummary, NodeType,
    ProjectGraph, GRAPH_FORMAT_VERSION,
};
use crate::module_id::split_node_id;

/// Accumulates file results into a [`Graph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: Graph,
    warnings: Vec<AnalysisWarning>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add everything one file produced. Nodes and edges are owned by `file_path`.
    pub fn add_file(&mut self, file_path: &str, analysis: FileAnalysis) {
        self.graph
            .replace_file(file_path, analysis.nodes, analysis.edges);
        self.warnings.extend(analysis.warnings);
    }

    pub fn finish(self) -> (Graph, Vec<AnalysisWarning>) {
        (self.graph, self.warnings)
    }

    /// Build a graph from flat node and edge lists.
    ///
    /// Each edge is owned by the file of its `from_node`; edges whose source
    /// is not among `nodes` are owned by the source id's module.
    pub fn build(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Graph {
        let owners: HashMap<String, String> = nodes
            .iter()
            .map(|n| (n.id.clone(), n.file_path.clone()))
            .collect();
        let mut graph = Graph::new();
        for node in nodes {
            graph.add_node(node);
        }
        for edge in edges {
            let owner = owners
                .get(&edge.from_node)
                .cloned()
                .unwrap_or_else(|| split_node_id(&edge.from_node).0.to_string());
            graph.add_edge(&owner, edge);
        }
        graph
    }
}

/// Count files, callables, classes and edges per confidence tier.
pub fn summarize<'a>(
    nodes: impl IntoIterator<Item = &'a GraphNode>,
    edges: impl IntoIterator<Item = &'a GraphEdge>,
) -> GraphSummary {
    let mut summary = GraphSummary::default();
    for node in nodes {
        match node.node_type {
            NodeType::File => summary.files += 1,
            NodeType::Class => summary.classes += 1,
            NodeType::Function | NodeType::Method => summary.functions += 1,
            NodeType::Variable => {}
        }
    }
    for edge in edges {
        summary.edges += 1;
        match edge.confidence {
            Confidence::High => summary.high_confidence_edges += 1,
            Confidence::Medium => summary.medium_confidence_edges += 1,
            Confidence::Low => summary.low_confidence_edges += 1,
            Confidence::Unsafe => summary.unsafe_edges += 1,
        }
    }
    summary
}

/// Serializable snapshot of a live graph.
pub fn snapshot(
    graph: &Graph,
    project_root: &str,
    analysis_timestamp: &str,
    warnings: &[AnalysisWarning],
    analysis_time_ms: Option<u64>,
) -> ProjectGraph {
    let nodes: Vec<GraphNode> = graph.nodes().cloned().collect();
    let edges: Vec<GraphEdge> = graph.edges().cloned().collect();
    let mut summary = summarize(&nodes, &edges);
    summary.analysis_time_ms = analysis_time_ms;
    ProjectGraph {
        version: GRAPH_FORMAT_VERSION.to_string(),
        project_root: project_root.to_string(),
        analysis_timestamp: analysis_timestamp.to_string(),
        nodes,
        edges,
        warnings: warnings.to_vec(),
        summary,
    }
}
