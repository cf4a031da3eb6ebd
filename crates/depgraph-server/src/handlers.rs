//! Request handlers. Each one translates params into one cache call.

use std::path::Path;

use depgraph_core::{ImpactOptions, ImpactReport, ProjectGraph};
use depgraph_engine::{AnalysisCache, NodeQuery};
use tracing::info;

use crate::protocol::{
    AnalyseProjectParams, EdgesResult, FileParams, FileResult, ImpactParams, NodeParams,
    ProtocolError, QueryNodesParams, QueryNodesResult, StatusResult,
};

pub fn get_status(cache: &AnalysisCache) -> StatusResult {
    let status = cache.status();
    StatusResult {
        status: "ready".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        has_cache: status.has_cache,
        project_root: status.project_root,
        last_analysis: status.last_analysis,
        file_count: status.file_count,
        dirty_files: status.dirty_files,
    }
}

pub fn analyse_project(
    cache: &mut AnalysisCache,
    params: AnalyseProjectParams,
) -> Result<ProjectGraph, ProtocolError> {
    info!("Analysing project {}", params.root);
    Ok(cache.analyse_project(Path::new(&params.root))?)
}

pub fn analyse_file(cache: &mut AnalysisCache, params: FileParams) -> Result<FileResult, ProtocolError> {
    let analysis = cache.analyse_file(&params.file)?;
    Ok(FileResult {
        nodes: analysis.nodes,
        edges: analysis.edges,
        warnings: analysis.warnings,
    })
}

pub fn get_impact(cache: &AnalysisCache, params: ImpactParams) -> ImpactReport {
    let defaults = ImpactOptions::default();
    let options = ImpactOptions {
        max_depth: params.max_depth,
        min_confidence: params.min_confidence.unwrap_or(defaults.min_confidence),
    };
    cache.get_impact(&params.file, params.function.as_deref(), options)
}

pub fn get_callers(cache: &AnalysisCache, params: NodeParams) -> Vec<String> {
    cache.callers(&params.node_id)
}

pub fn get_callees(cache: &AnalysisCache, params: NodeParams) -> Vec<String> {
    cache.callees(&params.node_id)
}

pub fn invalidate_file(cache: &mut AnalysisCache, params: FileParams) {
    cache.invalidate_file(&params.file);
}

pub fn clear_cache(cache: &mut AnalysisCache) {
    cache.clear_cache();
}

pub fn get_cached_graph(cache: &AnalysisCache) -> Option<ProjectGraph> {
    cache.cached_graph()
}

pub fn query_nodes(cache: &AnalysisCache, params: QueryNodesParams) -> QueryNodesResult {
    let defaults = NodeQuery::default();
    let (nodes, total_count) = cache.query_nodes(&NodeQuery {
        file_path: params.file_path,
        name: params.name,
        node_type: params.node_type,
        limit: params.limit.unwrap_or(defaults.limit),
    });
    QueryNodesResult { nodes, total_count }
}

pub fn get_edges_for_node(cache: &AnalysisCache, params: NodeParams) -> EdgesResult {
    let (incoming, outgoing) = cache.edges_for_node(&params.node_id);
    EdgesResult { incoming, outgoing }
}
