//! Method name to handler dispatch

use depgraph_engine::AnalysisCache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::handlers;
use crate::protocol::ProtocolError;

/// Every method the server answers to.
pub const METHODS: &[&str] = &[
    "get_status",
    "analyse_project",
    "analyse_file",
    "get_impact",
    "get_callers",
    "get_callees",
    "invalidate_file",
    "clear_cache",
    "get_cached_graph",
    "query_nodes",
    "get_edges_for_node",
];

/// Run `method` against the cache.
pub fn dispatch(cache: &mut AnalysisCache, method: &str, params: Value) -> Result<Value, ProtocolError> {
    match method {
        "get_status" => encode(handlers::get_status(cache)),
        "analyse_project" => encode(handlers::analyse_project(cache, decode(params)?)?),
        "analyse_file" => encode(handlers::analyse_file(cache, decode(params)?)?),
        "get_impact" => encode(handlers::get_impact(cache, decode(params)?)),
        "get_callers" => encode(handlers::get_callers(cache, decode(params)?)),
        "get_callees" => encode(handlers::get_callees(cache, decode(params)?)),
        "invalidate_file" => encode(handlers::invalidate_file(cache, decode(params)?)),
        "clear_cache" => encode(handlers::clear_cache(cache)),
        "get_cached_graph" => encode(handlers::get_cached_graph(cache)),
        "query_nodes" => encode(handlers::query_nodes(cache, decode(params)?)),
        "get_edges_for_node" => encode(handlers::get_edges_for_node(cache, decode(params)?)),
        other => Err(ProtocolError::MethodNotFound(other.to_string())),
    }
}

/// Absent params read as an empty object.
fn decode<T: DeserializeOwned>(params: Value) -> Result<T, ProtocolError> {
    let params = match params {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(params).map_err(|e| ProtocolError::InvalidParams(e.to_string()))
}

fn encode<T: Serialize>(result: T) -> Result<Value, ProtocolError> {
    serde_json::to_value(result).map_err(|e| ProtocolError::Internal(e.to_string()))
}
