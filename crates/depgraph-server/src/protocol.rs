//! Wire types for the line-delimited request protocol

use depgraph_core::{AnalysisWarning, Confidence, GraphEdge, GraphNode, NodeType};
use depgraph_engine::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const ANALYSIS_ERROR: i64 = -32001;
pub const FILE_NOT_FOUND: i64 = -32002;

/// One request line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
}

/// One response line. Exactly one of `result` and `error` is set; a
/// successful call that returns nothing carries `"result": null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    pub fn success(id: u64, result: Value) -> Self {
        Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, error: &ProtocolError) -> Self {
        Response {
            id,
            result: None,
            error: Some(ErrorObject {
                code: error.code(),
                message: error.to_string(),
            }),
        }
    }
}

/// Everything a request can fail with, each with a stable code.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("analysis failed: {0}")]
    Analysis(String),
    #[error("{0}")]
    FileNotFound(String),
}

impl ProtocolError {
    pub fn code(&self) -> i64 {
        match self {
            ProtocolError::Parse(_) => PARSE_ERROR,
            ProtocolError::InvalidRequest(_) => INVALID_REQUEST,
            ProtocolError::MethodNotFound(_) => METHOD_NOT_FOUND,
            ProtocolError::InvalidParams(_) => INVALID_PARAMS,
            ProtocolError::Internal(_) => INTERNAL_ERROR,
            ProtocolError::Analysis(_) => ANALYSIS_ERROR,
            ProtocolError::FileNotFound(_) => FILE_NOT_FOUND,
        }
    }
}

impl From<EngineError> for ProtocolError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::RootNotFound(_) | EngineError::FileNotFound(_) => {
                ProtocolError::FileNotFound(error.to_string())
            }
            EngineError::UnsupportedFile(_) => ProtocolError::InvalidParams(error.to_string()),
            EngineError::InvalidPattern { .. } | EngineError::Io(_) => {
                ProtocolError::Analysis(error.to_string())
            }
        }
    }
}

// ── Params ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyseProjectParams {
    pub root: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileParams {
    pub file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImpactParams {
    pub file: String,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub min_confidence: Option<Confidence>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeParams {
    pub node_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryNodesParams {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub node_type: Option<NodeType>,
    #[serde(default)]
    pub limit: Option<usize>,
}

// ── Results ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    pub status: String,
    pub version: String,
    pub has_cache: bool,
    pub project_root: Option<String>,
    pub last_analysis: Option<String>,
    pub file_count: Option<usize>,
    pub dirty_files: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResult {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub warnings: Vec<AnalysisWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryNodesResult {
    pub nodes: Vec<GraphNode>,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgesResult {
    pub incoming: Vec<GraphEdge>,
    pub outgoing: Vec<GraphEdge>,
}
