//! depgraph engine: project walking and the incremental analysis cache

pub mod analyser;
pub mod error;
pub mod walker;

#[cfg(test)]
pub mod test_utils;

pub use analyser::{AnalysisCache, CacheStatus, NodeQuery};
pub use error::{EngineError, Result};
pub use walker::{find_source_files, skip_set};
