//! Source file discovery.

use std::path::{Path, PathBuf};

use depgraph_core::Language;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Compile directory-name patterns (`node_modules`, `*.egg-info`).
pub fn skip_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| EngineError::InvalidPattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| EngineError::InvalidPattern {
        pattern: patterns.join(","),
        source,
    })
}

/// Every file under `root` a front-end handles, sorted by path.
///
/// Directories whose name matches `skip` are not entered. Hidden entries are
/// skipped, ignore files are not consulted: the host applies its own
/// exclusions before calling in.
pub fn find_source_files(root: &Path, skip: &GlobSet) -> Vec<PathBuf> {
    let skip = skip.clone();
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && entry.depth() > 0 && skip.is_match(entry.file_name()))
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Walker error: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if Language::from_path(entry.path()).is_some() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    debug!("Found {} source files under {}", files.len(), root.display());
    files
}
