//! Language extractor trait definition

use std::path::{Path, PathBuf};

use anyhow::Result;
use depgraph_core::module_id::{is_package_entry, module_id_for};
use depgraph_core::{FileAnalysis, Language};

/// One source file as the front-ends see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Where to read the file from.
    pub path: PathBuf,
    /// Owner key recorded on every node and edge the file produces.
    pub file_path: String,
    /// Module id of the file node.
    pub module: String,
    pub language: Language,
}

impl SourceFile {
    /// Describe `path` as part of the project rooted at `root`.
    /// Returns `None` for files no front-end handles.
    pub fn new(root: &Path, path: &Path) -> Option<Self> {
        let language = Language::from_path(path)?;
        Some(SourceFile {
            path: path.to_path_buf(),
            file_path: path.display().to_string(),
            module: module_id_for(root, path),
            language,
        })
    }

    /// Same as [`SourceFile::new`] with an externally supplied module id.
    pub fn with_module(path: &Path, module: impl Into<String>) -> Option<Self> {
        let language = Language::from_path(path)?;
        Some(SourceFile {
            path: path.to_path_buf(),
            file_path: path.display().to_string(),
            module: module.into(),
            language,
        })
    }

    /// True for `__init__` / `index` files keyed by their directory, whose
    /// relative imports resolve against that directory.
    ///
    /// An entry file keyed by its own name (a root-level `index.ts`, or one
    /// whose directory id went to a sibling) resolves like a plain file.
    pub fn is_package(&self) -> bool {
        let last = self.module.rsplit('/').next().unwrap_or(&self.module);
        let stem = self.path.file_stem().and_then(|s| s.to_str());
        is_package_entry(&self.path) && Some(last) != stem && last != self.file_name()
    }

    /// The project root implied by the file's location and module id.
    pub fn project_root(&self) -> Option<PathBuf> {
        let depth = self.module.split('/').filter(|s| !s.is_empty()).count();
        let levels = if self.is_package() { depth } else { depth.saturating_sub(1) };
        let mut dir = self.path.parent()?;
        for _ in 0..levels {
            dir = dir.parent()?;
        }
        Some(dir.to_path_buf())
    }

    /// Display name of the file node.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_path.clone())
    }
}

/// A front-end that turns one file's text into nodes, edges and warnings.
///
/// Syntax errors are reported as warnings inside the result; `Err` is
/// reserved for failures of the parsing machinery itself.
pub trait LanguageExtractor: Send + Sync {
    fn extract(&self, file: &SourceFile, content: &str) -> Result<FileAnalysis>;
}
