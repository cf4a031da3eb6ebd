//! Module ids: the project-relative, extension-less names file nodes are keyed by.
//!
//! `pkg/models.py` is `pkg/models`, `pkg/__init__.py` is `pkg`, and
//! `src/ui/index.ts` is `src/ui`. Symbols hang off their module with a colon:
//! `pkg/models:User.save`. Import specifiers from either language family are
//! normalised into the same scheme so that import edges land on file nodes.

use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};

use crate::model::Language;

/// File stems that stand for their enclosing directory.
const PACKAGE_STEMS: &[&str] = &["__init__", "index"];

/// Brace-language extensions in the order they win a shared module id.
const BRACE_PRECEDENCE: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

/// Extensions stripped from brace-language import specifiers.
const SPECIFIER_EXTENSIONS: &[&str] = &[
    ".d.ts", ".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx", ".mts", ".cts",
];

/// Compute the module id of `path` relative to `root`.
///
/// Paths outside `root` keep their own components. Unsupported extensions
/// are left in place, so `README.md` stays `README.md`.
pub fn module_id_for(root: &Path, path: &Path) -> String {
    let mut parts = relative_parts(root, path);

    let Some(last) = parts.pop() else {
        return String::new();
    };

    let stem = if Language::from_path(Path::new(&last)).is_some() {
        Path::new(&last)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(last)
    } else {
        last
    };

    if !(PACKAGE_STEMS.contains(&stem.as_str()) && !parts.is_empty()) {
        parts.push(stem);
    }
    parts.join("/")
}

fn relative_parts(root: &Path, path: &Path) -> Vec<String> {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// The root-relative path with its extension kept: `pkg/__init__.py`.
///
/// Used for files that lose a shared module id to a sibling.
pub fn path_module_id(root: &Path, path: &Path) -> String {
    relative_parts(root, path).join("/")
}

/// Precedence of `path` among files sharing one module id. Lower wins.
///
/// Python resolves a package before a module and sources before stubs; the
/// brace family prefers a plain file to a directory index and TypeScript to
/// JavaScript.
fn claim_rank(path: &Path) -> u8 {
    let package = is_package_entry(path);
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match extension {
        "py" => u8::from(!package),
        "pyi" => 2 + u8::from(!package),
        other => {
            let order = BRACE_PRECEDENCE
                .iter()
                .position(|e| *e == other)
                .unwrap_or(BRACE_PRECEDENCE.len()) as u8;
            let offset = if package { 20 } else { 10 };
            offset + order
        }
    }
}

/// Assigns every source file a module id that no other file holds.
///
/// `foo.py` and `foo.pyi`, `util.ts` and `util.js`, or `pkg.py` and
/// `pkg/__init__.py` all compute the same id. The file with the best
/// [`claim_rank`] keeps it; the others are keyed by [`path_module_id`].
#[derive(Debug, Clone, Default)]
pub struct ModuleTable {
    root: PathBuf,
    claims: HashMap<String, BTreeSet<(u8, PathBuf)>>,
}

impl ModuleTable {
    pub fn new(root: &Path) -> Self {
        ModuleTable {
            root: root.to_path_buf(),
            claims: HashMap::new(),
        }
    }

    pub fn from_paths<'a>(root: &Path, paths: impl IntoIterator<Item = &'a PathBuf>) -> Self {
        let mut table = ModuleTable::new(root);
        for path in paths {
            table.insert(path);
        }
        table
    }

    /// Register a file. Returns the previous holder of its module id when
    /// `path` takes the id over, since that file's id has just changed.
    pub fn insert(&mut self, path: &Path) -> Option<PathBuf> {
        let claimants = self.claims.entry(module_id_for(&self.root, path)).or_default();
        let previous = claimants.first().map(|(_, p)| p.clone());
        claimants.insert((claim_rank(path), path.to_path_buf()));
        match (previous, claimants.first()) {
            (Some(previous), Some((_, current))) if previous != *current && current == path => Some(previous),
            _ => None,
        }
    }

    /// Forget a file. Returns the file that inherits its module id, if any.
    pub fn remove(&mut self, path: &Path) -> Option<PathBuf> {
        let base = module_id_for(&self.root, path);
        let claimants = self.claims.get_mut(&base)?;
        let was_primary = claimants.first().is_some_and(|(_, p)| p == path);
        if !claimants.remove(&(claim_rank(path), path.to_path_buf())) {
            return None;
        }
        let successor = claimants.first().map(|(_, p)| p.clone());
        if claimants.is_empty() {
            self.claims.remove(&base);
        }
        successor.filter(|_| was_primary)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.claims
            .get(&module_id_for(&self.root, path))
            .is_some_and(|c| c.contains(&(claim_rank(path), path.to_path_buf())))
    }

    /// The file holding the bare module id `path` computes, when that is
    /// some other file.
    pub fn shadowed_by(&self, path: &Path) -> Option<&Path> {
        let (_, primary) = self.claims.get(&module_id_for(&self.root, path))?.first()?;
        (primary != path).then_some(primary.as_path())
    }

    /// The module id assigned to `path`.
    pub fn module_of(&self, path: &Path) -> String {
        match self.shadowed_by(path) {
            Some(_) => path_module_id(&self.root, path),
            None => module_id_for(&self.root, path),
        }
    }
}

/// True when the file stands for its directory (`__init__.py`, `index.ts`).
pub fn is_package_entry(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| PACKAGE_STEMS.contains(&s))
}

/// Split `module:Qualified.name` into its module and symbol halves.
pub fn split_node_id(id: &str) -> (&str, Option<&str>) {
    match id.split_once(':') {
        Some((module, symbol)) => (module, Some(symbol)),
        None => (id, None),
    }
}

/// Join a module and an optional dotted symbol path into a node id.
pub fn node_id(module: &str, symbol: Option<&str>) -> String {
    match symbol {
        Some(symbol) if !symbol.is_empty() => format!("{}:{}", module, symbol),
        _ => module.to_string(),
    }
}

/// The directory a module's relative imports are resolved against.
fn package_of(module: &str, is_package: bool) -> &str {
    if is_package {
        module
    } else {
        module.rsplit_once('/').map_or("", |(dir, _)| dir)
    }
}

/// `a.b.c` becomes `a/b/c`.
pub fn python_module(dotted: &str) -> String {
    dotted.replace('.', "/")
}

/// Resolve a relative `from ..x import y` module against the importing module.
///
/// `level` is the number of leading dots; `rest` the dotted name after them.
pub fn python_relative_module(current: &str, is_package: bool, level: usize, rest: Option<&str>) -> String {
    let mut parts: Vec<&str> = package_of(current, is_package)
        .split('/')
        .filter(|p| !p.is_empty())
        .collect();
    for _ in 1..level {
        parts.pop();
    }
    let mut module = parts.join("/");
    if let Some(rest) = rest.filter(|r| !r.is_empty()) {
        if !module.is_empty() {
            module.push('/');
        }
        module.push_str(&python_module(rest));
    }
    module
}

/// Resolve a brace-language import specifier.
///
/// Relative specifiers resolve against the importing module's directory;
/// bare package specifiers are returned verbatim.
pub fn brace_specifier_module(current: &str, is_package: bool, specifier: &str) -> String {
    let is_relative = specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../");
    if !is_relative {
        return specifier.to_string();
    }

    let mut parts: Vec<String> = package_of(current, is_package)
        .split('/')
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    let mut escaped = 0usize;
    for segment in specifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    escaped += 1;
                }
            }
            other => parts.push(other.to_string()),
        }
    }

    if let Some(last) = parts.last_mut() {
        if let Some(ext) = SPECIFIER_EXTENSIONS.iter().find(|ext| last.ends_with(*ext)) {
            last.truncate(last.len() - ext.len());
        }
    }
    if parts.len() > 1 && parts.last().is_some_and(|l| l == "index") {
        parts.pop();
    }

    let mut segments: Vec<String> = std::iter::repeat_n("..".to_string(), escaped).collect();
    segments.extend(parts);
    segments.join("/")
}
