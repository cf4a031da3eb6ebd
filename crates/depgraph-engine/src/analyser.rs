//! Analysis Cache: owns the live graph and keeps it current.
//!
//! A full [`AnalysisCache::analyse_project`] walks the tree, parses every
//! file in parallel and builds the graph in path order. After that, single
//! files are swapped in and out with [`AnalysisCache::invalidate_file`] and
//! [`AnalysisCache::analyse_file`] without touching anything another file
//! owns. Queries read the graph in place.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use depgraph_core::module_id::{ModuleTable, module_id_for, node_id, split_node_id};
use depgraph_core::{
    AnalysisWarning, EngineConfig, FileAnalysis, Graph, GraphBuilder, GraphEdge, GraphNode,
    ImpactAnalyzer, ImpactOptions, ImpactReport, Language, NodeType, ProjectGraph, Severity,
    snapshot, warning_kind,
};
use depgraph_indexer::{Frontends, SourceFile};
use globset::GlobSet;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::walker::{find_source_files, skip_set};

/// Members listed in a cycle warning before the rest is elided.
const CYCLE_MEMBERS_SHOWN: usize = 5;

/// Node filter for [`AnalysisCache::query_nodes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeQuery {
    /// Substring of the owning file path.
    pub file_path: Option<String>,
    /// Case-insensitive substring of the node name.
    pub name: Option<String>,
    pub node_type: Option<NodeType>,
    pub limit: usize,
}

impl Default for NodeQuery {
    fn default() -> Self {
        NodeQuery {
            file_path: None,
            name: None,
            node_type: None,
            limit: 100,
        }
    }
}

/// Point-in-time view of the cache for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    pub has_cache: bool,
    pub project_root: Option<String>,
    pub last_analysis: Option<String>,
    pub file_count: Option<usize>,
    pub dirty_files: usize,
}

#[derive(Debug)]
struct LiveGraph {
    root: PathBuf,
    graph: Graph,
    modules: ModuleTable,
    /// Warnings produced by the front-ends, tagged with their file path.
    file_warnings: Vec<AnalysisWarning>,
    cycle_warnings: Vec<AnalysisWarning>,
    timestamp: String,
    analysis_time_ms: Option<u64>,
}

pub struct AnalysisCache {
    config: EngineConfig,
    frontends: Frontends,
    skip: GlobSet,
    live: Option<LiveGraph>,
    dirty: BTreeSet<PathBuf>,
}

impl AnalysisCache {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let skip = skip_set(&config.skip_dirs)?;
        let frontends = Frontends::new(&config);
        Ok(AnalysisCache {
            config,
            frontends,
            skip,
            live: None,
            dirty: BTreeSet::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn project_root(&self) -> Option<&Path> {
        self.live.as_ref().map(|l| l.root.as_path())
    }

    /// The live graph, if a project has been analysed.
    pub fn graph(&self) -> Option<&Graph> {
        self.live.as_ref().map(|l| &l.graph)
    }

    /// Full analysis of the project at `root`, replacing any cached graph.
    pub fn analyse_project(&mut self, root: &Path) -> Result<ProjectGraph> {
        let root = root
            .canonicalize()
            .map_err(|_| EngineError::RootNotFound(root.to_path_buf()))?;
        if !root.is_dir() {
            return Err(EngineError::RootNotFound(root));
        }
        info!(root = %root.display(), "Starting project analysis");
        let started = Instant::now();

        self.frontends.begin_batch();
        let paths = find_source_files(&root, &self.skip);
        let modules = ModuleTable::from_paths(&root, &paths);
        let sources: Vec<SourceFile> = paths
            .iter()
            .filter_map(|path| SourceFile::with_module(path, modules.module_of(path)))
            .collect();
        info!(count = sources.len(), "Found source files");

        let frontends = &self.frontends;
        let results: Vec<FileAnalysis> = sources
            .par_iter()
            .map(|source| {
                let mut analysis = frontends.analyse(source);
                analysis.warnings.extend(collision_warning(&modules, source));
                analysis
            })
            .collect();

        let mut builder = GraphBuilder::new();
        for (source, analysis) in sources.iter().zip(results) {
            builder.add_file(&source.file_path, analysis);
        }
        let (graph, file_warnings) = builder.finish();
        let cycle_warnings = cycle_warnings(&graph, self.config.max_cycle_warnings);
        let elapsed = started.elapsed().as_millis() as u64;

        info!(
            files = graph.file_count(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            warnings = file_warnings.len() + cycle_warnings.len(),
            time_ms = elapsed,
            "Analysis complete"
        );

        self.dirty.clear();
        let live = self.live.insert(LiveGraph {
            root,
            graph,
            modules,
            file_warnings,
            cycle_warnings,
            timestamp: chrono::Utc::now().to_rfc3339(),
            analysis_time_ms: Some(elapsed),
        });
        Ok(live.snapshot())
    }

    /// Mark a file as changed. Nothing is reparsed until [`Self::analyse_file`].
    pub fn invalidate_file(&mut self, file: &str) {
        let path = self.locate(file);
        debug!("Invalidated {}", path.display());
        self.dirty.insert(path);
    }

    pub fn dirty_files(&self) -> Vec<PathBuf> {
        self.dirty.iter().cloned().collect()
    }

    /// Reparse one file and merge the result into the live graph.
    ///
    /// A file that no longer exists is dropped from the graph and yields an
    /// empty result; a file the cache never knew about is an error. Without
    /// a live graph the file is parsed standalone.
    pub fn analyse_file(&mut self, file: &str) -> Result<FileAnalysis> {
        self.frontends.begin_batch();
        self.reanalyse(file)
    }

    /// Reparse every file marked dirty. Returns the files processed.
    ///
    /// The pass is one batch: a worker that faults on one file is not
    /// restarted for the files after it.
    pub fn analyse_dirty(&mut self) -> Result<Vec<PathBuf>> {
        let pending = self.dirty_files();
        self.frontends.begin_batch();
        for path in &pending {
            match self.reanalyse(&path.to_string_lossy()) {
                Ok(_) | Err(EngineError::FileNotFound(_)) | Err(EngineError::UnsupportedFile(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(pending)
    }

    fn reanalyse(&mut self, file: &str) -> Result<FileAnalysis> {
        let path = self.locate(file);
        if Language::from_path(&path).is_none() {
            return Err(EngineError::UnsupportedFile(path));
        }
        self.dirty.remove(&path);

        if self.live.is_none() {
            if !path.is_file() {
                return Err(EngineError::FileNotFound(path));
            }
            let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let source = SourceFile::new(&root, &path).ok_or_else(|| EngineError::UnsupportedFile(path.clone()))?;
            return Ok(self.frontends.analyse(&source));
        }

        let Some(live) = self.live.as_mut() else {
            return Ok(FileAnalysis::default());
        };
        if !path.is_file() {
            let file_path = path.display().to_string();
            let module = live.modules.module_of(&path);
            let removed = live.remove(&file_path);
            let heir = live.modules.remove(&path);
            if !removed {
                return Err(EngineError::FileNotFound(path));
            }
            info!(file = %file_path, "File deleted, removed from graph");
            let importers = live.importers_of(&module);
            if let Some(heir) = heir {
                debug!("{} takes over the module id of {}", heir.display(), file_path);
                self.merge(&heir);
            }
            for importer in importers {
                self.merge(&importer);
            }
            self.refresh_cycles();
            return Ok(FileAnalysis::default());
        }

        let joined = !live.modules.contains(&path);
        let displaced = live.modules.insert(&path);
        let importers = if joined {
            live.importers_of(&live.modules.module_of(&path))
        } else {
            BTreeSet::new()
        };
        let analysis = self.merge(&path);
        if let Some(displaced) = displaced {
            debug!("{} loses its module id to {}", displaced.display(), path.display());
            self.merge(&displaced);
        }
        for importer in importers.iter().filter(|p| **p != path) {
            self.merge(importer);
        }
        self.refresh_cycles();
        Ok(analysis)
    }

    /// Parse `path` under its current module id and swap its contribution
    /// into the live graph.
    fn merge(&mut self, path: &Path) -> FileAnalysis {
        let Some(live) = self.live.as_mut() else {
            return FileAnalysis::default();
        };
        let Some(source) = SourceFile::with_module(path, live.modules.module_of(path)) else {
            return FileAnalysis::default();
        };

        let started = Instant::now();
        let mut analysis = self.frontends.analyse(&source);
        analysis.warnings.extend(collision_warning(&live.modules, &source));

        let old_nodes = live.graph.nodes_of_file(&source.file_path).count();
        let old_edges = live.graph.edges_of_file(&source.file_path).count();
        live.remove(&source.file_path);
        live.graph
            .replace_file(&source.file_path, analysis.nodes.clone(), analysis.edges.clone());
        live.file_warnings.extend(analysis.warnings.iter().cloned());
        live.timestamp = chrono::Utc::now().to_rfc3339();
        live.analysis_time_ms = Some(started.elapsed().as_millis() as u64);
        info!(
            file = %source.file_path,
            module = %source.module,
            old_nodes,
            new_nodes = analysis.nodes.len(),
            old_edges,
            new_edges = analysis.edges.len(),
            "Incremental update complete"
        );
        analysis
    }

    /// Impact of changing `file` (a path or a module id), or one function in it.
    pub fn get_impact(&self, file: &str, function: Option<&str>, options: ImpactOptions) -> ImpactReport {
        let id = node_id(&self.module_for(file), function);
        match &self.live {
            Some(live) => ImpactAnalyzer::new(&live.graph, &self.config.test_indicators).get_impact(&id, options),
            None => ImpactReport::empty(&id),
        }
    }

    pub fn callers(&self, node_id: &str) -> Vec<String> {
        match &self.live {
            Some(live) => ImpactAnalyzer::new(&live.graph, &self.config.test_indicators).callers(node_id),
            None => Vec::new(),
        }
    }

    pub fn callees(&self, node_id: &str) -> Vec<String> {
        match &self.live {
            Some(live) => ImpactAnalyzer::new(&live.graph, &self.config.test_indicators).callees(node_id),
            None => Vec::new(),
        }
    }

    /// Drop the live graph and every pending invalidation.
    pub fn clear_cache(&mut self) {
        info!("Clearing analysis cache");
        self.live = None;
        self.dirty.clear();
    }

    pub fn cached_graph(&self) -> Option<ProjectGraph> {
        self.live.as_ref().map(LiveGraph::snapshot)
    }

    pub fn status(&self) -> CacheStatus {
        CacheStatus {
            has_cache: self.live.is_some(),
            project_root: self.live.as_ref().map(|l| l.root.display().to_string()),
            last_analysis: self.live.as_ref().map(|l| l.timestamp.clone()),
            file_count: self.live.as_ref().map(|l| l.graph.file_count()),
            dirty_files: self.dirty.len(),
        }
    }

    /// Nodes matching `query`, at most `query.limit` of them, plus the total
    /// number of matches.
    pub fn query_nodes(&self, query: &NodeQuery) -> (Vec<GraphNode>, usize) {
        let Some(live) = &self.live else {
            return (Vec::new(), 0);
        };
        let name = query.name.as_ref().map(|n| n.to_lowercase());
        let matches = live.graph.nodes().filter(|node| {
            query.file_path.as_ref().is_none_or(|f| node.file_path.contains(f.as_str()))
                && name.as_ref().is_none_or(|n| node.name.to_lowercase().contains(n.as_str()))
                && query.node_type.is_none_or(|t| node.node_type == t)
        });
        let mut total = 0;
        let mut nodes = Vec::new();
        for node in matches {
            total += 1;
            if nodes.len() < query.limit {
                nodes.push(node.clone());
            }
        }
        (nodes, total)
    }

    /// Incoming and outgoing edges of one node.
    pub fn edges_for_node(&self, node_id: &str) -> (Vec<GraphEdge>, Vec<GraphEdge>) {
        match &self.live {
            Some(live) => (
                live.graph.incoming_edges(node_id).into_iter().cloned().collect(),
                live.graph.outgoing_edges(node_id).into_iter().cloned().collect(),
            ),
            None => (Vec::new(), Vec::new()),
        }
    }

    /// Absolute, canonical form of a caller-supplied path. Relative paths
    /// are taken against the project root when one is known.
    fn locate(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        let path = match &self.live {
            Some(live) if path.is_relative() => live.root.join(path),
            _ => path.to_path_buf(),
        };
        if let Ok(canonical) = path.canonicalize() {
            return canonical;
        }
        // Deleted files: canonicalize what still exists.
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => parent
                .canonicalize()
                .map(|p| p.join(name))
                .unwrap_or(path),
            _ => path,
        }
    }

    /// Module id for a source path; anything else is taken as an id already.
    fn module_for(&self, file: &str) -> String {
        if Language::from_path(Path::new(file)).is_none() {
            return file.to_string();
        }
        match &self.live {
            Some(live) => live.modules.module_of(&self.locate(file)),
            None => module_id_for(Path::new(""), Path::new(file)),
        }
    }

    fn refresh_cycles(&mut self) {
        let limit = self.config.max_cycle_warnings;
        if let Some(live) = self.live.as_mut() {
            live.cycle_warnings = cycle_warnings(&live.graph, limit);
        }
    }
}

impl LiveGraph {
    fn snapshot(&self) -> ProjectGraph {
        let warnings: Vec<AnalysisWarning> = self
            .file_warnings
            .iter()
            .chain(&self.cycle_warnings)
            .cloned()
            .collect();
        snapshot(
            &self.graph,
            &self.root.display().to_string(),
            &self.timestamp,
            &warnings,
            self.analysis_time_ms,
        )
    }

    /// Files whose imports may bind differently now that `module` has
    /// appeared or gone: those with edges into it, or at the member of its
    /// parent package it would shadow.
    fn importers_of(&self, module: &str) -> BTreeSet<PathBuf> {
        let member = match module.rsplit_once('/') {
            Some((parent, name)) => node_id(parent, Some(name)),
            None => format!(":{}", module),
        };
        let targets = |to: &str, id: &str| {
            to.strip_prefix(id)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(':') || rest.starts_with('.'))
        };
        self.graph
            .edges()
            .filter(|e| targets(&e.to_node, module) || targets(&e.to_node, &member))
            .filter_map(|e| self.graph.node(&e.from_node))
            .map(|n| PathBuf::from(&n.file_path))
            .collect()
    }

    /// Forget everything `file_path` contributed.
    fn remove(&mut self, file_path: &str) -> bool {
        self.file_warnings.retain(|w| w.file != file_path);
        self.graph.remove_file(file_path)
    }
}

/// Low-severity note on a file keyed by its path because a sibling holds
/// the module id it would otherwise get.
fn collision_warning(modules: &ModuleTable, source: &SourceFile) -> Option<AnalysisWarning> {
    let holder = modules.shadowed_by(&source.path)?;
    Some(AnalysisWarning::new(
        warning_kind::MODULE_COLLISION,
        source.file_path.clone(),
        0,
        format!(
            "{} shares its module name with {}; its nodes are keyed as `{}`",
            source.file_name(),
            holder.display(),
            source.module
        ),
        Severity::Low,
    ))
}

/// One warning per import cycle, at most `limit` of them.
fn cycle_warnings(graph: &Graph, limit: usize) -> Vec<AnalysisWarning> {
    graph
        .cycles()
        .into_iter()
        .take(limit)
        .map(|cycle| {
            let mut description = cycle
                .iter()
                .take(CYCLE_MEMBERS_SHOWN)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(" -> ");
            if cycle.len() > CYCLE_MEMBERS_SHOWN {
                description.push_str(&format!(" -> ... ({} nodes)", cycle.len()));
            }
            let first = cycle.first().map(String::as_str).unwrap_or_default();
            let file = graph
                .node(first)
                .map(|n| n.file_path.clone())
                .unwrap_or_else(|| split_node_id(first).0.to_string());
            AnalysisWarning::new(
                warning_kind::CIRCULAR_DEPENDENCY,
                file,
                0,
                format!("circular dependency: {}", description),
                Severity::Medium,
            )
        })
        .collect()
}
