//! Live dependency graph: a petgraph::StableDiGraph keyed by node id strings.
//!
//! Every vertex is addressed by its node id. Edges may point at ids no file
//! has defined yet; those targets exist as payload-less placeholder vertices
//! so that predecessor lookups work for dangling targets too. Nodes and edges
//! are owned by the source file that produced them, which is what makes
//! per-file replacement cheap.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;

use crate::model::{GraphEdge, GraphNode};

/// Vertex weight. `None` marks a target that is referenced but not defined.
type Slot = Option<GraphNode>;

/// What one source file contributed, in insertion order.
#[derive(Debug, Default, Clone)]
struct FileEntry {
    nodes: Vec<NodeIndex>,
    edges: Vec<EdgeIndex>,
}

/// The dependency graph with stable indices and per-file ownership.
#[derive(Clone, Default)]
pub struct Graph {
    inner: StableDiGraph<Slot, GraphEdge>,
    index: HashMap<String, NodeIndex>,
    /// Reverse of `index`, so a vertex can be unregistered by key.
    ids: HashMap<NodeIndex, String>,
    files: BTreeMap<String, FileEntry>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("files", &self.files.len())
            .field("node_count", &self.node_count())
            .field("edge_count", &self.edge_count())
            .finish()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    fn vertex(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.inner.add_node(None);
        self.index.insert(id.to_string(), idx);
        self.ids.insert(idx, id.to_string());
        idx
    }

    /// Add a node owned by `node.file_path`. A node with the same id replaces
    /// the previous payload.
    pub fn add_node(&mut self, node: GraphNode) {
        let idx = self.vertex(&node.id);
        let entry = self.files.entry(node.file_path.clone()).or_default();
        if !entry.nodes.contains(&idx) {
            entry.nodes.push(idx);
        }
        self.inner[idx] = Some(node);
    }

    /// Add an edge owned by `file_path`. The target need not exist.
    pub fn add_edge(&mut self, file_path: &str, edge: GraphEdge) {
        let from = self.vertex(&edge.from_node);
        let to = self.vertex(&edge.to_node);
        let idx = self.inner.add_edge(from, to, edge);
        self.files.entry(file_path.to_string()).or_default().edges.push(idx);
    }

    /// Drop everything `file_path` contributed. Returns false when the file
    /// was unknown.
    pub fn remove_file(&mut self, file_path: &str) -> bool {
        let Some(entry) = self.files.remove(file_path) else {
            return false;
        };

        let mut candidates: BTreeSet<NodeIndex> = BTreeSet::new();
        for edge in entry.edges {
            if let Some((from, to)) = self.inner.edge_endpoints(edge) {
                candidates.insert(from);
                candidates.insert(to);
            }
            self.inner.remove_edge(edge);
        }
        for idx in entry.nodes {
            let owned = self
                .inner
                .node_weight(idx)
                .and_then(Option::as_ref)
                .is_some_and(|n| n.file_path == file_path);
            if owned {
                self.inner[idx] = None;
            }
            candidates.insert(idx);
        }

        // Placeholders nobody points at any more.
        for idx in candidates {
            let orphan = matches!(self.inner.node_weight(idx), Some(None))
                && self.inner.neighbors_undirected(idx).next().is_none();
            if orphan {
                self.inner.remove_node(idx);
                if let Some(id) = self.ids.remove(&idx) {
                    self.index.remove(&id);
                }
            }
        }
        true
    }

    /// Replace the contribution of `file_path` with a fresh set.
    pub fn replace_file(&mut self, file_path: &str, nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) {
        self.remove_file(file_path);
        // A file with no nodes still counts as analysed.
        self.files.entry(file_path.to_string()).or_default();
        for node in nodes {
            self.add_node(node);
        }
        for edge in edges {
            self.add_edge(file_path, edge);
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Look up a defined node.
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        let idx = self.index.get(id)?;
        self.inner.node_weight(*idx)?.as_ref()
    }

    /// True when `id` is a defined node or a referenced target.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn has_file(&self, file_path: &str) -> bool {
        self.files.contains_key(file_path)
    }

    /// Analysed file paths, sorted.
    pub fn file_paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Number of defined nodes.
    pub fn node_count(&self) -> usize {
        self.inner
            .node_indices()
            .filter(|idx| matches!(self.inner.node_weight(*idx), Some(Some(_))))
            .count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Nodes owned by `file_path`, in the order the front-end emitted them.
    pub fn nodes_of_file<'a>(&'a self, file_path: &'a str) -> impl Iterator<Item = &'a GraphNode> {
        self.files
            .get(file_path)
            .into_iter()
            .flat_map(|entry| entry.nodes.iter())
            .filter_map(move |idx| {
                self.inner
                    .node_weight(*idx)?
                    .as_ref()
                    .filter(|n| n.file_path == file_path)
            })
    }

    /// Edges owned by `file_path`, in the order the front-end emitted them.
    pub fn edges_of_file<'a>(&'a self, file_path: &'a str) -> impl Iterator<Item = &'a GraphEdge> {
        self.files
            .get(file_path)
            .into_iter()
            .flat_map(|entry| entry.edges.iter())
            .filter_map(|idx| self.inner.edge_weight(*idx))
    }

    /// All defined nodes, grouped by file in path order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.files
            .keys()
            .flat_map(move |file| self.nodes_of_file(file))
    }

    /// All edges, grouped by owning file in path order.
    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.files
            .keys()
            .flat_map(move |file| self.edges_of_file(file))
    }

    fn edges_directed(&self, id: &str, direction: Direction) -> Vec<&GraphEdge> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<(EdgeIndex, &GraphEdge)> = self
            .inner
            .edges_directed(idx, direction)
            .map(|e| (e.id(), e.weight()))
            .collect();
        edges.sort_by_key(|(idx, _)| *idx);
        edges.into_iter().map(|(_, e)| e).collect()
    }

    /// Edges pointing at `id`.
    pub fn incoming_edges(&self, id: &str) -> Vec<&GraphEdge> {
        self.edges_directed(id, Direction::Incoming)
    }

    /// Edges leaving `id`.
    pub fn outgoing_edges(&self, id: &str) -> Vec<&GraphEdge> {
        self.edges_directed(id, Direction::Outgoing)
    }

    /// Strongly connected components with more than one member, each sorted,
    /// ordered by their first member.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.inner)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut members: Vec<String> = component
                    .iter()
                    .filter_map(|idx| self.ids.get(idx).cloned())
                    .collect();
                members.sort();
                members
            })
            .collect();
        cycles.sort();
        cycles
    }
}
