//! Impact Analyzer: reverse reachability over the live graph.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::graph::Graph;
use crate::model::{Confidence, ImpactReport};
use crate::module_id::split_node_id;

/// Knobs for [`ImpactAnalyzer::get_impact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImpactOptions {
    /// Do not expand past this many hops. `None` is unlimited.
    pub max_depth: Option<usize>,
    /// Edges below this tier are not followed.
    pub min_confidence: Confidence,
}

impl Default for ImpactOptions {
    fn default() -> Self {
        ImpactOptions {
            max_depth: None,
            min_confidence: Confidence::Unsafe,
        }
    }
}

/// Read-only queries against a graph.
pub struct ImpactAnalyzer<'g> {
    graph: &'g Graph,
    test_indicators: Vec<String>,
}

impl<'g> ImpactAnalyzer<'g> {
    pub fn new(graph: &'g Graph, test_indicators: &[String]) -> Self {
        ImpactAnalyzer {
            graph,
            test_indicators: test_indicators.iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    /// Everything that transitively depends on `node_id`.
    ///
    /// An unknown id yields an empty report, same as a node nobody depends on.
    pub fn get_impact(&self, node_id: &str, options: ImpactOptions) -> ImpactReport {
        let mut report = ImpactReport::empty(node_id);
        if !self.graph.contains(node_id) {
            return report;
        }

        let mut depths: HashMap<&str, usize> = HashMap::new();
        depths.insert(node_id, 0);
        let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(node_id, 0)]);

        while let Some((current, depth)) = queue.pop_front() {
            if options.max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            for edge in self.graph.incoming_edges(current) {
                if edge.confidence < options.min_confidence {
                    continue;
                }
                let pred = edge.from_node.as_str();
                if !depths.contains_key(pred) {
                    depths.insert(pred, depth + 1);
                    queue.push_back((pred, depth + 1));
                }
            }
        }
        depths.remove(node_id);

        let mut files: BTreeSet<String> = BTreeSet::new();
        let mut functions: BTreeSet<String> = BTreeSet::new();
        for id in depths.keys() {
            let (module, symbol) = split_node_id(id);
            if symbol.is_some() {
                functions.insert(id.to_string());
            }
            files.insert(module.to_string());
        }
        for edge in self.graph.incoming_edges(node_id) {
            *report.confidence_breakdown.entry(edge.confidence).or_insert(0) += 1;
        }

        report.impact_depth = depths.values().copied().max().unwrap_or(0);
        report.has_circular_dependencies = self.touches_cycle(node_id, &depths);
        report.suggested_tests = files
            .iter()
            .filter(|f| self.is_test_path(f))
            .cloned()
            .collect();
        report.affected_files = files.into_iter().collect();
        report.affected_functions = functions.into_iter().collect();
        report
    }

    fn touches_cycle(&self, node_id: &str, visited: &HashMap<&str, usize>) -> bool {
        self.graph
            .cycles()
            .iter()
            .flatten()
            .any(|member| member == node_id || visited.contains_key(member.as_str()))
    }

    fn is_test_path(&self, path: &str) -> bool {
        let lower = path.to_lowercase();
        self.test_indicators.iter().any(|t| lower.contains(t.as_str()))
    }

    /// Direct dependents of `node_id`, sorted.
    pub fn callers(&self, node_id: &str) -> Vec<String> {
        let ids: BTreeSet<&str> = self
            .graph
            .incoming_edges(node_id)
            .into_iter()
            .map(|e| e.from_node.as_str())
            .collect();
        ids.into_iter().map(str::to_string).collect()
    }

    /// Direct dependencies of `node_id`, sorted.
    pub fn callees(&self, node_id: &str) -> Vec<String> {
        let ids: BTreeSet<&str> = self
            .graph
            .outgoing_edges(node_id)
            .into_iter()
            .map(|e| e.to_node.as_str())
            .collect();
        ids.into_iter().map(str::to_string).collect()
    }
}
