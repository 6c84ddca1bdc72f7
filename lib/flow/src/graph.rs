//! Node-graph validation over a flow's adjacency lists.
//!
//! The persisted shape is the per-node upstream/downstream key lists; this
//! module materializes them into a petgraph directed graph to check the
//! structural invariants the external runner relies on: the graph is
//! acyclic, every adjacency reference resolves, and every connection input
//! draws from a node that is strictly upstream.

use crate::error::GraphError;
use crate::node::FlowFunction;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use std::collections::{HashMap, HashSet};

/// A materialized view of a flow's node graph.
#[derive(Debug)]
pub struct FlowGraph<'a> {
    graph: DiGraph<&'a str, ()>,
    index_by_key: HashMap<&'a str, NodeIndex>,
    functions: &'a HashMap<String, FlowFunction>,
}

impl<'a> FlowGraph<'a> {
    /// Builds the graph from a flow's node map.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::UnknownNodeKey` if any adjacency list references
    /// a key with no node.
    pub fn from_functions(
        functions: &'a HashMap<String, FlowFunction>,
    ) -> Result<Self, GraphError> {
        let mut graph = DiGraph::new();
        let mut index_by_key = HashMap::with_capacity(functions.len());

        for key in functions.keys() {
            let index = graph.add_node(key.as_str());
            index_by_key.insert(key.as_str(), index);
        }

        // Upstream and downstream lists describe the same edges from both
        // ends; deduplicate so a consistent pair yields one edge.
        let mut seen = HashSet::new();
        for (key, function) in functions {
            let to = index_by_key[key.as_str()];

            for upstream_key in &function.upstream {
                let &from = index_by_key.get(upstream_key.as_str()).ok_or_else(|| {
                    GraphError::UnknownNodeKey {
                        node_key: upstream_key.clone(),
                    }
                })?;
                if seen.insert((from, to)) {
                    graph.add_edge(from, to, ());
                }
            }

            for downstream_key in &function.downstream {
                let &to = index_by_key.get(downstream_key.as_str()).ok_or_else(|| {
                    GraphError::UnknownNodeKey {
                        node_key: downstream_key.clone(),
                    }
                })?;
                let from = index_by_key[key.as_str()];
                if seen.insert((from, to)) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        Ok(Self {
            graph,
            index_by_key,
            functions,
        })
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the keys of nodes with no incoming edges.
    pub fn entry_keys(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .edges_directed(idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .filter_map(|idx| self.graph.node_weight(idx).copied())
            .collect()
    }

    /// Returns the set of node keys strictly upstream of `key`.
    #[must_use]
    pub fn upstream_keys(&self, key: &str) -> HashSet<&str> {
        let Some(&index) = self.index_by_key.get(key) else {
            return HashSet::new();
        };

        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, index);
        let mut ancestors = HashSet::new();
        while let Some(visited) = dfs.next(reversed) {
            if visited != index {
                if let Some(&weight) = self.graph.node_weight(visited) {
                    ancestors.insert(weight);
                }
            }
        }
        ancestors
    }

    /// Validates the structural invariants of the graph.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::CycleDetected` for a cyclic graph, or
    /// `GraphError::ConnectionNotUpstream` when an input connection
    /// references a node that is not an ancestor of the consuming node.
    pub fn validate(&self) -> Result<(), GraphError> {
        if petgraph::algo::is_cyclic_directed(&self.graph) {
            return Err(GraphError::CycleDetected);
        }

        for (key, function) in self.functions {
            let ancestors = self.upstream_keys(key.as_str());
            for slot in &function.param_ipts {
                for (referenced_key, _) in slot.connections() {
                    if !ancestors.contains(referenced_key) {
                        return Err(GraphError::ConnectionNotUpstream {
                            node_key: key.clone(),
                            referenced_key: referenced_key.to_string(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipt::{IptComponent, IptSlot};
    use crate::node::START_NODE_KEY;
    use millrace_core::FuncId;

    fn linear_functions() -> HashMap<String, FlowFunction> {
        // start -> fetch -> report
        let mut functions = HashMap::new();
        functions.insert(
            START_NODE_KEY.to_string(),
            FlowFunction::start_node().with_downstream(vec!["fetch".to_string()]),
        );
        functions.insert(
            "fetch".to_string(),
            FlowFunction::new(FuncId::new())
                .with_upstream(vec![START_NODE_KEY.to_string()])
                .with_downstream(vec!["report".to_string()]),
        );
        functions.insert(
            "report".to_string(),
            FlowFunction::new(FuncId::new()).with_upstream(vec!["fetch".to_string()]),
        );
        functions
    }

    #[test]
    fn builds_and_validates_linear_graph() {
        let functions = linear_functions();
        let graph = FlowGraph::from_functions(&functions).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.entry_keys(), vec![START_NODE_KEY]);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn upstream_keys_are_transitive() {
        let functions = linear_functions();
        let graph = FlowGraph::from_functions(&functions).unwrap();
        let ancestors = graph.upstream_keys("report");
        assert!(ancestors.contains("fetch"));
        assert!(ancestors.contains(START_NODE_KEY));
        assert!(!ancestors.contains("report"));
    }

    #[test]
    fn rejects_unknown_adjacency_key() {
        let mut functions = HashMap::new();
        functions.insert(
            START_NODE_KEY.to_string(),
            FlowFunction::start_node().with_downstream(vec!["ghost".to_string()]),
        );

        let err = FlowGraph::from_functions(&functions).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownNodeKey {
                node_key: "ghost".to_string()
            }
        );
    }

    #[test]
    fn rejects_cycle() {
        let mut functions = HashMap::new();
        functions.insert(
            "a".to_string(),
            FlowFunction::new(FuncId::new()).with_downstream(vec!["b".to_string()]),
        );
        functions.insert(
            "b".to_string(),
            FlowFunction::new(FuncId::new()).with_downstream(vec!["a".to_string()]),
        );

        let graph = FlowGraph::from_functions(&functions).unwrap();
        assert_eq!(graph.validate().unwrap_err(), GraphError::CycleDetected);
    }

    #[test]
    fn rejects_connection_to_non_upstream_node() {
        let mut functions = linear_functions();
        // "fetch" tries to consume output of its own descendant.
        let fetch = functions.get_mut("fetch").unwrap();
        fetch.param_ipts = vec![IptSlot::new(vec![IptComponent::Connection {
            node_key: "report".to_string(),
            output_key: "summary".to_string(),
        }])];

        let graph = FlowGraph::from_functions(&functions).unwrap();
        let err = graph.validate().unwrap_err();
        assert_eq!(
            err,
            GraphError::ConnectionNotUpstream {
                node_key: "fetch".to_string(),
                referenced_key: "report".to_string()
            }
        );
    }

    #[test]
    fn accepts_connection_to_upstream_node() {
        let mut functions = linear_functions();
        let report = functions.get_mut("report").unwrap();
        report.param_ipts = vec![IptSlot::new(vec![IptComponent::Connection {
            node_key: "fetch".to_string(),
            output_key: "rows".to_string(),
        }])];

        let graph = FlowGraph::from_functions(&functions).unwrap();
        assert!(graph.validate().is_ok());
    }
}
