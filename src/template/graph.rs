/// Petgraph view of a template
///
/// Builds a directed graph from template edges plus condition branch targets
/// so structural properties (cycles, reachability, fan-out) can be checked
/// before a template is accepted.

use super::types::{NodeType, Template};
use crate::error::{FlowError, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Why two nodes are connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    /// Declared template edge
    Edge,
    /// `true_node_id` of a condition node
    TrueBranch,
    /// `false_node_id` of a condition node
    FalseBranch,
}

/// Directed graph over template node IDs
#[derive(Debug)]
pub struct TemplateGraph {
    graph: DiGraph<String, Link>,
    node_id_to_index: HashMap<String, NodeIndex>,
}

impl TemplateGraph {
    /// Build the graph; fails when an edge or branch references an unknown node
    pub fn build(template: &Template) -> Result<Self> {
        tracing::debug!("🏗️ Building template graph for '{}' v{}", template.id, template.version);

        let mut graph = DiGraph::new();
        let mut node_id_to_index = HashMap::new();

        let mut ids: Vec<&String> = template.nodes.keys().collect();
        ids.sort();
        for id in ids {
            let index = graph.add_node(id.clone());
            node_id_to_index.insert(id.clone(), index);
        }

        let lookup = |id: &str, what: &str| -> Result<NodeIndex> {
            node_id_to_index.get(id).copied().ok_or_else(|| {
                FlowError::invalid_template(format!("{what} references unknown node '{id}'"))
            })
        };

        let mut links = Vec::new();
        for edge in &template.edges {
            let from = lookup(&edge.from, "edge")?;
            let to = lookup(&edge.to, "edge")?;
            links.push((from, to, Link::Edge));
        }

        let mut condition_ids: Vec<&String> = template
            .nodes
            .iter()
            .filter(|(_, node)| node.node_type == NodeType::Condition)
            .map(|(id, _)| id)
            .collect();
        condition_ids.sort();
        for id in condition_ids {
            let Some(config) = template.nodes[id].condition_config() else {
                continue;
            };
            let from = lookup(id, "condition node")?;
            let when_true = lookup(&config.true_node_id, "condition true branch")?;
            let when_false = lookup(&config.false_node_id, "condition false branch")?;
            links.push((from, when_true, Link::TrueBranch));
            links.push((from, when_false, Link::FalseBranch));
        }

        for (from, to, link) in links {
            graph.add_edge(from, to, link);
        }

        Ok(Self {
            graph,
            node_id_to_index,
        })
    }

    /// Reject graphs containing cycles
    pub fn ensure_acyclic(&self) -> Result<()> {
        toposort(&self.graph, None).map(|_| ()).map_err(|cycle| {
            let node = &self.graph[cycle.node_id()];
            tracing::error!("❌ Template graph contains a cycle through '{}'", node);
            FlowError::invalid_template(format!("template graph contains a cycle through '{node}'"))
        })
    }

    /// Number of declared edges leaving `node_id`
    pub fn out_degree(&self, node_id: &str) -> usize {
        self.node_id_to_index
            .get(node_id)
            .map(|&index| {
                self.graph
                    .edges_directed(index, Direction::Outgoing)
                    .filter(|edge| *edge.weight() == Link::Edge)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Node IDs reachable from `start_id` (including itself)
    pub fn reachable_from(&self, start_id: &str) -> HashSet<String> {
        let mut reachable = HashSet::new();
        let Some(&start) = self.node_id_to_index.get(start_id) else {
            return reachable;
        };

        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(index) = dfs.next(&self.graph) {
            reachable.insert(self.graph[index].clone());
        }
        reachable
    }

    /// Node IDs not reachable from `start_id`, sorted
    pub fn unreachable_from(&self, start_id: &str) -> Vec<String> {
        let reachable = self.reachable_from(start_id);
        let mut orphans: Vec<String> = self
            .node_id_to_index
            .keys()
            .filter(|id| !reachable.contains(*id))
            .cloned()
            .collect();
        orphans.sort();
        orphans
    }
}
