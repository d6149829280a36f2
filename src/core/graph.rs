//! DependencyGraph - which configurations consume which artifacts.
//!
//! An edge `A -> B` means "A references B": A links against or otherwise
//! consumes B's artifact. The graph tolerates cycles; every traversal
//! keeps a visited set.

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::core::{BuildConfiguration, ConfigId};

/// Directed reference graph over configuration ids.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<ConfigId, ()>,

    /// Map from ConfigId to node index
    id_to_node: HashMap<ConfigId, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from configurations and their declared references.
    ///
    /// References to ids not among `configs` still become nodes, so
    /// queries about them stay answerable.
    pub fn from_configurations<'a>(
        configs: impl IntoIterator<Item = &'a BuildConfiguration>,
    ) -> Self {
        let mut graph = DependencyGraph::new();
        for cfg in configs {
            graph.add_node(cfg.id.clone());
            for reference in &cfg.references {
                graph.add_edge(&cfg.id, reference);
            }
        }
        graph
    }

    /// Add a configuration node (no-op if present).
    pub fn add_node(&mut self, id: ConfigId) -> NodeIndex {
        if let Some(&node) = self.id_to_node.get(&id) {
            return node;
        }
        let node = self.graph.add_node(id.clone());
        self.id_to_node.insert(id, node);
        node
    }

    /// Record that `from` references `to`.
    pub fn add_edge(&mut self, from: &ConfigId, to: &ConfigId) {
        let from_node = self.add_node(from.clone());
        let to_node = self.add_node(to.clone());
        if !self.graph.contains_edge(from_node, to_node) {
            self.graph.add_edge(from_node, to_node, ());
        }
    }

    pub fn contains(&self, id: &ConfigId) -> bool {
        self.id_to_node.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    fn neighbors(&self, id: &ConfigId, direction: Direction) -> BTreeSet<ConfigId> {
        match self.id_to_node.get(id) {
            Some(&node) => self
                .graph
                .neighbors_directed(node, direction)
                .map(|n| self.graph[n].clone())
                .collect(),
            None => BTreeSet::new(),
        }
    }

    fn closure(&self, id: &ConfigId, direction: Direction) -> BTreeSet<ConfigId> {
        let mut visited = BTreeSet::new();
        let mut stack: Vec<ConfigId> = self.neighbors(id, direction).into_iter().collect();

        while let Some(current) = stack.pop() {
            if visited.insert(current.clone()) {
                stack.extend(self.neighbors(&current, direction));
            }
        }

        visited.remove(id);
        visited
    }

    /// Configurations `id` references directly.
    pub fn direct_references(&self, id: &ConfigId) -> BTreeSet<ConfigId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Configurations that reference `id` directly.
    pub fn direct_referenced_by(&self, id: &ConfigId) -> BTreeSet<ConfigId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Every configuration that transitively references `id` (excluding `id`).
    pub fn all_referenced_by(&self, id: &ConfigId) -> BTreeSet<ConfigId> {
        self.closure(id, Direction::Incoming)
    }

    /// Every configuration `id` transitively references (excluding `id`).
    pub fn all_references(&self, id: &ConfigId) -> BTreeSet<ConfigId> {
        self.closure(id, Direction::Outgoing)
    }

    /// All configurations, references before their referencers.
    ///
    /// Members of a reference cycle are emitted together, sorted by id.
    pub fn build_order(&self) -> Vec<ConfigId> {
        // tarjan_scc yields components in reverse topological order, which
        // for "references" edges is exactly referenced-first.
        tarjan_scc(&self.graph)
            .into_iter()
            .flat_map(|component| {
                let mut ids: Vec<ConfigId> =
                    component.into_iter().map(|n| self.graph[n].clone()).collect();
                ids.sort();
                ids
            })
            .collect()
    }
}
