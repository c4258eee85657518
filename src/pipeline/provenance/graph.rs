//! Lineage graph rebuilt from the provenance log.
//!
//! Each fragment has at most one recorded parent (`previous_fragment_id`),
//! so the structure is a forest with fan-out rather than a general DAG.
//! Nothing rejects cycles at build time; every traversal carries its own
//! visited set instead.
//!
//! Duplicate fragment ids are last-wins: the later fragment replaces the
//! earlier node and overwrites its parent pointer. Children lists and the
//! edge list keep every registration.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::types::ProvenanceFragment;

/// Directed edge from a parent fragment to the fragment derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub from: String,
    pub to: String,
}

/// Aggregate shape of a lineage graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageStatistics {
    pub total_fragments: usize,
    pub total_edges: usize,
    pub root_count: usize,
    pub leaf_count: usize,
    pub fragment_types: BTreeMap<String, usize>,
    /// Longest root-to-leaf chain, in edges.
    pub max_depth: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LineageGraph {
    nodes: HashMap<String, ProvenanceFragment>,
    /// Ids in first-seen order, for deterministic iteration.
    order: Vec<String>,
    parents: HashMap<String, String>,
    children: HashMap<String, Vec<String>>,
    edges: Vec<LineageEdge>,
}

impl LineageGraph {
    /// Build the graph from fragments in log order.
    pub fn build(fragments: &[ProvenanceFragment]) -> Self {
        let mut graph = Self::default();

        for fragment in fragments {
            let id = fragment.fragment_id.clone();

            if graph.nodes.insert(id.clone(), fragment.clone()).is_some() {
                tracing::warn!(fragment_id = %id, "Duplicate fragment id, later record wins");
            } else {
                graph.order.push(id.clone());
            }

            if let Some(parent) = fragment.parent_id() {
                graph.add_edge(parent, &id);
            }
        }

        tracing::debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "Lineage graph built"
        );

        graph
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        self.edges.push(LineageEdge {
            from: from.to_string(),
            to: to.to_string(),
        });
        self.parents.insert(to.to_string(), from.to_string());
        self.children
            .entry(from.to_string())
            .or_default()
            .push(to.to_string());
    }

    // ──────────────────────────────────────────────
    // Accessors
    // ──────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ProvenanceFragment> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Recorded parent id, whether or not that parent exists.
    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.parents.get(id).map(String::as_str)
    }

    /// Recorded child ids, in registration order, duplicates included.
    pub fn children_of(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes in first-seen order.
    pub fn nodes(&self) -> impl Iterator<Item = &ProvenanceFragment> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn edges(&self) -> &[LineageEdge] {
        &self.edges
    }

    // ──────────────────────────────────────────────
    // Queries
    // ──────────────────────────────────────────────

    /// Chain of fragments that produced `id`, root first, ending at `id`.
    ///
    /// Ids missing from the node table are skipped. A parent cycle stops the
    /// walk at the first repeated id.
    pub fn lineage(&self, id: &str) -> Vec<&ProvenanceFragment> {
        let mut chain: Vec<&str> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = Some(id);

        while let Some(cur) = current {
            if !visited.insert(cur) {
                tracing::warn!(
                    fragment_id = %id,
                    repeated = %cur,
                    "Parent cycle detected while tracing lineage"
                );
                break;
            }
            chain.push(cur);
            current = self.parent_of(cur);
        }

        chain
            .into_iter()
            .rev()
            .filter_map(|cur| self.nodes.get(cur))
            .collect()
    }

    /// Everything derived from `id`, breadth-first, excluding `id` itself.
    pub fn descendants(&self, id: &str) -> Vec<&ProvenanceFragment> {
        let mut found = Vec::new();
        let mut visited: HashSet<&str> = HashSet::from([id]);
        let mut queue: VecDeque<&str> = VecDeque::from([id]);

        while let Some(cur) = queue.pop_front() {
            for child in self.children_of(cur) {
                if visited.insert(child.as_str()) {
                    if let Some(node) = self.nodes.get(child) {
                        found.push(node);
                    }
                    queue.push_back(child.as_str());
                }
            }
        }

        found
    }

    /// Nodes with no recorded parent, or whose recorded parent is unknown.
    pub fn roots(&self) -> Vec<&ProvenanceFragment> {
        self.nodes()
            .filter(|node| match self.parent_of(&node.fragment_id) {
                None => true,
                Some(parent) => !self.contains(parent),
            })
            .collect()
    }

    /// Nodes with no recorded children.
    pub fn leaves(&self) -> Vec<&ProvenanceFragment> {
        self.nodes()
            .filter(|node| self.children_of(&node.fragment_id).is_empty())
            .collect()
    }

    pub fn statistics(&self) -> LineageStatistics {
        let mut fragment_types = BTreeMap::new();
        for node in self.nodes.values() {
            *fragment_types.entry(node.fragment_type.clone()).or_insert(0) += 1;
        }

        let roots = self.roots();
        let max_depth = roots
            .iter()
            .map(|root| self.depth_from(&root.fragment_id, &HashSet::new()))
            .max()
            .unwrap_or(0);

        LineageStatistics {
            total_fragments: self.nodes.len(),
            total_edges: self.edges.len(),
            root_count: roots.len(),
            leaf_count: self.leaves().len(),
            fragment_types,
            max_depth,
        }
    }

    /// Longest chain below `id`. `path` holds the ids on the current branch
    /// only; meeting one of them again ends that branch with depth 0.
    fn depth_from<'a>(&'a self, id: &'a str, path: &HashSet<&'a str>) -> usize {
        if path.contains(id) {
            return 0;
        }

        let children = self.children_of(id);
        if children.is_empty() {
            return 0;
        }

        let mut path = path.clone();
        path.insert(id);

        children
            .iter()
            .map(|child| 1 + self.depth_from(child, &path))
            .max()
            .unwrap_or(0)
    }
}
