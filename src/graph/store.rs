//! Backing storage for a [`super::Graph`] tree: a flat node map plus a
//! path-addressed subgraph tree, independent of any single handle.
//!
//! Nodes are stored flat (not nested inside the subgraph tree) so that
//! `put_node`/`del_node` never need to walk down a tree to find their
//! target, and so a node's reverse-dependency bookkeeping stays correct
//! regardless of which subgraph it (or its dependents) live in.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use super::Node;
use crate::item::{Item, NodeId};

pub(crate) struct GraphStore {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) nodes: IndexMap<NodeId, Node>,
    /// target -> set of nodes whose `dependencies()` name it as `required`.
    /// Populated/cleared from the *source*'s side, so it is correct for
    /// dangling targets (targets that do not exist) too.
    pub(crate) reverse_deps: IndexMap<NodeId, IndexSet<NodeId>>,
    /// subgraph path (including the root, `[]`) -> direct child node ids.
    pub(crate) nodes_by_path: BTreeMap<Vec<String>, BTreeSet<NodeId>>,
    /// subgraph path -> that subgraph's description. The root's own
    /// description is tracked separately in `description` above so that
    /// `GraphSpec`'s top-level description round-trips without needing a
    /// synthetic root entry here.
    pub(crate) subgraph_descriptions: BTreeMap<Vec<String>, String>,
    /// NodeId -> path of the subgraph that directly owns it.
    pub(crate) node_paths: IndexMap<NodeId, Vec<String>>,
}

impl GraphStore {
    pub(crate) fn new(name: String, description: String) -> Self {
        let mut nodes_by_path = BTreeMap::new();
        nodes_by_path.insert(Vec::new(), BTreeSet::new());
        Self {
            name,
            description,
            nodes: IndexMap::new(),
            reverse_deps: IndexMap::new(),
            nodes_by_path,
            subgraph_descriptions: BTreeMap::new(),
            node_paths: IndexMap::new(),
        }
    }

    pub(crate) fn put_node(&mut self, path: &[String], item: Rc<dyn Item>) -> NodeId {
        let id = NodeId::for_item(item.as_ref());

        // Clear this node's old outgoing reverse-dependency entries (if any)
        // before recomputing them from the new item below.
        if let Some(old_path) = self.node_paths.get(&id) {
            if old_path != path {
                if let Some(set) = self.nodes_by_path.get_mut(old_path) {
                    set.remove(&id);
                }
            }
        }
        if let Some(old_node) = self.nodes.get(&id) {
            for dep in old_node.item.dependencies() {
                if let Some(dependents) = self.reverse_deps.get_mut(&dep.required) {
                    dependents.shift_remove(&id);
                }
            }
        }

        for dep in item.dependencies() {
            self.reverse_deps
                .entry(dep.required.clone())
                .or_default()
                .insert(id.clone());
        }

        self.nodes_by_path
            .entry(path.to_vec())
            .or_default()
            .insert(id.clone());
        self.node_paths.insert(id.clone(), path.to_vec());

        match self.nodes.get_mut(&id) {
            Some(existing) => {
                existing.item = item;
            }
            None => {
                self.nodes.insert(id.clone(), Node::new(item));
            }
        }
        id
    }

    pub(crate) fn del_node(&mut self, id: &NodeId) -> bool {
        let Some(node) = self.nodes.swap_remove(id) else {
            return false;
        };
        for dep in node.item.dependencies() {
            if let Some(dependents) = self.reverse_deps.get_mut(&dep.required) {
                dependents.shift_remove(id);
            }
        }
        if let Some(path) = self.node_paths.shift_remove(id) {
            if let Some(set) = self.nodes_by_path.get_mut(&path) {
                set.remove(id);
            }
        }
        true
    }

    pub(crate) fn put_subgraph(&mut self, path: &[String], description: String) {
        self.nodes_by_path.entry(path.to_vec()).or_default();
        self.subgraph_descriptions
            .insert(path.to_vec(), description);
        // Ensure every ancestor along the path is addressable too, matching
        // "recursively constructed" subgraphs built via GraphSpec.
        for depth in 0..path.len() {
            self.nodes_by_path
                .entry(path[..depth].to_vec())
                .or_default();
        }
    }

    pub(crate) fn has_subgraph(&self, path: &[String]) -> bool {
        self.nodes_by_path.contains_key(path)
    }

    pub(crate) fn del_subgraph(&mut self, path: &[String]) -> bool {
        if !self.has_subgraph(path) {
            return false;
        }
        let doomed_paths: Vec<Vec<String>> = self
            .nodes_by_path
            .keys()
            .filter(|p| p.starts_with(path))
            .cloned()
            .collect();
        let doomed_nodes: Vec<NodeId> = doomed_paths
            .iter()
            .flat_map(|p| self.nodes_by_path.get(p).cloned().unwrap_or_default())
            .collect();
        for id in &doomed_nodes {
            self.del_node(id);
        }
        for p in &doomed_paths {
            self.nodes_by_path.remove(p);
            self.subgraph_descriptions.remove(p);
        }
        true
    }

    pub(crate) fn child_subgraph_names(&self, path: &[String]) -> Vec<String> {
        let mut names: BTreeSet<String> = BTreeSet::new();
        for candidate in self.nodes_by_path.keys() {
            if candidate.len() == path.len() + 1 && candidate.starts_with(path) {
                names.insert(candidate[path.len()].clone());
            }
        }
        names.into_iter().collect()
    }

    pub(crate) fn nodes_under(&self, path: &[String], include_subgraphs: bool) -> Vec<NodeId> {
        let mut out = Vec::new();
        for (candidate_path, ids) in &self.nodes_by_path {
            if !candidate_path.starts_with(path) {
                continue;
            }
            if !include_subgraphs && candidate_path.len() != path.len() {
                continue;
            }
            out.extend(ids.iter().cloned());
        }
        out
    }
}
