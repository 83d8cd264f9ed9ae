//! Read-only queries over a [`super::GraphStore`]: edges, satisfaction, and
//! cycle detection (component C).
//!
//! Edges are never stored; they are derived on demand from each node's live
//! `item.dependencies()` (outgoing) or from the `reverse_deps` index
//! (incoming), so an edge always reflects the current item, including one
//! whose target does not (or no longer) exist.

use std::collections::HashSet;

use crate::item::{Dependency, NodeId};

use super::store::GraphStore;

/// A materialized dependency edge: `source` requires `dependency.required`.
#[derive(Clone)]
pub struct Edge {
    pub source: NodeId,
    pub dependency: Dependency,
}

impl Edge {
    pub fn target(&self) -> &NodeId {
        &self.dependency.required
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("source", &self.source)
            .field("target", self.target())
            .finish()
    }
}

/// A node's reconciliation status, tracked on [`super::Node`] and rendered by
/// the DOT exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "PascalCase")]
pub enum NodeState {
    /// Never reconciled: neither confirmed present nor confirmed absent.
    Unknown,
    /// Last reconcile created or confirmed it, and it currently satisfies the
    /// intended item.
    Created,
    /// Waiting on an unsatisfied dependency; no operation attempted yet.
    Pending,
    /// The last attempted operation for this node failed.
    Failure,
    /// A `Create` is in flight (synchronous call made, background work not
    /// yet complete).
    Creating,
    /// A `Delete` is in flight.
    Deleting,
    /// A `Modify` is in flight.
    Modifying,
    /// A `Delete` followed by a `Create` is in flight, for a
    /// `recreate_when_modified` dependency change.
    Recreating,
}

impl GraphStore {
    pub(crate) fn outgoing_edges(&self, id: &NodeId) -> Vec<Edge> {
        match self.nodes.get(id) {
            Some(node) => node
                .item
                .dependencies()
                .into_iter()
                .map(|dependency| Edge {
                    source: id.clone(),
                    dependency,
                })
                .collect(),
            None => Vec::new(),
        }
    }

    pub(crate) fn incoming_edges(&self, id: &NodeId) -> Vec<Edge> {
        let Some(sources) = self.reverse_deps.get(id) else {
            return Vec::new();
        };
        let mut edges = Vec::new();
        for source in sources {
            let Some(node) = self.nodes.get(source) else {
                continue;
            };
            for dependency in node.item.dependencies() {
                if &dependency.required == id {
                    edges.push(Edge {
                        source: source.clone(),
                        dependency,
                    });
                }
            }
        }
        edges
    }

    /// `true` iff `edge`'s target currently exists, is not `Pending` or
    /// `Failure`, and passes the edge's `must_satisfy` predicate.
    pub(crate) fn is_satisfied(&self, edge: &Edge) -> bool {
        match self.nodes.get(edge.target()) {
            Some(node) => {
                !matches!(node.state, NodeState::Pending | NodeState::Failure)
                    && edge.dependency.check_satisfies(node.item.as_ref())
            }
            None => false,
        }
    }

    /// Finds one cycle, if any, among the edges whose target currently
    /// exists (a dangling edge can never close a cycle). Deterministic: scans
    /// roots and each node's outgoing edges in `NodeId` order, so the same
    /// graph always reports the same path.
    pub(crate) fn detect_cycle(&self) -> Vec<NodeId> {
        let mut order: Vec<&NodeId> = self.nodes.keys().collect();
        order.sort();

        let mut visited: HashSet<NodeId> = HashSet::new();
        for start in &order {
            if visited.contains(*start) {
                continue;
            }
            let mut stack: Vec<NodeId> = Vec::new();
            let mut on_stack: HashSet<NodeId> = HashSet::new();
            if let Some(cycle) =
                self.dfs_find_cycle((*start).clone(), &mut visited, &mut on_stack, &mut stack)
            {
                return cycle;
            }
        }
        Vec::new()
    }

    fn dfs_find_cycle(
        &self,
        current: NodeId,
        visited: &mut HashSet<NodeId>,
        on_stack: &mut HashSet<NodeId>,
        stack: &mut Vec<NodeId>,
    ) -> Option<Vec<NodeId>> {
        visited.insert(current.clone());
        on_stack.insert(current.clone());
        stack.push(current.clone());

        let mut targets: Vec<NodeId> = self
            .outgoing_edges(&current)
            .into_iter()
            .map(|edge| edge.dependency.required)
            .filter(|target| self.nodes.contains_key(target))
            .collect();
        targets.sort();
        targets.dedup();

        for target in targets {
            if on_stack.contains(&target) {
                let start = stack.iter().position(|n| n == &target).unwrap();
                let mut cycle: Vec<NodeId> = stack[start..].to_vec();
                cycle.push(target);
                return Some(cycle);
            }
            if !visited.contains(&target) {
                if let Some(cycle) = self.dfs_find_cycle(target, visited, on_stack, stack) {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        on_stack.remove(&current);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;

    #[derive(Debug)]
    struct Leaf {
        name: String,
        deps: Vec<NodeId>,
    }

    impl Item for Leaf {
        fn item_type(&self) -> &str {
            "leaf"
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn equal(&self, other: &dyn Item) -> bool {
            self.name == other.name()
        }
        fn dependencies(&self) -> Vec<Dependency> {
            self.deps
                .iter()
                .cloned()
                .map(Dependency::requires)
                .collect()
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn leaf(name: &str, deps: &[&str]) -> std::rc::Rc<dyn Item> {
        std::rc::Rc::new(Leaf {
            name: name.to_owned(),
            deps: deps.iter().map(|d| NodeId::new("leaf", *d)).collect(),
        })
    }

    #[test]
    fn dangling_edge_is_never_satisfied_and_never_cycles() {
        let mut store = GraphStore::new("g".into(), String::new());
        store.put_node(&[], leaf("a", &["missing"]));
        assert!(store.detect_cycle().is_empty());
        let edge = store.outgoing_edges(&NodeId::new("leaf", "a")).remove(0);
        assert!(!store.is_satisfied(&edge));
    }

    #[test]
    fn detects_two_node_cycle() {
        let mut store = GraphStore::new("g".into(), String::new());
        store.put_node(&[], leaf("a", &["b"]));
        store.put_node(&[], leaf("b", &["a"]));
        let cycle = store.detect_cycle();
        assert!(!cycle.is_empty());
        assert_eq!(cycle.first(), cycle.last());
    }

    #[test]
    fn incoming_edges_reflect_reverse_deps() {
        let mut store = GraphStore::new("g".into(), String::new());
        store.put_node(&[], leaf("a", &["b"]));
        store.put_node(&[], leaf("b", &[]));
        let incoming = store.incoming_edges(&NodeId::new("leaf", "b"));
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].source, NodeId::new("leaf", "a"));
    }

    #[derive(Debug)]
    struct Versioned {
        name: String,
        version: u32,
    }

    impl Item for Versioned {
        fn item_type(&self) -> &str {
            "versioned"
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn equal(&self, other: &dyn Item) -> bool {
            self.name == other.name()
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    /// A target that exists but fails `must_satisfy` is unsatisfied just
    /// like a missing target, not merely "present but stale".
    #[test]
    fn must_satisfy_predicate_overrides_mere_existence() {
        let mut store = GraphStore::new("g".into(), String::new());
        store.put_node(
            &[],
            std::rc::Rc::new(Versioned {
                name: "b".to_owned(),
                version: 1,
            }),
        );

        let edge = Edge {
            source: NodeId::new("leaf", "a"),
            dependency: Dependency::requires(NodeId::new("versioned", "b")).with_must_satisfy(|item| {
                item.as_any()
                    .downcast_ref::<Versioned>()
                    .is_some_and(|v| v.version >= 2)
            }),
        };
        assert!(!store.is_satisfied(&edge));

        store.put_node(
            &[],
            std::rc::Rc::new(Versioned {
                name: "b".to_owned(),
                version: 2,
            }),
        );
        assert!(store.is_satisfied(&edge));
    }
}
