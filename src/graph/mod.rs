//! The dependency graph store (component B) and its query surface
//! (component C).
//!
//! A [`Graph`] is a cheap, `Clone`-able handle into a shared [`GraphStore`].
//! Per Design Note (see crate docs), nodes and edges never hold a pointer
//! back to their owning graph: everything is addressed by [`NodeId`] or by a
//! subgraph path, and operations that need "the graph" take a handle
//! explicitly. Interior mutability (`Rc<RefCell<_>>`) stands in for the
//! single-threaded, one-writer-at-a-time discipline the spec requires; a
//! handle built from a foreign graph's tree is rejected with
//! [`StructuralError::ForeignGraphHandle`], and an already-borrowed `RefCell`
//! panicking on reentrant misuse is exactly the "abort on structural misuse"
//! behavior called for.

mod queries;
mod store;

use std::cell::{Ref, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

pub use queries::{Edge, NodeState};
pub(crate) use store::GraphStore;

use crate::error::{OperationKind, ReconcileError, StructuralError};
use crate::item::{validate_identity_component, Item, NodeId};

/// Opaque, caller-attached data carried on a [`Node`] across reconcile
/// passes. The engine never inspects it.
pub type PrivateData = Box<dyn std::any::Any>;

/// A node: an item plus its reconciliation metadata.
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) item: Rc<dyn Item>,
    pub(crate) state: NodeState,
    pub(crate) last_operation: Option<OperationKind>,
    pub(crate) last_error: Option<String>,
    pub(crate) private_data: Option<PrivateData>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("item", &self.item)
            .field("state", &self.state)
            .field("last_operation", &self.last_operation)
            .field("last_error", &self.last_error)
            .field("has_private_data", &self.private_data.is_some())
            .finish()
    }
}

impl Node {
    fn new(item: Rc<dyn Item>) -> Self {
        Self {
            id: NodeId::for_item(item.as_ref()),
            item,
            state: NodeState::Unknown,
            last_operation: None,
            last_error: None,
            private_data: None,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn item(&self) -> &dyn Item {
        self.item.as_ref()
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn last_operation(&self) -> Option<OperationKind> {
        self.last_operation
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn private_data(&self) -> Option<&PrivateData> {
        self.private_data.as_ref()
    }

    pub fn private_data_mut(&mut self) -> Option<&mut PrivateData> {
        self.private_data.as_mut()
    }

    pub fn set_private_data(&mut self, data: PrivateData) {
        self.private_data = Some(data);
    }
}

/// Recursive description of a subgraph used to bulk-build a [`Graph`] via
/// [`Graph::new`], mirroring `newGraph`'s `{name, description, items,
/// subgraphs}` shape.
#[derive(Default)]
pub struct SubgraphSpec {
    pub name: String,
    pub description: String,
    pub items: Vec<Box<dyn Item>>,
    pub subgraphs: Vec<SubgraphSpec>,
}

impl SubgraphSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_item(mut self, item: Box<dyn Item>) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_subgraph(mut self, subgraph: SubgraphSpec) -> Self {
        self.subgraphs.push(subgraph);
        self
    }
}

/// Top-level spec passed to [`Graph::new`].
#[derive(Default)]
pub struct GraphSpec {
    pub name: String,
    pub description: String,
    pub items: Vec<Box<dyn Item>>,
    pub subgraphs: Vec<SubgraphSpec>,
}

impl GraphSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_item(mut self, item: Box<dyn Item>) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_subgraph(mut self, subgraph: SubgraphSpec) -> Self {
        self.subgraphs.push(subgraph);
        self
    }
}

/// A read-write handle into one subgraph of a shared [`GraphStore`].
///
/// Cloning a `Graph` is cheap (an `Rc` bump) and yields another handle to the
/// *same* subgraph of the *same* store — it does not copy the graph.
#[derive(Clone)]
pub struct Graph {
    pub(crate) store: Rc<RefCell<GraphStore>>,
    pub(crate) path: Vec<String>,
}

/// A read-only handle, returned by [`Graph::sub_graph`] and
/// [`Graph::parent_graph`]. Lift it back to a [`Graph`] with
/// [`Graph::edit_sub_graph`] / [`Graph::edit_parent_graph`].
#[derive(Clone)]
pub struct ReadGraph {
    pub(crate) store: Rc<RefCell<GraphStore>>,
    pub(crate) path: Vec<String>,
}

impl Graph {
    /// Builds a fresh root graph from a [`GraphSpec`], recursively inserting
    /// items and subgraphs.
    pub fn new(spec: GraphSpec) -> Result<Graph, ReconcileError> {
        let store = GraphStore::new(spec.name, spec.description);
        let root = Graph {
            store: Rc::new(RefCell::new(store)),
            path: Vec::new(),
        };
        for item in spec.items {
            root.put_node(item)?;
        }
        for child in spec.subgraphs {
            root.build_subgraph(child)?;
        }
        Ok(root)
    }

    /// An empty root graph, for callers building up state incrementally
    /// (e.g. the very first `current` graph, which starts empty).
    pub fn empty(name: impl Into<String>) -> Graph {
        Graph {
            store: Rc::new(RefCell::new(GraphStore::new(name.into(), String::new()))),
            path: Vec::new(),
        }
    }

    fn build_subgraph(&self, spec: SubgraphSpec) -> Result<(), ReconcileError> {
        let child = self.put_sub_graph(spec.name, spec.description)?;
        for item in spec.items {
            child.put_node(item)?;
        }
        for grandchild in spec.subgraphs {
            child.build_subgraph(grandchild)?;
        }
        Ok(())
    }

    pub fn name(&self) -> String {
        self.store.borrow().name.clone()
    }

    pub fn description(&self) -> String {
        if self.path.is_empty() {
            self.store.borrow().description.clone()
        } else {
            self.store
                .borrow()
                .subgraph_descriptions
                .get(&self.path)
                .cloned()
                .unwrap_or_default()
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Inserts or replaces `item` at this subgraph, keyed by its `NodeId`.
    /// Metadata (state, last operation/error, private data) carries forward
    /// on replacement; it is reset only when the node did not previously
    /// exist.
    pub fn put_node(&self, item: Box<dyn Item>) -> Result<NodeId, ReconcileError> {
        validate_item(item.as_ref())?;
        let mut store = self.store.borrow_mut();
        Ok(store.put_node(&self.path, Rc::from(item)))
    }

    /// Recovers the shared item handle for `id`, if present. Used internally
    /// by the reconciler to move an item from the intended graph into the
    /// current graph on a successful Create/Modify without requiring `Item`
    /// to be cloneable: both graphs end up pointing at the same `Rc`.
    pub(crate) fn item_handle(&self, id: &NodeId) -> Option<Rc<dyn Item>> {
        self.store.borrow().nodes.get(id).map(|node| Rc::clone(&node.item))
    }

    /// Inserts `item` (already validated by its origin graph) at this
    /// subgraph, sharing the handle rather than re-validating or cloning.
    pub(crate) fn put_node_shared(&self, item: Rc<dyn Item>) -> NodeId {
        self.store.borrow_mut().put_node(&self.path, item)
    }

    /// Overwrites a node's reconciliation metadata in place, leaving its item
    /// untouched. No-op if the node does not exist (it may have just been
    /// removed by a concurrent cascade within the same pass).
    pub(crate) fn set_node_status(
        &self,
        id: &NodeId,
        state: NodeState,
        last_operation: Option<OperationKind>,
        last_error: Option<String>,
    ) {
        if let Some(node) = self.store.borrow_mut().nodes.get_mut(id) {
            node.state = state;
            node.last_operation = last_operation;
            node.last_error = last_error;
        }
    }

    /// Removes the node, returning whether it previously existed. Outgoing
    /// edges vanish with it; other nodes' edges into it become dangling.
    pub fn del_node(&self, id: &NodeId) -> bool {
        self.store.borrow_mut().del_node(id)
    }

    pub fn node(&self, id: &NodeId) -> Option<Ref<'_, Node>> {
        Ref::filter_map(self.store.borrow(), |s| s.nodes.get(id)).ok()
    }

    /// All node ids directly in this subgraph (`include_subgraphs = false`)
    /// or in this subgraph and every descendant (`true`), in deterministic
    /// lexicographic-by-path-then-id order.
    pub fn nodes(&self, include_subgraphs: bool) -> Vec<NodeId> {
        self.store.borrow().nodes_under(&self.path, include_subgraphs)
    }

    pub fn outgoing_edges(&self, id: &NodeId) -> Vec<Edge> {
        self.store.borrow().outgoing_edges(id)
    }

    pub fn incoming_edges(&self, id: &NodeId) -> Vec<Edge> {
        self.store.borrow().incoming_edges(id)
    }

    /// Inserts (or updates the description of) a direct child subgraph,
    /// returning a read-write handle to it.
    pub fn put_sub_graph(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Graph, ReconcileError> {
        let name = name.into();
        validate_identity_component("subgraph name", &name)
            .map_err(|reason| StructuralError::InvalidItem { reason })?;
        let mut child_path = self.path.clone();
        child_path.push(name);
        self.store
            .borrow_mut()
            .put_subgraph(&child_path, description.into());
        Ok(Graph {
            store: Rc::clone(&self.store),
            path: child_path,
        })
    }

    /// Recursively removes a direct child subgraph: every descendant
    /// subgraph and every node they own. Returns whether it existed.
    pub fn del_sub_graph(&self, name: &str) -> bool {
        let mut child_path = self.path.clone();
        child_path.push(name.to_owned());
        self.store.borrow_mut().del_subgraph(&child_path)
    }

    pub fn sub_graph(&self, name: &str) -> Option<ReadGraph> {
        let mut child_path = self.path.clone();
        child_path.push(name.to_owned());
        self.store
            .borrow()
            .has_subgraph(&child_path)
            .then(|| ReadGraph {
                store: Rc::clone(&self.store),
                path: child_path,
            })
    }

    /// Direct child subgraph names, sorted.
    pub fn sub_graphs(&self) -> Vec<String> {
        self.store.borrow().child_subgraph_names(&self.path)
    }

    pub fn parent_graph(&self) -> Option<ReadGraph> {
        if self.path.is_empty() {
            return None;
        }
        let mut parent_path = self.path.clone();
        parent_path.pop();
        Some(ReadGraph {
            store: Rc::clone(&self.store),
            path: parent_path,
        })
    }

    /// Lifts a read-only handle obtained from [`Graph::sub_graph`] into a
    /// read-write one. Fails loudly ([`StructuralError::ForeignGraphHandle`])
    /// if `handle` was not produced from this same graph tree.
    pub fn edit_sub_graph(&self, handle: &ReadGraph) -> Result<Graph, ReconcileError> {
        if !Rc::ptr_eq(&self.store, &handle.store) {
            return Err(StructuralError::ForeignGraphHandle.into());
        }
        Ok(Graph {
            store: Rc::clone(&self.store),
            path: handle.path.clone(),
        })
    }

    pub fn edit_parent_graph(&self) -> Result<Graph, ReconcileError> {
        let parent = self.parent_graph().ok_or_else(|| StructuralError::UnknownSubgraph {
            path: "<root has no parent>".to_owned(),
        })?;
        self.edit_sub_graph(&parent)
    }

    pub fn detect_cycle(&self) -> Vec<NodeId> {
        self.store.borrow().detect_cycle()
    }

    pub fn is_satisfied(&self, edge: &Edge) -> bool {
        self.store.borrow().is_satisfied(edge)
    }
}

impl ReadGraph {
    pub fn name(&self) -> String {
        self.store.borrow().name.clone()
    }

    pub fn description(&self) -> String {
        if self.path.is_empty() {
            self.store.borrow().description.clone()
        } else {
            self.store
                .borrow()
                .subgraph_descriptions
                .get(&self.path)
                .cloned()
                .unwrap_or_default()
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn node(&self, id: &NodeId) -> Option<Ref<'_, Node>> {
        Ref::filter_map(self.store.borrow(), |s| s.nodes.get(id)).ok()
    }

    pub fn nodes(&self, include_subgraphs: bool) -> Vec<NodeId> {
        self.store.borrow().nodes_under(&self.path, include_subgraphs)
    }

    pub fn outgoing_edges(&self, id: &NodeId) -> Vec<Edge> {
        self.store.borrow().outgoing_edges(id)
    }

    pub fn incoming_edges(&self, id: &NodeId) -> Vec<Edge> {
        self.store.borrow().incoming_edges(id)
    }

    pub fn sub_graphs(&self) -> Vec<String> {
        self.store.borrow().child_subgraph_names(&self.path)
    }

    pub fn detect_cycle(&self) -> Vec<NodeId> {
        self.store.borrow().detect_cycle()
    }

    pub fn is_satisfied(&self, edge: &Edge) -> bool {
        self.store.borrow().is_satisfied(edge)
    }
}

fn validate_item(item: &dyn Item) -> Result<(), ReconcileError> {
    validate_identity_component("type", item.item_type())
        .and_then(|()| validate_identity_component("name", item.name()))
        .map_err(|reason| ReconcileError::from(StructuralError::InvalidItem { reason }))?;
    if item.external() && !item.dependencies().is_empty() {
        return Err(StructuralError::InvalidItem {
            reason: format!(
                "external item {}/{} must not declare dependencies",
                item.item_type(),
                item.name()
            ),
        }
        .into());
    }
    Ok(())
}

/// Snapshot of which `NodeId`s live directly under a given subgraph path,
/// used by the DOT renderer to walk the cluster tree without re-borrowing
/// the store for every node.
pub(crate) fn direct_children(store: &GraphStore, path: &[String]) -> BTreeSet<NodeId> {
    store
        .nodes_by_path
        .get(path)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Dependency;

    #[derive(Debug)]
    struct Simple {
        name: String,
        dep: Option<NodeId>,
        external: bool,
    }

    impl Item for Simple {
        fn item_type(&self) -> &str {
            "simple"
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn external(&self) -> bool {
            self.external
        }
        fn equal(&self, other: &dyn Item) -> bool {
            self.name == other.name()
        }
        fn dependencies(&self) -> Vec<Dependency> {
            self.dep
                .clone()
                .map(|d| vec![Dependency::requires(d)])
                .unwrap_or_default()
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn simple(name: &str) -> Box<dyn Item> {
        Box::new(Simple {
            name: name.to_owned(),
            dep: None,
            external: false,
        })
    }

    #[test]
    fn put_and_get_node() {
        let graph = Graph::empty("g");
        let id = graph.put_node(simple("a")).unwrap();
        assert_eq!(id.to_string(), "simple/a");
        assert!(graph.node(&id).is_some());
    }

    #[test]
    fn rejects_external_item_with_dependencies() {
        let graph = Graph::empty("g");
        let item = Box::new(Simple {
            name: "a".to_owned(),
            dep: Some(NodeId::new("simple", "b")),
            external: true,
        });
        assert!(graph.put_node(item).is_err());
    }

    #[test]
    fn del_node_removes_it_and_reports_existence() {
        let graph = Graph::empty("g");
        let id = graph.put_node(simple("a")).unwrap();
        assert!(graph.del_node(&id));
        assert!(graph.node(&id).is_none());
        assert!(!graph.del_node(&id));
    }

    #[test]
    fn subgraph_put_edit_and_delete() {
        let root = Graph::empty("g");
        let child = root.put_sub_graph("net", "networking").unwrap();
        child.put_node(simple("a")).unwrap();
        assert_eq!(root.sub_graphs(), vec!["net".to_owned()]);

        let view = root.sub_graph("net").unwrap();
        let edited = root.edit_sub_graph(&view).unwrap();
        assert_eq!(edited.nodes(false).len(), 1);

        assert!(root.del_sub_graph("net"));
        assert!(root.sub_graph("net").is_none());
    }

    #[test]
    fn edit_sub_graph_rejects_foreign_handle() {
        let a = Graph::empty("a");
        let b = Graph::empty("b");
        let b_child = b.put_sub_graph("x", "").unwrap();
        let foreign_view = b.sub_graph("x").unwrap();
        let _ = b_child;
        assert!(a.edit_sub_graph(&foreign_view).is_err());
    }

    #[test]
    fn node_order_is_lexicographic_by_path_then_id() {
        let root = Graph::empty("g");
        root.put_node(simple("b")).unwrap();
        root.put_node(simple("a")).unwrap();
        let child = root.put_sub_graph("sub", "").unwrap();
        child.put_node(simple("z")).unwrap();

        let all = root.nodes(true);
        let rendered: Vec<String> = all.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["simple/a", "simple/b", "simple/z"]);
    }
}
