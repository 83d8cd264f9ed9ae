//! Reconciliation driver (component F): turns a diff into an ordered
//! sequence of configurator calls, threading per-node state transitions and
//! cascading Pending/Recreate across dependency edges.
//!
//! The driver is intentionally synchronous: a configurator that needs to run
//! long, async work calls [`crate::async_coord::OpContext::continue_in_background`]
//! and returns quickly, leaving the driver to mark the node in-progress and
//! move on to independent work in the same pass.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use tracing::{debug, error, instrument, warn};

use crate::async_coord::{AsyncCoordinator, CancelAsyncOps, Completion, ResumeReceiver, WaitForAsyncOps};
use crate::config::ReconcileConfig;
use crate::diff::{self, DiffOp};
use crate::error::{OperationError, OperationKind, ReconcileError, StructuralError};
use crate::graph::{Graph, NodeState};
use crate::item::NodeId;
use crate::registry::Registry;

/// One entry in a pass's operation log.
#[derive(Debug)]
pub struct OperationLogEntry {
    pub node: NodeId,
    pub operation: OperationKind,
    pub start_time: Instant,
    pub end_time: Option<Instant>,
    pub in_progress: bool,
    pub err: Option<String>,
}

/// Outcome of one [`Reconciler::reconcile`] call.
pub struct Status {
    /// `Some` if any transition failed; individual item errors are also
    /// recorded on their nodes regardless.
    pub err: Option<ReconcileError>,
    pub new_current_state: Graph,
    pub operation_log: Vec<OperationLogEntry>,
    pub async_ops_in_progress: bool,
    /// Single-consumer; invalidated by the next `reconcile` call.
    pub ready_to_resume: ResumeReceiver,
    pub cancel_async_ops: CancelAsyncOps,
    pub wait_for_async_ops: WaitForAsyncOps,
}

/// A stateless engine over a [`Registry`] and a [`ReconcileConfig`]: all
/// durable state lives on the current-state [`Graph`] passed to
/// [`Reconciler::reconcile`]. The one piece of state this struct itself
/// carries is the plumbing for background operations already registered
/// through a prior call on this exact instance — keeping one `Reconciler`
/// alive across passes is how a caller resumes in-flight async work.
pub struct Reconciler {
    registry: Registry,
    coordinator: AsyncCoordinator,
    fail_fast: bool,
}

impl Reconciler {
    pub fn new(registry: Registry, config: ReconcileConfig) -> Self {
        let coordinator =
            AsyncCoordinator::new(config.resume_channel_capacity, config.cancellation.clone());
        Self {
            registry,
            coordinator,
            fail_fast: config.fail_fast,
        }
    }

    #[instrument(skip_all, fields(current_nodes = current.nodes(true).len(), intended_nodes = intended.nodes(true).len()))]
    pub fn reconcile(&self, current: &Graph, intended: &Graph) -> Status {
        let mut log = Vec::new();
        self.absorb_completions(current, &mut log);

        if let Some(err) = self.check_cycles(current, intended) {
            return self.finish(current, Some(err), log);
        }

        let ops = match diff::diff(current, intended, &self.registry) {
            Ok(ops) => ops,
            Err(err) => return self.finish(current, Some(err), log),
        };

        let mut errors = Vec::new();
        self.run_pass1(current, &ops, &mut log, &mut errors);
        self.run_pass2(current, intended, &ops, &mut log, &mut errors);

        let err = ReconcileError::from_operation_errors(errors);
        self.finish(current, err, log)
    }

    fn finish(
        &self,
        current: &Graph,
        err: Option<ReconcileError>,
        log: Vec<OperationLogEntry>,
    ) -> Status {
        Status {
            err,
            new_current_state: current.clone(),
            operation_log: log,
            async_ops_in_progress: self.coordinator.has_in_progress(),
            ready_to_resume: self.coordinator.next_resume_receiver(),
            cancel_async_ops: self.coordinator.cancel_async_ops(),
            wait_for_async_ops: self.coordinator.wait_for_async_ops(),
        }
    }

    /// Absorbs every background completion delivered since the last call,
    /// applying its result to the current graph before this pass schedules
    /// any new work.
    fn absorb_completions(&self, current: &Graph, log: &mut Vec<OperationLogEntry>) {
        let mut completions = Vec::new();
        self.coordinator.drain_ready(|completion| completions.push(completion));
        for completion in completions {
            self.apply_completion(current, completion, log);
        }
    }

    fn apply_completion(
        &self,
        current: &Graph,
        completion: Completion,
        log: &mut Vec<OperationLogEntry>,
    ) {
        let Completion {
            node,
            operation,
            result,
        } = completion;
        match result {
            Ok(()) => {
                if operation == OperationKind::Delete {
                    current.del_node(&node);
                } else {
                    current.set_node_status(&node, NodeState::Created, Some(operation), None);
                }
                debug!(node = %node, %operation, "background operation completed");
            }
            Err(source) => {
                let message = source.to_string();
                current.set_node_status(
                    &node,
                    NodeState::Failure,
                    Some(operation),
                    Some(message.clone()),
                );
                error!(node = %node, %operation, error = %message, "background operation failed");
            }
        }
        log.push(OperationLogEntry {
            node,
            operation,
            start_time: Instant::now(),
            end_time: Some(Instant::now()),
            in_progress: false,
            err: None,
        });
    }

    /// The path (joined with `/`) of the subgraph `id` currently lives under,
    /// used only to label the resume signal a background operation's
    /// [`crate::async_coord::BackgroundHandle::done`] sends back to the
    /// caller. Empty string for the root subgraph.
    fn subgraph_of(graph: &Graph, id: &NodeId) -> String {
        graph
            .store
            .borrow()
            .node_paths
            .get(id)
            .map(|path| path.join("/"))
            .unwrap_or_default()
    }

    fn check_cycles(&self, current: &Graph, intended: &Graph) -> Option<ReconcileError> {
        let path = current.detect_cycle();
        if !path.is_empty() {
            return Some(StructuralError::CycleDetected { path }.into());
        }
        let path = intended.detect_cycle();
        if !path.is_empty() {
            return Some(StructuralError::CycleDetected { path }.into());
        }
        None
    }

    /// Pass 1: deletes (and the delete half of recreates) in reverse
    /// dependency order, cascading into dependents that were not themselves
    /// flagged for removal (see `DESIGN.md` for the scenario this
    /// generalizes from, S4).
    fn run_pass1(
        &self,
        current: &Graph,
        ops: &BTreeMap<NodeId, DiffOp>,
        log: &mut Vec<OperationLogEntry>,
        errors: &mut Vec<OperationError>,
    ) {
        let mut roots: Vec<NodeId> = ops
            .iter()
            .filter(|(_, op)| matches!(op, DiffOp::Delete | DiffOp::Recreate))
            .map(|(id, _)| id.clone())
            .collect();
        roots.sort();

        let mut visited = HashSet::new();
        for root in roots {
            self.delete_with_dependents(current, &root, ops, &mut visited, log, errors);
        }
    }

    fn delete_with_dependents(
        &self,
        current: &Graph,
        id: &NodeId,
        ops: &BTreeMap<NodeId, DiffOp>,
        visited: &mut HashSet<NodeId>,
        log: &mut Vec<OperationLogEntry>,
        errors: &mut Vec<OperationError>,
    ) {
        if visited.contains(id) {
            return;
        }
        visited.insert(id.clone());

        let target_external = current
            .node(id)
            .map(|node| node.item().external())
            .unwrap_or(false);

        let mut dependents = current.incoming_edges(id);
        dependents.sort_by(|a, b| a.source.cmp(&b.source));
        for edge in dependents {
            let source = edge.source.clone();
            if source == *id {
                continue;
            }

            if edge.dependency.auto_deleted_by_external && target_external {
                warn!(node = %source, blocked_on = %id, "dependency auto-deleted by external removal, marking pending");
                current.set_node_status(&source, NodeState::Pending, None, None);
                continue;
            }

            self.delete_with_dependents(current, &source, ops, visited, log, errors);

            if !matches!(ops.get(&source), Some(DiffOp::Delete) | Some(DiffOp::Recreate)) {
                // `source` was not itself slated for removal: its dependency
                // is vanishing out from under it, so it must be torn down
                // too, but it stays tracked (Pending) rather than removed.
                self.call_delete(current, &source, log, errors);
                current.set_node_status(&source, NodeState::Pending, Some(OperationKind::Delete), None);
            }
        }

        match ops.get(id) {
            Some(DiffOp::Delete) => {
                self.call_delete(current, id, log, errors);
                current.del_node(id);
            }
            Some(DiffOp::Recreate) => {
                self.call_delete(current, id, log, errors);
                // The create half runs in Pass 2; keep the node around with
                // an intermediate state rather than removing it outright, so
                // a caller inspecting `current` between passes (or if the
                // create half goes async) sees `Recreating`, not a gap.
                current.set_node_status(id, NodeState::Recreating, Some(OperationKind::Delete), None);
            }
            _ => {}
        }
    }

    fn call_delete(
        &self,
        current: &Graph,
        id: &NodeId,
        log: &mut Vec<OperationLogEntry>,
        errors: &mut Vec<OperationError>,
    ) {
        let external = current
            .node(id)
            .map(|node| node.item().external())
            .unwrap_or(true);
        if external {
            return;
        }
        let item_type = id.item_type().to_owned();
        let Some(configurator) = self.registry.get(&item_type) else {
            errors.push(OperationError {
                node: id.clone(),
                operation: OperationKind::Delete,
                source: Box::new(StructuralError::UnregisteredConfigurator { item_type }),
            });
            return;
        };

        current.set_node_status(id, NodeState::Deleting, Some(OperationKind::Delete), None);
        let ctx = self
            .coordinator
            .op_context(id.clone(), OperationKind::Delete, Self::subgraph_of(current, id));
        let start_time = Instant::now();
        let result = current
            .node(id)
            .map(|node| configurator.delete(&ctx, node.item()))
            .unwrap_or(Ok(()));

        if ctx.went_async() && result.is_ok() {
            self.coordinator.mark_in_progress(id.clone());
            log.push(OperationLogEntry {
                node: id.clone(),
                operation: OperationKind::Delete,
                start_time,
                end_time: None,
                in_progress: true,
                err: None,
            });
            debug!(node = %id, "delete continued in background");
            return;
        }

        match result {
            Ok(()) => {
                debug!(node = %id, "delete completed");
                log.push(OperationLogEntry {
                    node: id.clone(),
                    operation: OperationKind::Delete,
                    start_time,
                    end_time: Some(Instant::now()),
                    in_progress: false,
                    err: None,
                });
            }
            Err(source) => {
                let message = source.to_string();
                error!(node = %id, error = %message, "delete failed");
                current.set_node_status(
                    id,
                    NodeState::Failure,
                    Some(OperationKind::Delete),
                    Some(message.clone()),
                );
                log.push(OperationLogEntry {
                    node: id.clone(),
                    operation: OperationKind::Delete,
                    start_time,
                    end_time: Some(Instant::now()),
                    in_progress: false,
                    err: Some(message),
                });
                errors.push(OperationError {
                    node: id.clone(),
                    operation: OperationKind::Delete,
                    source,
                });
            }
        }
    }

    /// Pass 2: creates (and the create half of recreates) and modifies, in
    /// forward dependency order (post-order over `intended`).
    fn run_pass2(
        &self,
        current: &Graph,
        intended: &Graph,
        ops: &BTreeMap<NodeId, DiffOp>,
        log: &mut Vec<OperationLogEntry>,
        errors: &mut Vec<OperationError>,
    ) {
        let mut roots = intended.nodes(true);
        roots.sort();

        let mut visited = HashSet::new();
        for root in roots {
            self.advance_node(current, intended, &root, ops, &mut visited, log, errors);
        }
    }

    fn advance_node(
        &self,
        current: &Graph,
        intended: &Graph,
        id: &NodeId,
        ops: &BTreeMap<NodeId, DiffOp>,
        visited: &mut HashSet<NodeId>,
        log: &mut Vec<OperationLogEntry>,
        errors: &mut Vec<OperationError>,
    ) {
        if visited.contains(id) {
            return;
        }
        visited.insert(id.clone());

        if self.fail_fast && !errors.is_empty() {
            return;
        }

        let mut deps = intended.outgoing_edges(id);
        deps.sort_by(|a, b| a.target().cmp(b.target()));
        for edge in &deps {
            if intended.node(edge.target()).is_some() {
                self.advance_node(current, intended, edge.target(), ops, visited, log, errors);
            }
        }

        let Some(op) = ops.get(id).copied() else {
            return;
        };
        if matches!(op, DiffOp::Delete | DiffOp::Noop) {
            return;
        }
        if self.coordinator.is_in_progress(id) {
            return;
        }

        // A target that is itself mid-operation (e.g. an async Create not
        // yet completed) must block its dependents from advancing in this
        // same pass, even though it already exists in `current` and is not
        // Pending/Failure: otherwise two transitively-dependent operations
        // could run concurrently, which the concurrency model forbids.
        let unsatisfied = deps
            .iter()
            .any(|edge| !current.is_satisfied(edge) || self.coordinator.is_in_progress(edge.target()));
        if unsatisfied {
            warn!(node = %id, "dependency unsatisfied, marking pending");
            if current.node(id).is_some() {
                current.set_node_status(id, NodeState::Pending, None, None);
            } else {
                let item = intended.item_handle(id).expect("id came from intended");
                current.put_node_shared(item);
                current.set_node_status(id, NodeState::Pending, None, None);
            }
            return;
        }

        match op {
            DiffOp::Create => self.do_create(current, intended, id, log, errors),
            DiffOp::Modify => self.do_modify(current, intended, id, log, errors),
            DiffOp::Recreate => self.do_create(current, intended, id, log, errors),
            DiffOp::Delete | DiffOp::Noop => unreachable!("filtered out above"),
        }
    }

    fn do_create(
        &self,
        current: &Graph,
        intended: &Graph,
        id: &NodeId,
        log: &mut Vec<OperationLogEntry>,
        errors: &mut Vec<OperationError>,
    ) {
        let item = intended.item_handle(id).expect("id came from intended");
        let item_type = id.item_type().to_owned();

        if item.external() {
            current.put_node_shared(item);
            current.set_node_status(id, NodeState::Created, None, None);
            return;
        }

        let Some(configurator) = self.registry.get(&item_type) else {
            errors.push(OperationError {
                node: id.clone(),
                operation: OperationKind::Create,
                source: Box::new(StructuralError::UnregisteredConfigurator { item_type }),
            });
            return;
        };

        current.put_node_shared(item.clone());
        current.set_node_status(id, NodeState::Creating, Some(OperationKind::Create), None);
        let ctx = self
            .coordinator
            .op_context(id.clone(), OperationKind::Create, Self::subgraph_of(current, id));
        let start_time = Instant::now();
        let result = configurator.create(&ctx, item.as_ref());

        if ctx.went_async() && result.is_ok() {
            self.coordinator.mark_in_progress(id.clone());
            log.push(OperationLogEntry {
                node: id.clone(),
                operation: OperationKind::Create,
                start_time,
                end_time: None,
                in_progress: true,
                err: None,
            });
            debug!(node = %id, "create continued in background");
            return;
        }

        self.finish_sync_call(current, id, OperationKind::Create, start_time, result, log, errors);
    }

    fn do_modify(
        &self,
        current: &Graph,
        intended: &Graph,
        id: &NodeId,
        log: &mut Vec<OperationLogEntry>,
        errors: &mut Vec<OperationError>,
    ) {
        let new_item = intended.item_handle(id).expect("id came from intended");
        let old_item = current.item_handle(id);
        let item_type = id.item_type().to_owned();

        if new_item.external() {
            current.put_node_shared(new_item);
            current.set_node_status(id, NodeState::Created, None, None);
            return;
        }

        let Some(configurator) = self.registry.get(&item_type) else {
            errors.push(OperationError {
                node: id.clone(),
                operation: OperationKind::Modify,
                source: Box::new(StructuralError::UnregisteredConfigurator { item_type }),
            });
            return;
        };

        current.set_node_status(id, NodeState::Modifying, Some(OperationKind::Modify), None);
        let ctx = self
            .coordinator
            .op_context(id.clone(), OperationKind::Modify, Self::subgraph_of(current, id));
        let start_time = Instant::now();
        let old_ref = old_item.as_deref();
        let result = match old_ref {
            Some(old) => configurator.modify(&ctx, old, new_item.as_ref()),
            None => configurator.create(&ctx, new_item.as_ref()),
        };
        current.put_node_shared(new_item);

        if ctx.went_async() && result.is_ok() {
            self.coordinator.mark_in_progress(id.clone());
            log.push(OperationLogEntry {
                node: id.clone(),
                operation: OperationKind::Modify,
                start_time,
                end_time: None,
                in_progress: true,
                err: None,
            });
            debug!(node = %id, "modify continued in background");
            return;
        }

        self.finish_sync_call(current, id, OperationKind::Modify, start_time, result, log, errors);
    }

    fn finish_sync_call(
        &self,
        current: &Graph,
        id: &NodeId,
        operation: OperationKind,
        start_time: Instant,
        result: Result<(), Box<dyn std::error::Error + Send + Sync>>,
        log: &mut Vec<OperationLogEntry>,
        errors: &mut Vec<OperationError>,
    ) {
        match result {
            Ok(()) => {
                debug!(node = %id, %operation, "operation completed");
                current.set_node_status(id, NodeState::Created, Some(operation), None);
                log.push(OperationLogEntry {
                    node: id.clone(),
                    operation,
                    start_time,
                    end_time: Some(Instant::now()),
                    in_progress: false,
                    err: None,
                });
            }
            Err(source) => {
                let message = source.to_string();
                error!(node = %id, %operation, error = %message, "operation failed");
                current.set_node_status(
                    id,
                    NodeState::Failure,
                    Some(operation),
                    Some(message.clone()),
                );
                log.push(OperationLogEntry {
                    node: id.clone(),
                    operation,
                    start_time,
                    end_time: Some(Instant::now()),
                    in_progress: false,
                    err: Some(message),
                });
                errors.push(OperationError {
                    node: id.clone(),
                    operation,
                    source,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Dependency, Item};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone)]
    struct Thing {
        name: String,
        attr: u32,
        dep: Option<NodeId>,
    }

    impl Item for Thing {
        fn item_type(&self) -> &str {
            "thing"
        }
        fn name(&self) -> &str {
            &self.name
        }
        fn equal(&self, other: &dyn Item) -> bool {
            let other = other.as_any().downcast_ref::<Thing>().unwrap();
            self.attr == other.attr
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

    fn thing(name: &str, attr: u32) -> Box<dyn Item> {
        Box::new(Thing {
            name: name.to_owned(),
            attr,
            dep: None,
        })
    }

    fn thing_dep(name: &str, attr: u32, dep: &str) -> Box<dyn Item> {
        Box::new(Thing {
            name: name.to_owned(),
            attr,
            dep: Some(NodeId::new("thing", dep)),
        })
    }

    #[derive(Default)]
    struct Recording {
        calls: RefCell<Vec<String>>,
    }

    struct RecordingConfigurator(Rc<Recording>);

    impl crate::registry::Configurator for RecordingConfigurator {
        fn create(
            &self,
            _ctx: &crate::async_coord::OpContext,
            item: &dyn Item,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.0.calls.borrow_mut().push(format!("create:{}", item.name()));
            Ok(())
        }
        fn modify(
            &self,
            _ctx: &crate::async_coord::OpContext,
            _old: &dyn Item,
            new: &dyn Item,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.0.calls.borrow_mut().push(format!("modify:{}", new.name()));
            Ok(())
        }
        fn delete(
            &self,
            _ctx: &crate::async_coord::OpContext,
            item: &dyn Item,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.0.calls.borrow_mut().push(format!("delete:{}", item.name()));
            Ok(())
        }
        fn needs_recreate(&self, _old: &dyn Item, _new: &dyn Item) -> bool {
            false
        }
    }

    fn reconciler_with(recording: &Rc<Recording>) -> Reconciler {
        let mut registry = Registry::new();
        registry
            .register("thing", Box::new(RecordingConfigurator(Rc::clone(recording))))
            .unwrap();
        Reconciler::new(registry, ReconcileConfig::default())
    }

    #[test]
    fn s1_three_independent_creates() {
        let recording = Rc::new(Recording::default());
        let reconciler = reconciler_with(&recording);

        let current = Graph::empty("current");
        let intended = Graph::empty("intended");
        intended.put_node(thing("a", 1)).unwrap();
        intended.put_node(thing("b", 1)).unwrap();
        intended.put_node(thing("c", 1)).unwrap();

        let status = reconciler.reconcile(&current, &intended);
        assert!(status.err.is_none());
        assert_eq!(
            *recording.calls.borrow(),
            vec!["create:a".to_owned(), "create:b".to_owned(), "create:c".to_owned()]
        );
    }

    #[test]
    fn s2_dependency_created_before_dependent() {
        let recording = Rc::new(Recording::default());
        let reconciler = reconciler_with(&recording);

        let current = Graph::empty("current");
        let intended = Graph::empty("intended");
        intended.put_node(thing("c", 1)).unwrap();
        intended.put_node(thing_dep("a", 1, "c")).unwrap();
        intended.put_node(thing_dep("b", 1, "c")).unwrap();

        let status = reconciler.reconcile(&current, &intended);
        assert!(status.err.is_none());
        let calls = recording.calls.borrow();
        let c_idx = calls.iter().position(|c| c == "create:c").unwrap();
        let a_idx = calls.iter().position(|c| c == "create:a").unwrap();
        let b_idx = calls.iter().position(|c| c == "create:b").unwrap();
        assert!(c_idx < a_idx);
        assert!(c_idx < b_idx);
    }

    #[test]
    fn s4_delete_cascades_before_dependency_removed() {
        let recording = Rc::new(Recording::default());
        let reconciler = reconciler_with(&recording);

        let current = Graph::empty("current");
        current.put_node(thing("c", 1)).unwrap();
        current.put_node(thing_dep("a", 1, "c")).unwrap();
        current.put_node(thing_dep("b", 1, "c")).unwrap();

        let intended = Graph::empty("intended");
        intended.put_node(thing_dep("a", 1, "c")).unwrap();
        intended.put_node(thing_dep("b", 1, "c")).unwrap();

        let status = reconciler.reconcile(&current, &intended);
        assert!(status.err.is_none());
        let calls = recording.calls.borrow();
        let c_idx = calls.iter().position(|c| c == "delete:c").unwrap();
        let a_idx = calls.iter().position(|c| c == "delete:a").unwrap();
        let b_idx = calls.iter().position(|c| c == "delete:b").unwrap();
        assert!(a_idx < c_idx);
        assert!(b_idx < c_idx);

        assert_eq!(
            current.node(&NodeId::new("thing", "a")).unwrap().state(),
            NodeState::Pending
        );
        assert!(current.node(&NodeId::new("thing", "c")).is_none());
    }

    #[test]
    fn idempotent_second_pass_performs_no_operations() {
        let recording = Rc::new(Recording::default());
        let reconciler = reconciler_with(&recording);

        let current = Graph::empty("current");
        let intended = Graph::empty("intended");
        intended.put_node(thing("a", 1)).unwrap();

        reconciler.reconcile(&current, &intended);
        recording.calls.borrow_mut().clear();
        let status = reconciler.reconcile(&current, &intended);
        assert!(status.err.is_none());
        assert!(recording.calls.borrow().is_empty());
    }

    #[test]
    fn cycle_refuses_to_operate() {
        let recording = Rc::new(Recording::default());
        let reconciler = reconciler_with(&recording);

        let current = Graph::empty("current");
        let intended = Graph::empty("intended");
        intended.put_node(thing_dep("a", 1, "b")).unwrap();
        intended.put_node(thing_dep("b", 1, "a")).unwrap();

        let status = reconciler.reconcile(&current, &intended);
        assert!(status.err.is_some());
        assert!(recording.calls.borrow().is_empty());
    }

    #[test]
    fn failure_target_is_treated_as_unsatisfied() {
        let recording = Rc::new(Recording::default());
        let reconciler = reconciler_with(&recording);

        let current = Graph::empty("current");
        current.put_node(thing("c", 1)).unwrap();
        current.set_node_status(&NodeId::new("thing", "c"), NodeState::Failure, None, None);

        let intended = Graph::empty("intended");
        intended.put_node(thing("c", 1)).unwrap();
        intended.put_node(thing_dep("a", 1, "c")).unwrap();

        let status = reconciler.reconcile(&current, &intended);
        assert!(status.err.is_none());
        assert_eq!(
            current.node(&NodeId::new("thing", "a")).unwrap().state(),
            NodeState::Pending
        );
        assert!(!recording
            .calls
            .borrow()
            .iter()
            .any(|call| call == "create:a"));
    }

    #[test]
    fn fail_fast_short_circuits_remaining_pass2_work() {
        struct FlakyConfigurator;
        impl crate::registry::Configurator for FlakyConfigurator {
            fn create(
                &self,
                _ctx: &crate::async_coord::OpContext,
                item: &dyn Item,
            ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
                if item.name() == "bad" {
                    Err("boom".into())
                } else {
                    Ok(())
                }
            }
            fn modify(
                &self,
                _ctx: &crate::async_coord::OpContext,
                _old: &dyn Item,
                _new: &dyn Item,
            ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
                Ok(())
            }
            fn delete(
                &self,
                _ctx: &crate::async_coord::OpContext,
                _item: &dyn Item,
            ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
                Ok(())
            }
            fn needs_recreate(&self, _old: &dyn Item, _new: &dyn Item) -> bool {
                false
            }
        }

        let mut registry = Registry::new();
        registry.register("thing", Box::new(FlakyConfigurator)).unwrap();
        let reconciler = Reconciler::new(
            registry,
            ReconcileConfig {
                fail_fast: true,
                ..ReconcileConfig::default()
            },
        );

        let current = Graph::empty("current");
        let intended = Graph::empty("intended");
        // "bad" sorts before "zzz" so it is scheduled first.
        intended.put_node(thing("bad", 1)).unwrap();
        intended.put_node(thing("zzz", 1)).unwrap();

        let status = reconciler.reconcile(&current, &intended);
        assert!(status.err.is_some());
        assert_eq!(
            current.node(&NodeId::new("thing", "bad")).unwrap().state(),
            NodeState::Failure
        );
        assert!(current.node(&NodeId::new("thing", "zzz")).is_none());
    }
}
