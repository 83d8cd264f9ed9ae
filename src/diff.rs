//! Diff computation (component E): classifies every node id present in
//! `current` or `intended` as Create/Modify/Delete/Recreate/Noop, then
//! cascades Recreate across `recreate_when_modified` edges in `intended`
//! until the classification stabilizes.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ReconcileError;
use crate::graph::Graph;
use crate::item::NodeId;
use crate::registry::Registry;

/// One node's classification for this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "PascalCase")]
pub enum DiffOp {
    Create,
    Modify,
    Delete,
    Recreate,
    Noop,
}

/// Computes the per-node diff over the union of `current` and `intended`
/// node ids, in deterministic `NodeId` order.
pub(crate) fn diff(
    current: &Graph,
    intended: &Graph,
    registry: &Registry,
) -> Result<BTreeMap<NodeId, DiffOp>, ReconcileError> {
    let mut ids: BTreeSet<NodeId> = current.nodes(true).into_iter().collect();
    ids.extend(intended.nodes(true));

    let mut ops = BTreeMap::new();
    for id in &ids {
        let current_node = current.node(id);
        let intended_node = intended.node(id);
        let op = match (&current_node, &intended_node) {
            (None, Some(_)) => DiffOp::Create,
            (Some(_), None) => DiffOp::Delete,
            (Some(cur), Some(int)) => {
                if cur.item().equal(int.item()) {
                    DiffOp::Noop
                } else {
                    let needs_recreate = registry
                        .get(id.item_type())
                        .map(|configurator| configurator.needs_recreate(cur.item(), int.item()))
                        .unwrap_or(false);
                    if needs_recreate {
                        DiffOp::Recreate
                    } else {
                        DiffOp::Modify
                    }
                }
            }
            (None, None) => unreachable!("id is drawn from current's or intended's own node list"),
        };
        ops.insert(id.clone(), op);
    }

    cascade_recreate(intended, &mut ops);
    Ok(ops)
}

/// Promotes any `Noop`/`Modify` node that requires a recreating node via a
/// `recreate_when_modified` dependency to `Recreate`, over `intended`'s
/// outgoing edges, to a fixed point. Grounded on the resolved design
/// decision that the cascade walks the intended graph's shape, since that is
/// what determines what will exist (and so must be recreated together) once
/// this pass completes.
fn cascade_recreate(intended: &Graph, ops: &mut BTreeMap<NodeId, DiffOp>) {
    loop {
        let recreating: BTreeSet<NodeId> = ops
            .iter()
            .filter(|(_, op)| **op == DiffOp::Recreate)
            .map(|(id, _)| id.clone())
            .collect();
        if recreating.is_empty() {
            break;
        }

        let mut changed = false;
        for id in intended.nodes(true) {
            let promotable = matches!(ops.get(&id), Some(DiffOp::Noop) | Some(DiffOp::Modify));
            if !promotable {
                continue;
            }
            let should_recreate = intended.outgoing_edges(&id).into_iter().any(|edge| {
                edge.dependency.recreate_when_modified && recreating.contains(edge.target())
            });
            if should_recreate {
                ops.insert(id.clone(), DiffOp::Recreate);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}
