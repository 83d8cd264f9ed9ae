//! Error taxonomy.
//!
//! Mirrors the dual-level split the rest of the ecosystem uses for graph
//! errors: a single-cause [`StructuralError`]/[`OperationError`] pair, and the
//! top-level [`ReconcileError`] that wraps either, or an aggregate of
//! [`OperationError`]s from one reconcile pass.

use std::fmt;

use crate::item::NodeId;

/// The crate-wide error type returned by fallible public APIs.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ReconcileError {
    /// A programmer-facing misuse of the API: cycle found at reconcile time,
    /// duplicate configurator registration, an unresolvable subgraph path, or
    /// a malformed item identity.
    #[error(transparent)]
    Structural(#[from] StructuralError),

    /// A single configurator call failed.
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// More than one configurator call failed during the same pass.
    #[error("{} operation(s) failed during reconciliation", .0.len())]
    Aggregate(Vec<OperationError>),
}

impl ReconcileError {
    /// Folds a non-empty list of per-node operation errors into a
    /// [`ReconcileError`], matching `Status.err` being "the
    /// concatenation/first of such errors".
    pub fn from_operation_errors(mut errors: Vec<OperationError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => Some(ReconcileError::Operation(errors.remove(0))),
            _ => Some(ReconcileError::Aggregate(errors)),
        }
    }
}

/// Structural / programmer errors: the engine refuses to perform work rather
/// than guess at a recovery.
#[derive(Debug, thiserror::Error)]
pub enum StructuralError {
    #[error("dependency cycle detected: {}", format_cycle(.path))]
    CycleDetected { path: Vec<NodeId> },

    #[error("a configurator is already registered for item type {item_type:?}")]
    DuplicateConfigurator { item_type: String },

    #[error("handle does not belong to this graph tree")]
    ForeignGraphHandle,

    #[error("invalid item: {reason}")]
    InvalidItem { reason: String },

    #[error("no subgraph at path {path:?}")]
    UnknownSubgraph { path: String },

    #[error("no configurator registered for item type {item_type:?}")]
    UnregisteredConfigurator { item_type: String },
}

fn format_cycle(path: &[NodeId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// What kind of configurator call was being made when an [`OperationError`]
/// was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "PascalCase")]
pub enum OperationKind {
    Create,
    Modify,
    Delete,
}

/// A single failed (or cancelled) configurator call, recorded on the node and
/// in the operation log.
#[derive(Debug)]
pub struct OperationError {
    pub node: NodeId,
    pub operation: OperationKind,
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed for node {}: {}",
            self.operation, self.node, self.source
        )
    }
}

impl std::error::Error for OperationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}
