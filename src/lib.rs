//! A state reconciliation engine for configuration-management agents: an
//! in-memory dependency graph of caller-defined [`item::Item`]s plus a
//! stateless [`reconcile::Reconciler`] that drives a current-state
//! [`graph::Graph`] toward an intended-state one, dispatching to pluggable
//! per-type [`registry::Configurator`]s and tolerating configurators that
//! hand long-running work off to the background.
//!
//! The crate is organized the way its lineage organizes a query/plan graph:
//! a storage layer ([`graph`]) separated from its read-only query surface,
//! a registry of caller-supplied behavior ([`registry`]), a pure diff step
//! ([`diff`]), the driver that turns a diff into ordered configurator calls
//! ([`reconcile`]), and the bookkeeping for operations that go async
//! ([`async_coord`]). [`dot`] is a side-effect-free renderer over the same
//! storage layer, kept in-crate because it needs nothing external.

pub mod async_coord;
pub mod config;
pub mod diff;
pub mod dot;
pub mod error;
pub mod graph;
pub mod item;
pub mod reconcile;
pub mod registry;

pub use config::ReconcileConfig;
pub use error::{OperationError, OperationKind, ReconcileError, StructuralError};
pub use graph::{Edge, Graph, GraphSpec, Node, NodeState, PrivateData, ReadGraph, SubgraphSpec};
pub use item::{Dependency, Item, NodeId};
pub use reconcile::{OperationLogEntry, Reconciler, Status};
pub use registry::{Configurator, Registry};
