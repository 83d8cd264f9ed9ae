//! The caller-facing contract every managed object must implement, plus the
//! [`NodeId`] and [`Dependency`] types derived from it.
//!
//! Items are opaque to the rest of the crate except through [`Item`]: the
//! graph and reconciler never downcast to a concrete type, so all dispatch on
//! item *kind* happens through the [`crate::registry::Registry`] keyed by
//! [`Item::item_type`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A caller-defined stateful object tracked by one graph node.
///
/// The engine only ever calls the methods below; it never needs anything
/// else about a concrete item. A [`crate::registry::Configurator`] typically
/// needs more (the actual file contents, the actual route, ...), so it
/// recovers the concrete type from [`Item::as_any`] — the usual
/// type-erasure-plus-downcast shape for an object-safe trait whose
/// implementors form an open set.
pub trait Item: fmt::Debug + Any {
    /// Non-empty string that partitions items by configurator. Must not
    /// contain `/`.
    fn item_type(&self) -> &str;

    /// String, unique within [`Item::item_type`]. Must not contain `/`.
    fn name(&self) -> &str;

    /// Optional human-readable alternative to `name` used only by the DOT
    /// renderer.
    fn label(&self) -> Option<&str> {
        None
    }

    /// `true` means this item is not managed by the engine: no configurator
    /// is ever consulted for it, it is only observed. External items must
    /// report an empty [`Item::dependencies`] list.
    fn external(&self) -> bool {
        false
    }

    /// `true` iff transforming `self` into `other` requires no `Modify` call.
    /// Only ever called for two items sharing the same [`NodeId`].
    ///
    /// This must be caller-defined: the engine never falls back to
    /// structural/derived equality, since "equal enough to skip a Modify" is
    /// a domain decision the graph cannot make on its behalf.
    fn equal(&self, other: &dyn Item) -> bool;

    /// Ordered list of requirements. Must be empty when [`Item::external`] is
    /// `true`.
    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    /// Recovers `&dyn Any` so a configurator can `downcast_ref` back to its
    /// own concrete item type. Implementations are always `self`.
    fn as_any(&self) -> &dyn Any;
}

/// The unique key of a node inside a graph: `type + "/" + name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    item_type: Arc<str>,
    name: Arc<str>,
}

impl NodeId {
    pub fn new(item_type: impl Into<Arc<str>>, name: impl Into<Arc<str>>) -> Self {
        Self {
            item_type: item_type.into(),
            name: name.into(),
        }
    }

    pub fn for_item(item: &dyn Item) -> Self {
        Self::new(item.item_type(), item.name())
    }

    pub fn item_type(&self) -> &str {
        &self.item_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.item_type, self.name)
    }
}

/// Checks the two structural constraints every item's `type` and `name` must
/// satisfy: non-empty, and free of the `/` separator used by [`NodeId`].
pub(crate) fn validate_identity_component(kind: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("item {kind} must not be empty"));
    }
    if value.contains('/') {
        return Err(format!("item {kind} {value:?} must not contain '/'"));
    }
    Ok(())
}

/// A declaration that a node requires another item to exist.
#[derive(Clone)]
pub struct Dependency {
    /// The edge target: the `(type, name)` of the item this dependency needs.
    pub required: NodeId,
    /// Further qualifies when the dependency counts as satisfied, beyond mere
    /// existence of the required item. Absent means existence suffices.
    pub must_satisfy: Option<Arc<dyn Fn(&dyn Item) -> bool + Send + Sync>>,
    /// If true, modifying the required item forces this (the dependent) item
    /// to be recreated.
    pub recreate_when_modified: bool,
    /// If true *and* the required item is external, disappearance of that
    /// external item is assumed to have already removed this item in the
    /// managed system; the engine marks this item Pending without issuing a
    /// `Delete`.
    pub auto_deleted_by_external: bool,
}

impl Dependency {
    /// A plain existence dependency: satisfied as soon as the required item
    /// is present and not `Pending`/`Failure`.
    pub fn requires(required: NodeId) -> Self {
        Self {
            required,
            must_satisfy: None,
            recreate_when_modified: false,
            auto_deleted_by_external: false,
        }
    }

    pub fn with_must_satisfy(
        mut self,
        predicate: impl Fn(&dyn Item) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.must_satisfy = Some(Arc::new(predicate));
        self
    }

    pub fn recreate_when_modified(mut self) -> Self {
        self.recreate_when_modified = true;
        self
    }

    pub fn auto_deleted_by_external(mut self) -> Self {
        self.auto_deleted_by_external = true;
        self
    }

    pub(crate) fn check_satisfies(&self, target: &dyn Item) -> bool {
        match &self.must_satisfy {
            Some(predicate) => predicate(target),
            None => true,
        }
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("required", &self.required)
            .field("must_satisfy", &self.must_satisfy.is_some())
            .field("recreate_when_modified", &self.recreate_when_modified)
            .field("auto_deleted_by_external", &self.auto_deleted_by_external)
            .finish()
    }
}
