//! Configurator registry (component D): maps an item type to the handler
//! that knows how to create, modify, and delete items of that type.

use std::collections::HashMap;

use crate::error::{ReconcileError, StructuralError};
use crate::item::Item;

/// Caller-provided handler for one item type.
///
/// `Create`/`Modify`/`Delete` are synchronous: a configurator that needs to
/// do long-running work calls [`crate::async_coord::OpContext::continue_in_background`]
/// on the context it is given and returns quickly, leaving the actual work
/// running on a task it spawns itself. The engine never spawns work on a
/// configurator's behalf.
pub trait Configurator {
    /// Brings `item` into existence in the managed system.
    fn create(
        &self,
        ctx: &crate::async_coord::OpContext,
        item: &dyn Item,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Transforms `old` into `new` in place.
    fn modify(
        &self,
        ctx: &crate::async_coord::OpContext,
        old: &dyn Item,
        new: &dyn Item,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Removes `item` from the managed system.
    fn delete(
        &self,
        ctx: &crate::async_coord::OpContext,
        item: &dyn Item,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// `true` iff transforming `old` into `new` cannot be done by `modify`
    /// and must instead be a delete-then-create.
    fn needs_recreate(&self, old: &dyn Item, new: &dyn Item) -> bool;
}

/// `item_type -> configurator`, populated once at startup.
#[derive(Default)]
pub struct Registry {
    configurators: HashMap<String, Box<dyn Configurator>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `configurator` for `item_type`. Errors if one is already
    /// registered for that type.
    pub fn register(
        &mut self,
        item_type: impl Into<String>,
        configurator: Box<dyn Configurator>,
    ) -> Result<(), ReconcileError> {
        let item_type = item_type.into();
        if self.configurators.contains_key(&item_type) {
            return Err(StructuralError::DuplicateConfigurator { item_type }.into());
        }
        self.configurators.insert(item_type, configurator);
        Ok(())
    }

    /// Looks up the configurator for `item_type`. `None` for external items
    /// and for unregistered types; the reconciler treats an unregistered
    /// non-external item as a configuration error.
    pub fn get(&self, item_type: &str) -> Option<&dyn Configurator> {
        self.configurators.get(item_type).map(AsRef::as_ref)
    }
}
