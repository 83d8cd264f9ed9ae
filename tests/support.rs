//! Shared fixtures for the integration suite: a scripted `Thing` item and a
//! call-recording `Configurator`, used across scenarios instead of ad hoc
//! mocks in every test function (per the ambient test-tooling section).

use std::cell::RefCell;
use std::error::Error;
use std::rc::Rc;

use reconcile_graph::async_coord::OpContext;
use reconcile_graph::{Configurator, Dependency, Item, NodeId};

#[derive(Debug, Clone)]
pub struct Thing {
    pub name: String,
    pub attr: u32,
    pub deps: Vec<(NodeId, bool)>,
    pub auto_deleted_deps: Vec<NodeId>,
    pub external: bool,
}

impl Thing {
    pub fn new(name: &str, attr: u32) -> Self {
        Self {
            name: name.to_owned(),
            attr,
            deps: Vec::new(),
            auto_deleted_deps: Vec::new(),
            external: false,
        }
    }

    pub fn depends_on(mut self, target: NodeId, recreate_when_modified: bool) -> Self {
        self.deps.push((target, recreate_when_modified));
        self
    }

    /// Depend on `target` with `autoDeletedByExternal` set: if `target` is
    /// external and vanishes from the intended graph, this item is marked
    /// `Pending` without a `Delete` call.
    pub fn auto_deleted_by_external_dep(mut self, target: NodeId) -> Self {
        self.auto_deleted_deps.push(target);
        self
    }

    pub fn external(mut self) -> Self {
        self.external = true;
        self
    }

    pub fn boxed(self) -> Box<dyn Item> {
        Box::new(self)
    }
}

impl Item for Thing {
    fn item_type(&self) -> &str {
        "thing"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn external(&self) -> bool {
        self.external
    }

    fn equal(&self, other: &dyn Item) -> bool {
        let other = other.as_any().downcast_ref::<Thing>().expect("same NodeId implies same concrete type");
        self.attr == other.attr
    }

    fn dependencies(&self) -> Vec<Dependency> {
        self.deps
            .iter()
            .cloned()
            .map(|(target, recreate)| {
                let mut dep = Dependency::requires(target);
                if recreate {
                    dep = dep.recreate_when_modified();
                }
                dep
            })
            .chain(
                self.auto_deleted_deps
                    .iter()
                    .cloned()
                    .map(|target| Dependency::requires(target).auto_deleted_by_external()),
            )
            .collect()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// One recorded configurator call, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: &'static str,
    pub name: String,
}

#[derive(Default)]
pub struct Recording {
    pub calls: RefCell<Vec<Call>>,
}

impl Recording {
    pub fn names(&self, op: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.op == op)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn index_of(&self, op: &str, name: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .position(|c| c.op == op && c.name == name)
            .unwrap_or_else(|| panic!("no recorded {op} call for {name}"))
    }
}

/// A configurator whose behavior per item is driven entirely by the `Thing`
/// it's handed: records every call, and optionally defers the call to a
/// background task when the item's name is in `async_names`.
pub struct ScriptedConfigurator {
    pub recording: Rc<Recording>,
    pub needs_recreate: bool,
    pub async_names: Vec<String>,
}

impl ScriptedConfigurator {
    pub fn new(recording: &Rc<Recording>) -> Self {
        Self {
            recording: Rc::clone(recording),
            needs_recreate: false,
            async_names: Vec::new(),
        }
    }

    pub fn recreating(mut self) -> Self {
        self.needs_recreate = true;
        self
    }

    pub fn async_for(mut self, name: impl Into<String>) -> Self {
        self.async_names.push(name.into());
        self
    }
}

impl Configurator for ScriptedConfigurator {
    fn create(
        &self,
        ctx: &OpContext,
        item: &dyn Item,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.recording.calls.borrow_mut().push(Call {
            op: "create",
            name: item.name().to_owned(),
        });
        if self.async_names.iter().any(|n| n == item.name()) {
            let handle = ctx.continue_in_background();
            tokio::spawn(async move {
                handle.done(Ok(()));
            });
        }
        Ok(())
    }

    fn modify(
        &self,
        _ctx: &OpContext,
        _old: &dyn Item,
        new: &dyn Item,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.recording.calls.borrow_mut().push(Call {
            op: "modify",
            name: new.name().to_owned(),
        });
        Ok(())
    }

    fn delete(
        &self,
        _ctx: &OpContext,
        item: &dyn Item,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.recording.calls.borrow_mut().push(Call {
            op: "delete",
            name: item.name().to_owned(),
        });
        Ok(())
    }

    fn needs_recreate(&self, _old: &dyn Item, _new: &dyn Item) -> bool {
        self.needs_recreate
    }
}
