//! Host runtime boundary: the binding table the tracker unloads from

use crate::model::{is_within, EntityId, EntityInfo, EntityKind};
use anyhow::{bail, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// The host's table of live named definitions.
///
/// The tracker never executes source itself. It asks the runtime what a name
/// is currently bound to and tells it to drop bindings.
pub trait Runtime: Send {
    /// The entity currently bound to `name`, if any.
    fn resolve(&self, name: &str) -> Option<EntityInfo>;

    /// Drop the binding for `name`. Names nested below it go with it.
    fn unbind(&mut self, name: &str) -> Result<()>;

    /// Every live entity, including anonymous ones. Used for cold snapshots.
    fn live_entities(&self) -> Vec<EntityInfo>;
}

/// Lets the host keep a handle on a runtime it also hands to the tracker.
impl<R: Runtime> Runtime for Arc<Mutex<R>> {
    fn resolve(&self, name: &str) -> Option<EntityInfo> {
        self.lock().resolve(name)
    }

    fn unbind(&mut self, name: &str) -> Result<()> {
        self.lock().unbind(name)
    }

    fn live_entities(&self) -> Vec<EntityInfo> {
        self.lock().live_entities()
    }
}

/// Called once per entity right before its name is unbound.
///
/// Implementations purge caches keyed by the entity's identity. They run with
/// the graph lock held and must finish their work before returning.
pub trait RemovalListener: Send {
    fn will_remove(&mut self, name: &str, entity: &EntityInfo) -> Result<()>;
}

impl<F> RemovalListener for F
where
    F: FnMut(&str, &EntityInfo) -> Result<()> + Send,
{
    fn will_remove(&mut self, name: &str, entity: &EntityInfo) -> Result<()> {
        self(name, entity)
    }
}

/// In-memory binding table.
///
/// Backs the CLI dry run and lets embedders without a real interpreter drive
/// the tracker. Every `define_*` call mints a fresh identity.
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    next_id: u64,
    bindings: BTreeMap<String, EntityInfo>,
    anonymous: HashMap<EntityId, EntityInfo>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for sharing with a tracker.
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::new()))
    }

    fn mint(&mut self) -> EntityId {
        self.next_id += 1;
        EntityId(self.next_id)
    }

    /// Bind `name` to a new class, optionally subclassing the entity bound to `superclass`.
    pub fn define_class(&mut self, name: &str, superclass: Option<&str>) -> Result<EntityInfo> {
        let mut info = EntityInfo::new(self.mint(), name, EntityKind::Class);
        if let Some(parent) = superclass {
            let Some(parent) = self.bindings.get(parent) else {
                bail!("superclass `{parent}` of `{name}` is not defined");
            };
            info.superclass = Some(parent.id);
        }
        self.bindings.insert(name.to_string(), info.clone());
        Ok(info)
    }

    /// Bind `name` to a new class whose superclass is an existing entity (possibly anonymous).
    pub fn define_subclass_of(&mut self, name: &str, superclass: EntityId) -> EntityInfo {
        let info = EntityInfo::new(self.mint(), name, EntityKind::Class).with_superclass(superclass);
        self.bindings.insert(name.to_string(), info.clone());
        info
    }

    pub fn define_module(&mut self, name: &str) -> EntityInfo {
        let info = EntityInfo::new(self.mint(), name, EntityKind::Module);
        self.bindings.insert(name.to_string(), info.clone());
        info
    }

    pub fn define_value(&mut self, name: &str) -> EntityInfo {
        let info = EntityInfo::new(self.mint(), name, EntityKind::Value);
        self.bindings.insert(name.to_string(), info.clone());
        info
    }

    /// Create an unnamed class, as produced by `Class.new(Base)`-style definitions.
    pub fn define_anonymous_class(&mut self, superclass: Option<EntityId>) -> EntityInfo {
        let mut info = EntityInfo::anonymous(self.mint(), EntityKind::Class);
        info.superclass = superclass;
        self.anonymous.insert(info.id, info.clone());
        info
    }

    /// Mix the module bound to `mixin` into the entity bound to `target`.
    pub fn include(&mut self, target: &str, mixin: &str) -> Result<EntityInfo> {
        let Some(mixin_id) = self.bindings.get(mixin).map(|m| m.id) else {
            bail!("mixin `{mixin}` is not defined");
        };
        let Some(entity) = self.bindings.get_mut(target) else {
            bail!("cannot include `{mixin}` into undefined `{target}`");
        };
        if !entity.mixins.contains(&mixin_id) {
            entity.mixins.push(mixin_id);
        }
        Ok(entity.clone())
    }

    pub fn id_of(&self, name: &str) -> Option<EntityId> {
        self.bindings.get(name).map(|info| info.id)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Bound names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }
}

impl Runtime for MemoryRuntime {
    fn resolve(&self, name: &str) -> Option<EntityInfo> {
        self.bindings.get(name).cloned()
    }

    fn unbind(&mut self, name: &str) -> Result<()> {
        self.bindings.retain(|bound, _| !is_within(name, bound));
        Ok(())
    }

    fn live_entities(&self) -> Vec<EntityInfo> {
        self.bindings
            .values()
            .chain(self.anonymous.values())
            .cloned()
            .collect()
    }
}
