//! Core data structures shared by the tracker and its hosts

use serde::{Deserialize, Serialize};

/// Separator between namespace segments of a qualified symbol name.
pub const NAMESPACE_SEPARATOR: &str = "::";

/// Identity of a live entity as handed out by the host runtime.
///
/// Two definitions of the same name produce different ids, so comparing ids is
/// how "identity preserved" is checked after an unload pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct EntityId(pub u64);

/// Discriminates what kind of definition a symbol is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Can be subclassed; other entities may name it as their superclass.
    Class,
    /// Can be mixed into other entities.
    Module,
    /// Plain bound value (constant, function, ...). Nothing can depend on its identity.
    Value,
}

impl EntityKind {
    /// Whether other code can hold a structural dependency on an entity of this kind.
    pub fn is_namespace(self) -> bool {
        !matches!(self, EntityKind::Value)
    }
}

/// How one entity in the module cache relates to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Relation {
    /// Source names target as its direct superclass.
    Inherits,
    /// Source has target in its ancestor chain through a mixin.
    Includes,
}

/// A live definition as described by the host runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub id: EntityId,
    /// Qualified name the entity is bound under. `None` for anonymous entities.
    pub name: Option<String>,
    pub kind: EntityKind,
    /// Direct superclass, which may itself be anonymous.
    pub superclass: Option<EntityId>,
    /// Modules mixed into this entity (include / extend).
    pub mixins: Vec<EntityId>,
}

impl EntityInfo {
    pub fn new(id: EntityId, name: impl Into<String>, kind: EntityKind) -> Self {
        EntityInfo {
            id,
            name: Some(name.into()),
            kind,
            superclass: None,
            mixins: Vec::new(),
        }
    }

    pub fn anonymous(id: EntityId, kind: EntityKind) -> Self {
        EntityInfo {
            id,
            name: None,
            kind,
            superclass: None,
            mixins: Vec::new(),
        }
    }

    pub fn with_superclass(mut self, superclass: EntityId) -> Self {
        self.superclass = Some(superclass);
        self
    }

    pub fn with_mixin(mut self, mixin: EntityId) -> Self {
        if !self.mixins.contains(&mixin) {
            self.mixins.push(mixin);
        }
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.as_deref().map_or(true, str::is_empty)
    }

    /// Outgoing relations of this entity, superclass first.
    pub fn relations(&self) -> impl Iterator<Item = (EntityId, Relation)> + '_ {
        self.superclass
            .map(|id| (id, Relation::Inherits))
            .into_iter()
            .chain(self.mixins.iter().map(|&id| (id, Relation::Includes)))
    }
}

/// Enclosing namespace of a qualified name: `A::B` for `A::B::C`.
pub fn parent_name(name: &str) -> Option<&str> {
    name.rfind(NAMESPACE_SEPARATOR).map(|idx| &name[..idx])
}

/// Every enclosing namespace of `name`, nearest first.
pub fn parent_names(name: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(parent_name(name), |current| parent_name(current))
}

/// Whether `candidate` is nested exactly one level below `parent`.
pub fn is_direct_child(parent: &str, candidate: &str) -> bool {
    candidate
        .strip_prefix(parent)
        .and_then(|rest| rest.strip_prefix(NAMESPACE_SEPARATOR))
        .map_or(false, |leaf| !leaf.is_empty() && !leaf.contains(NAMESPACE_SEPARATOR))
}

/// Whether `candidate` is `namespace` itself or lives anywhere below it.
pub fn is_within(namespace: &str, candidate: &str) -> bool {
    candidate == namespace
        || candidate
            .strip_prefix(namespace)
            .map_or(false, |rest| rest.starts_with(NAMESPACE_SEPARATOR))
}
