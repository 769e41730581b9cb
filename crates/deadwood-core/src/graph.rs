//! Module cache: a petgraph snapshot of live entities and how they relate

use crate::model::{EntityId, EntityInfo, EntityKind, Relation};
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

/// Live entities with `Inherits` / `Includes` edges pointing from an entity to
/// its superclass and mixins.
///
/// Maintained incrementally from definition events. When the graph's epoch
/// moves past `synced_epoch`, the cache no longer reflects the host and must be
/// rebuilt from a full snapshot before dependents can be computed.
pub struct ModuleCache {
    inner: StableDiGraph<EntityInfo, Relation>,
    index: HashMap<EntityId, NodeIndex>,
    /// Relations recorded before their target entity was registered.
    pending: HashMap<EntityId, Vec<(NodeIndex, Relation)>>,
    synced_epoch: Option<u64>,
}

impl std::fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCache")
            .field("entity_count", &self.inner.node_count())
            .field("relation_count", &self.inner.edge_count())
            .field("synced_epoch", &self.synced_epoch)
            .finish()
    }
}

impl ModuleCache {
    pub fn new() -> Self {
        ModuleCache {
            inner: StableDiGraph::new(),
            index: HashMap::new(),
            pending: HashMap::new(),
            synced_epoch: None,
        }
    }

    /// Whether the cache reflects the host as of `epoch`.
    pub fn is_synced(&self, epoch: u64) -> bool {
        self.synced_epoch == Some(epoch)
    }

    /// Whether incremental updates are being applied at all.
    pub fn is_built(&self) -> bool {
        self.synced_epoch.is_some()
    }

    /// Replace the contents with a fresh snapshot, keeping only entities accepted by `keep`.
    pub fn rebuild<I, F>(&mut self, entities: I, epoch: u64, keep: F)
    where
        I: IntoIterator<Item = EntityInfo>,
        F: Fn(&EntityInfo) -> bool,
    {
        self.clear();
        let kept: Vec<EntityInfo> = entities.into_iter().filter(|info| keep(info)).collect();
        for info in &kept {
            let idx = self.inner.add_node(info.clone());
            self.index.insert(info.id, idx);
        }
        for info in &kept {
            self.connect(info);
        }
        self.synced_epoch = Some(epoch);
    }

    /// Add or refresh one entity.
    pub fn insert(&mut self, info: EntityInfo) {
        if let Some(&idx) = self.index.get(&info.id) {
            let outgoing: Vec<_> = self
                .inner
                .edges_directed(idx, Direction::Outgoing)
                .map(|edge| edge.id())
                .collect();
            for edge in outgoing {
                self.inner.remove_edge(edge);
            }
            if let Some(weight) = self.inner.node_weight_mut(idx) {
                *weight = info.clone();
            }
        } else {
            let idx = self.inner.add_node(info.clone());
            self.index.insert(info.id, idx);
            self.attach_waiting(info.id, idx);
        }
        self.connect(&info);
    }

    fn connect(&mut self, info: &EntityInfo) {
        let Some(&source) = self.index.get(&info.id) else {
            return;
        };
        for (target, relation) in info.relations() {
            match self.index.get(&target) {
                Some(&target) => {
                    self.inner.add_edge(source, target, relation);
                }
                None => self.pending.entry(target).or_default().push((source, relation)),
            }
        }
    }

    /// Connect entities that were registered before `id`, the one they point at.
    fn attach_waiting(&mut self, id: EntityId, target: NodeIndex) {
        let Some(waiting) = self.pending.remove(&id) else {
            return;
        };
        for (source, relation) in waiting {
            // the source may have been removed or refreshed since
            let still_points = self
                .inner
                .node_weight(source)
                .map_or(false, |info| info.relations().any(|r| r == (id, relation)));
            if still_points && self.inner.find_edge(source, target).is_none() {
                self.inner.add_edge(source, target, relation);
            }
        }
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityInfo> {
        self.index.get(&id).and_then(|&idx| self.inner.node_weight(idx))
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    /// Remove an entity and all of its relations.
    pub fn remove(&mut self, id: EntityId) -> Option<EntityInfo> {
        let idx = self.index.remove(&id)?;
        self.inner.remove_node(idx)
    }

    /// Named entities whose definition depends on the identity of `id`.
    ///
    /// For a class: entities whose nearest named superclass is that class
    /// (anonymous intermediate classes are looked through). For a module:
    /// every entity with the module anywhere in its ancestor chain.
    pub fn dependents(&self, id: EntityId) -> Vec<EntityInfo> {
        let Some(&start) = self.index.get(&id) else {
            return Vec::new();
        };
        let mut found = match self.inner[start].kind {
            EntityKind::Value => Vec::new(),
            EntityKind::Class => self.walk_incoming(
                start,
                |_, source| source.is_anonymous(),
                |relation| relation == Relation::Inherits,
            ),
            EntityKind::Module => self.walk_incoming(start, |_, _| true, |_| true),
        };
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    /// Walk incoming edges from `start`, collecting named sources reached
    /// through accepted relations and continuing past sources `descend` allows.
    fn walk_incoming<D, A>(&self, start: NodeIndex, descend: D, accept: A) -> Vec<EntityInfo>
    where
        D: Fn(Relation, &EntityInfo) -> bool,
        A: Fn(Relation) -> bool,
    {
        let mut found = Vec::new();
        let mut visited = HashSet::from([start]);
        let mut stack = vec![start];

        while let Some(current) = stack.pop() {
            for edge in self.inner.edges_directed(current, Direction::Incoming) {
                let relation = *edge.weight();
                if !accept(relation) {
                    continue;
                }
                let source = edge.source();
                if !visited.insert(source) {
                    continue;
                }
                let info = &self.inner[source];
                if !info.is_anonymous() {
                    found.push(info.clone());
                }
                if descend(relation, info) {
                    stack.push(source);
                }
            }
        }

        found
    }

    pub fn len(&self) -> usize {
        self.inner.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    /// Drop the contents; the next cascade rebuilds from a snapshot.
    pub fn clear(&mut self) {
        self.inner.clear();
        self.index.clear();
        self.pending.clear();
        self.synced_epoch = None;
    }
}

impl Default for ModuleCache {
    fn default() -> Self {
        Self::new()
    }
}
