//! Dependency graph and the cascading unload engine

use crate::error::{Error, Result};
use crate::files::{FileRecord, FileRegistry};
use crate::graph::ModuleCache;
use crate::model::{parent_names, EntityInfo};
use crate::path::normalize;
use crate::report::UnloadReport;
use crate::runtime::{RemovalListener, Runtime};
use crate::symbols::SymbolIndex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Every piece of tracking state, owned by one service object.
///
/// All mutation goes through `&mut self`; share it across threads through a
/// [`Tracker`](crate::Tracker), which serializes access behind one lock.
pub struct DependencyGraph {
    runtime: Box<dyn Runtime>,
    listeners: Vec<Box<dyn RemovalListener>>,
    files: FileRegistry,
    symbols: Arc<SymbolIndex>,
    /// dependee -> dependents, consumed when the dependee is removed
    explicit: HashMap<String, Vec<String>>,
    modules: ModuleCache,
    epoch: u64,
    /// Names mid-removal on the current cascade.
    removing: HashSet<String>,
    sequence: u64,
    report: UnloadReport,
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("file_count", &self.files.len())
            .field("symbol_count", &self.symbols.len())
            .field("explicit_count", &self.explicit.len())
            .field("modules", &self.modules)
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl DependencyGraph {
    pub fn new(runtime: impl Runtime + 'static) -> Self {
        DependencyGraph {
            runtime: Box::new(runtime),
            listeners: Vec::new(),
            files: FileRegistry::new(),
            symbols: Arc::new(SymbolIndex::new()),
            explicit: HashMap::new(),
            modules: ModuleCache::new(),
            epoch: 0,
            removing: HashSet::new(),
            sequence: 0,
            report: UnloadReport::default(),
        }
    }

    pub fn with_listener(mut self, listener: impl RemovalListener + 'static) -> Self {
        self.add_listener(listener);
        self
    }

    pub fn add_listener(&mut self, listener: impl RemovalListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    // ── Introspection ───────────────────────────────────

    /// Shared handle for lock-free, best-effort reads.
    pub fn symbol_index(&self) -> Arc<SymbolIndex> {
        Arc::clone(&self.symbols)
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.symbols.contains(name)
    }

    pub fn owner_of(&self, name: &str) -> Option<PathBuf> {
        self.symbols.owner(name)
    }

    pub fn file(&self, path: &Path) -> Option<&FileRecord> {
        self.files.get(path)
    }

    pub fn files(&self) -> &FileRegistry {
        &self.files
    }

    /// Dependents registered against `dependee` that have not been consumed yet.
    pub fn explicit_dependents(&self, dependee: &str) -> &[String] {
        self.explicit
            .get(dependee)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    // ── Load-side events ────────────────────────────────

    /// Record that `path` just finished executing and defined `names`.
    ///
    /// A name previously owned by another file is re-associated; the old
    /// owner drops its claim.
    pub fn on_file_loaded<I, S>(&mut self, path: &Path, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = normalize(path);
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        for name in names {
            if let Some(previous) = self.symbols.insert(name.clone(), path.clone()) {
                debug!("Re-associating {} from {} to {}", name, previous.display(), path.display());
                if let Some(record) = self.files.get_mut(&previous) {
                    record.remove_symbol(&name);
                }
                self.files.remove_if_empty(&previous);
            }
            self.files.for_path(&path).add_symbol(name.clone());

            if let Some(entity) = self.runtime.resolve(&name) {
                self.on_entity_defined(entity);
            }
        }

        trace!(
            "Loaded {} -> {:?}",
            path.display(),
            self.files.get(&path).map(|record| record.symbols())
        );
    }

    /// Run `loader` for `path`, recording the names it returns.
    ///
    /// On failure the file is marked stale, so the next unload pass removes
    /// whatever it left behind, and the error is returned.
    pub fn load_file<F>(&mut self, path: &Path, loader: F) -> Result<Vec<String>>
    where
        F: FnOnce(&mut Self) -> anyhow::Result<Vec<String>>,
    {
        match loader(self) {
            Ok(names) => {
                self.on_file_loaded(path, names.iter().cloned());
                Ok(names)
            }
            Err(e) => {
                warn!("Error while loading {}: {}", path.display(), e);
                self.on_load_failed(path);
                Err(Error::load_failure(normalize(path), e))
            }
        }
    }

    /// Mark `path` stale after its loader failed. Unknown paths only invalidate the cache.
    pub fn on_load_failed(&mut self, path: &Path) {
        self.files.mark_stale(path);
        // whatever the failed load defined was never reported
        self.invalidate_module_cache();
    }

    /// `dependent` must be removed whenever `dependee` is.
    pub fn on_explicit_dependency(&mut self, dependent: &str, dependee: &str) {
        trace!("Explicit dependency: {} -> {}", dependee, dependent);
        self.explicit
            .entry(dependee.to_string())
            .or_default()
            .push(dependent.to_string());
    }

    /// Register a definition with the module cache.
    pub fn on_entity_defined(&mut self, entity: EntityInfo) {
        if self.modules.is_built() {
            self.modules.insert(entity);
        }
    }

    /// Record that loading `a` depended on `b` being loaded (or the other way round).
    pub fn relate(&mut self, a: &Path, b: &Path) {
        self.files.relate(a, b);
    }

    /// Force the next cascade to rebuild the module cache from a full snapshot.
    pub fn invalidate_module_cache(&mut self) {
        self.epoch += 1;
    }

    // ── Unloading ───────────────────────────────────────

    /// Remove `name` and everything that depends on it. Removing an unknown name is a no-op.
    pub fn remove_symbol(&mut self, name: &str) -> Result<UnloadReport> {
        self.top_level(|graph| graph.remove_constant(name))
    }

    /// Remove every symbol `path` produced, along with their dependents.
    pub fn unload_file(&mut self, path: &Path) -> Result<UnloadReport> {
        let path = normalize(path);
        self.top_level(|graph| graph.unload_file_inner(&path))
    }

    /// Unload every changed file, optionally only those under `dirs`.
    pub fn unload_modified(&mut self, dirs: Option<&[PathBuf]>) -> Result<UnloadReport> {
        let changed = self.files.scan_changed_under(dirs);
        if changed.is_empty() {
            return Ok(UnloadReport::new(self.sequence));
        }
        debug!("Changed files: {:?}", changed);
        self.top_level(|graph| {
            for (done, path) in changed.iter().enumerate() {
                if let Err(e) = graph.unload_file_inner(path) {
                    graph.keep_pending(&changed[done..]);
                    return Err(e);
                }
            }
            Ok(())
        })
    }

    /// Re-flag files the scan consumed but a failed pass never finished.
    fn keep_pending(&mut self, paths: &[PathBuf]) {
        for path in paths {
            if let Some(record) = self.files.get_mut(path) {
                debug!("Keeping {} pending after a failed pass", path.display());
                record.mark_stale();
            }
        }
    }

    fn top_level<F>(&mut self, op: F) -> Result<UnloadReport>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.report = UnloadReport::default();
        let result = op(self);
        let mut report = std::mem::take(&mut self.report);
        if report.unloaded_anything() {
            self.sequence += 1;
            info!(
                "Unloaded {} symbols from {} files",
                report.removed_symbols.len(),
                report.removed_files.len()
            );
        }
        report.sequence = self.sequence;
        result.map(|()| report)
    }

    fn unload_file_inner(&mut self, path: &Path) -> Result<()> {
        let Some(record) = self.files.get(path) else {
            return Ok(());
        };
        let symbols: Vec<String> = record.symbols().iter().cloned().collect();
        debug!("Unloading file {} ({} symbols)", path.display(), symbols.len());

        for name in &symbols {
            self.remove_constant(name)?;
        }
        self.release_file(path)
    }

    /// Guarded entry point of every removal, including nested ones.
    fn remove_constant(&mut self, name: &str) -> Result<()> {
        if !self.removing.insert(name.to_string()) {
            trace!("Skipping {}: already being removed", name);
            return Ok(());
        }
        let result = self.resolve_and_remove(name);
        self.removing.remove(name);
        result
    }

    fn resolve_and_remove(&mut self, name: &str) -> Result<()> {
        let Some(entity) = self.runtime.resolve(name) else {
            return self.clear_tracks(name);
        };

        if !self.symbols.contains(name) {
            if let Some(parent) = self.nearest_tracked_parent(name) {
                debug!("Promoting removal of {} to {}", name, parent);
                return self.remove_constant(&parent);
            }
        }

        if entity.kind.is_namespace() {
            self.cascade(name, &entity)?;
        }

        for listener in &mut self.listeners {
            listener
                .will_remove(name, &entity)
                .map_err(|e| Error::removal(name, e))?;
        }

        debug!("Removing {}", name);
        self.runtime.unbind(name).map_err(|e| Error::removal(name, e))?;
        self.modules.remove(entity.id);
        self.report.push_symbol(name);
        self.clear_tracks(name)
    }

    fn cascade(&mut self, name: &str, entity: &EntityInfo) -> Result<()> {
        for child in self.symbols.children_of(name) {
            trace!("Nested: {} :: {}", name, child);
            self.remove_constant(&child)?;
        }

        if let Some(dependents) = self.explicit.remove(name) {
            let dependents: BTreeSet<String> = dependents.into_iter().collect();
            for dependent in dependents {
                trace!("Explicit dependency: {} -> {}", name, dependent);
                self.remove_constant(&dependent)?;
            }
        }

        self.ensure_module_cache();
        for dependent in self.inferred_dependents(entity) {
            if let Some(dependent_name) = dependent.name.as_deref() {
                trace!("Dependent module: {} -> {}", name, dependent_name);
                self.remove_constant(dependent_name)?;
            }
        }
        Ok(())
    }

    /// Inferred dependents still bound to the identity the cache knows, inside tracked namespaces.
    fn inferred_dependents(&self, entity: &EntityInfo) -> Vec<EntityInfo> {
        self.modules
            .dependents(entity.id)
            .into_iter()
            .filter(|dependent| {
                let Some(name) = dependent.name.as_deref() else {
                    return false;
                };
                self.symbols.in_tracked_namespace(name)
                    && self
                        .runtime
                        .resolve(name)
                        .map_or(false, |live| live.id == dependent.id)
            })
            .collect()
    }

    fn ensure_module_cache(&mut self) {
        if self.modules.is_synced(self.epoch) {
            return;
        }
        let symbols = Arc::clone(&self.symbols);
        let entities = self.runtime.live_entities();
        debug!("Rebuilding module cache from {} live entities", entities.len());
        self.modules.rebuild(entities, self.epoch, |entity| match entity.name.as_deref() {
            Some(name) if !name.is_empty() => symbols.in_tracked_namespace(name),
            _ => true,
        });
    }

    fn nearest_tracked_parent(&self, name: &str) -> Option<String> {
        parent_names(name)
            .find(|parent| self.symbols.contains(parent))
            .map(str::to_string)
    }

    /// Drop `name` from the indices, then remove the rest of its file.
    fn clear_tracks(&mut self, name: &str) -> Result<()> {
        let Some(owner) = self.symbols.remove(name) else {
            return Ok(());
        };
        self.report.push_symbol(name);

        let siblings: Vec<String> = match self.files.get_mut(&owner) {
            Some(record) => {
                record.remove_symbol(name);
                record.symbols().iter().cloned().collect()
            }
            None => Vec::new(),
        };

        for sibling in &siblings {
            trace!("Same file: {} -> {}", name, sibling);
            self.remove_constant(sibling)?;
        }
        self.release_file(&owner)
    }

    /// Drop a record that has lost all of its symbols, unloading the files related to it.
    fn release_file(&mut self, path: &Path) -> Result<()> {
        let Some(record) = self.files.get(path) else {
            return Ok(());
        };
        if !record.symbols().is_empty() {
            return Ok(());
        }

        for related in self.files.take_related(path) {
            trace!("Related file: {} -> {}", path.display(), related.display());
            self.unload_file_inner(&related)?;
        }

        if self.files.remove_if_empty(path) {
            debug!("Dropped file record {}", path.display());
            self.report.push_file(path.to_path_buf());
        }
        Ok(())
    }

    /// Drop all tracking state. The runtime and listeners are kept.
    pub fn reset(&mut self) {
        self.files.clear();
        self.symbols.clear();
        self.explicit.clear();
        self.modules.clear();
        self.removing.clear();
        self.report = UnloadReport::default();
        self.epoch += 1;
    }
}
