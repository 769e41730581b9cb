//! Symbol index mapping qualified names to their owning file

use crate::model::{is_direct_child, parent_names};
use dashmap::DashMap;
use std::path::{Path, PathBuf};

/// Maps each tracked symbol to the one file that currently owns it.
///
/// Thread-safe for concurrent reads: hosts may ask "is this tracked?" without
/// taking the graph lock. Mutation only happens through the dependency graph.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    owners: DashMap<String, PathBuf>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        SymbolIndex {
            owners: DashMap::new(),
        }
    }

    /// Claim `name` for `owner`. Returns the previous owner if it was a different file.
    pub(crate) fn insert(&self, name: String, owner: PathBuf) -> Option<PathBuf> {
        self.owners
            .insert(name, owner.clone())
            .filter(|previous| *previous != owner)
    }

    pub(crate) fn remove(&self, name: &str) -> Option<PathBuf> {
        self.owners.remove(name).map(|(_, owner)| owner)
    }

    pub(crate) fn clear(&self) {
        self.owners.clear();
    }

    /// Look up the file owning a symbol.
    pub fn owner(&self, name: &str) -> Option<PathBuf> {
        self.owners.get(name).map(|r| r.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.owners.contains_key(name)
    }

    /// Whether `path` owns `name`.
    pub fn is_owned_by(&self, name: &str, path: &Path) -> bool {
        self.owners
            .get(name)
            .map_or(false, |owner| owner.value() == path)
    }

    /// Whether `name` or any namespace enclosing it is tracked.
    pub fn in_tracked_namespace(&self, name: &str) -> bool {
        self.contains(name) || parent_names(name).any(|parent| self.contains(parent))
    }

    /// Tracked symbols nested exactly one level below `parent`, sorted.
    pub fn children_of(&self, parent: &str) -> Vec<String> {
        let mut children: Vec<String> = self
            .owners
            .iter()
            .filter(|entry| is_direct_child(parent, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        children.sort();
        children
    }

    /// All tracked symbols, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.owners.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
