//! Shared, lock-serialized handle on a dependency graph

use crate::dependency::DependencyGraph;
use crate::error::Result;
use crate::report::UnloadReport;
use crate::runtime::Runtime;
use crate::symbols::SymbolIndex;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Cloneable handle used by foreground code and the background reactor alike.
///
/// Every mutation takes the one graph lock, which makes the graph a
/// single-writer structure. Code that needs several operations to happen
/// atomically, or that would otherwise re-enter the lock, runs inside
/// [`Tracker::synchronize`] and works on the `&mut DependencyGraph` directly.
#[derive(Clone)]
pub struct Tracker {
    graph: Arc<Mutex<DependencyGraph>>,
    symbols: Arc<SymbolIndex>,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("symbol_count", &self.symbols.len())
            .finish()
    }
}

impl Tracker {
    pub fn new(graph: DependencyGraph) -> Self {
        let symbols = graph.symbol_index();
        Tracker {
            graph: Arc::new(Mutex::new(graph)),
            symbols,
        }
    }

    pub fn with_runtime(runtime: impl Runtime + 'static) -> Self {
        Self::new(DependencyGraph::new(runtime))
    }

    /// Run `f` with exclusive access to the graph.
    pub fn synchronize<R>(&self, f: impl FnOnce(&mut DependencyGraph) -> R) -> R {
        let mut graph = self.graph.lock();
        f(&mut graph)
    }

    /// Best-effort, lock-free check. A stale answer only causes redundant work.
    pub fn is_tracked(&self, name: &str) -> bool {
        self.symbols.contains(name)
    }

    pub fn symbol_index(&self) -> &SymbolIndex {
        &self.symbols
    }

    pub fn on_file_loaded<I, S>(&self, path: &Path, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synchronize(|graph| graph.on_file_loaded(path, names));
    }

    pub fn on_explicit_dependency(&self, dependent: &str, dependee: &str) {
        self.synchronize(|graph| graph.on_explicit_dependency(dependent, dependee));
    }

    /// Remove `name` and its dependents. Idempotent.
    pub fn remove_symbol(&self, name: &str) -> Result<()> {
        self.synchronize(|graph| graph.remove_symbol(name)).map(|_| ())
    }

    /// Unload every changed file. Returns whether anything was unloaded.
    pub fn unload_modified(&self) -> Result<bool> {
        self.unload_under(None).map(|report| report.unloaded_anything())
    }

    /// Unload changed files under `dirs` (every file when `None`).
    pub fn unload_under(&self, dirs: Option<&[PathBuf]>) -> Result<UnloadReport> {
        self.synchronize(|graph| graph.unload_modified(dirs))
    }

    pub fn reset(&self) {
        self.synchronize(DependencyGraph::reset);
    }
}
