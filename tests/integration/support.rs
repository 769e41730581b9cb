//! Shared fixtures for the integration tests

use deadwood_core::{Config, EntityId, MemoryRuntime, Tracker};
use filetime::{set_file_mtime, FileTime};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A project directory whose files "define" classes in a memory runtime.
pub struct Project {
    pub dir: TempDir,
    pub runtime: Arc<Mutex<MemoryRuntime>>,
    pub tracker: Tracker,
}

impl Project {
    pub fn new() -> Self {
        let runtime = MemoryRuntime::shared();
        let tracker = Tracker::with_runtime(Arc::clone(&runtime));
        Project {
            dir: TempDir::new().unwrap(),
            runtime,
            tracker,
        }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Write `relative` and record that it defined `classes`, each `(name, superclass)`.
    pub fn load(&self, relative: &str, classes: &[(&str, Option<&str>)]) -> PathBuf {
        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("{classes:?}")).unwrap();
        self.define(relative, classes)
    }

    /// Define `classes` again from the file already on disk, without touching it.
    pub fn define(&self, relative: &str, classes: &[(&str, Option<&str>)]) -> PathBuf {
        let path = self.dir.path().join(relative);
        let mut runtime = self.runtime.lock();
        for (name, superclass) in classes {
            runtime.define_class(name, *superclass).unwrap();
        }
        drop(runtime);
        self.tracker
            .on_file_loaded(&path, classes.iter().map(|(name, _)| *name));
        path
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.runtime.lock().is_bound(name)
    }

    pub fn id_of(&self, name: &str) -> Option<EntityId> {
        self.runtime.lock().id_of(name)
    }

    pub fn config(&self, async_mode: bool) -> Config {
        Config {
            async_mode,
            poll_only: true,
            poll_interval_ms: 20,
            debounce_ms: 10,
            watch_roots: vec![self.root()],
            ..Config::default()
        }
    }
}

pub fn touch(path: &Path) {
    let bumped = std::fs::metadata(path).unwrap().modified().unwrap() + Duration::from_secs(5);
    set_file_mtime(path, FileTime::from_system_time(bumped)).unwrap();
}
