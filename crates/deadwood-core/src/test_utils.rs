//! Test utilities for Deadwood

use crate::dependency::DependencyGraph;
use crate::error::Result;
use crate::model::EntityId;
use crate::runtime::MemoryRuntime;
use crate::tracker::Tracker;
use anyhow::{anyhow, bail};
use filetime::{set_file_mtime, FileTime};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A temporary source tree, a shared in-memory runtime, and a tracker over both.
///
/// Files are tiny scripts, one definition per line:
///
/// ```text
/// class A
/// class B < A
/// anonymous C < A      # C subclasses an unnamed subclass of A
/// module M
/// include C M
/// value X
/// depends B A          # B must go whenever A goes
/// raise boom
/// ```
pub struct Sandbox {
    pub dir: TempDir,
    pub runtime: Arc<Mutex<MemoryRuntime>>,
    pub tracker: Tracker,
}

impl Sandbox {
    pub fn new() -> Self {
        let runtime = MemoryRuntime::shared();
        let tracker = Tracker::with_runtime(Arc::clone(&runtime));
        Sandbox {
            dir: TempDir::new().unwrap(),
            runtime,
            tracker,
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write `source` to `relative`, creating parent directories.
    pub fn write(&self, relative: &str, source: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, source).unwrap();
        path
    }

    /// Execute a file the way a host autoloader would, reporting the names it defined.
    pub fn require(&self, relative: &str) -> Result<Vec<String>> {
        let path = self.path(relative);
        let runtime = Arc::clone(&self.runtime);
        self.tracker.synchronize(|graph| {
            graph.load_file(&path, |graph| {
                let source = fs::read_to_string(&path)?;
                run_script(&runtime, graph, &source)
            })
        })
    }

    /// Write then require.
    pub fn load(&self, relative: &str, source: &str) -> Vec<String> {
        self.write(relative, source);
        self.require(relative).unwrap()
    }

    /// Bump the mtime well past filesystem timestamp granularity.
    pub fn touch(&self, relative: &str) {
        touch(&self.path(relative));
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.runtime.lock().is_bound(name)
    }

    pub fn id_of(&self, name: &str) -> Option<EntityId> {
        self.runtime.lock().id_of(name)
    }

    pub fn tracked(&self) -> Vec<String> {
        self.tracker.symbol_index().names()
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

pub fn touch(path: &Path) {
    let current = fs::metadata(path).unwrap().modified().unwrap();
    let bumped = current + Duration::from_secs(5);
    set_file_mtime(path, FileTime::from_system_time(bumped)).unwrap();
}

/// Interpret one sandbox script against `runtime`, returning the names it bound.
pub fn run_script(
    runtime: &Mutex<MemoryRuntime>,
    graph: &mut DependencyGraph,
    source: &str,
) -> anyhow::Result<Vec<String>> {
    let mut defined = Vec::new();

    for line in source.lines() {
        let line = line.split('#').next().unwrap_or_default().trim();
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["class", name] => {
                runtime.lock().define_class(name, None)?;
                defined.push(name.to_string());
            }
            ["class", name, "<", superclass] => {
                runtime.lock().define_class(name, Some(*superclass))?;
                defined.push(name.to_string());
            }
            ["anonymous", name, "<", superclass] => {
                let mut runtime = runtime.lock();
                let parent = runtime
                    .id_of(superclass)
                    .ok_or_else(|| anyhow!("superclass `{superclass}` is not defined"))?;
                let anonymous = runtime.define_anonymous_class(Some(parent));
                runtime.define_subclass_of(name, anonymous.id);
                defined.push(name.to_string());
            }
            ["module", name] => {
                runtime.lock().define_module(name);
                defined.push(name.to_string());
            }
            ["value", name] => {
                runtime.lock().define_value(name);
                defined.push(name.to_string());
            }
            ["include", target, mixin] => {
                let entity = runtime.lock().include(target, mixin)?;
                graph.on_entity_defined(entity);
            }
            ["depends", dependent, dependee] => {
                graph.on_explicit_dependency(dependent, dependee);
            }
            ["raise", message @ ..] => bail!("{}", message.join(" ")),
            _ => bail!("unrecognized line: {line}"),
        }
    }

    Ok(defined)
}
