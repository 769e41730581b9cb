//! File records and the directory-indexed registry that owns them

use crate::path::{current_mtime, directory_of, normalize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, trace};

/// Last-seen state of one loaded source file.
#[derive(Debug, Clone)]
pub struct FileRecord {
    path: PathBuf,
    mtime: Option<SystemTime>,
    symbols: BTreeSet<String>,
    related: BTreeSet<PathBuf>,
    stale: bool,
}

impl PartialEq for FileRecord {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for FileRecord {}

impl FileRecord {
    /// Create a record for an already normalized path, capturing its current mtime.
    pub fn new(path: PathBuf) -> Self {
        let mtime = current_mtime(&path);
        FileRecord {
            path,
            mtime,
            symbols: BTreeSet::new(),
            related: BTreeSet::new(),
            stale: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mtime(&self) -> Option<SystemTime> {
        self.mtime
    }

    pub fn symbols(&self) -> &BTreeSet<String> {
        &self.symbols
    }

    pub fn related(&self) -> &BTreeSet<PathBuf> {
        &self.related
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// No symbols left and nothing left to propagate.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.related.is_empty()
    }

    pub fn add_symbol(&mut self, name: impl Into<String>) -> bool {
        self.symbols.insert(name.into())
    }

    pub fn remove_symbol(&mut self, name: &str) -> bool {
        self.symbols.remove(name)
    }

    /// Report whether the file changed since the last observation and remember
    /// the live mtime. A missing file always counts as changed.
    pub fn changed(&mut self) -> bool {
        let current = current_mtime(&self.path);
        let previous = std::mem::replace(&mut self.mtime, current);
        let stale = std::mem::take(&mut self.stale);
        stale || current.is_none() || previous != current
    }

    /// Force the next `changed()` to report true.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    fn take_related(&mut self) -> BTreeSet<PathBuf> {
        std::mem::take(&mut self.related)
    }
}

/// Owns every `FileRecord`, keyed by normalized path and indexed by directory.
#[derive(Debug, Default)]
pub struct FileRegistry {
    files: HashMap<PathBuf, FileRecord>,
    by_dir: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize(path))
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.files.get(&normalize(path))
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut FileRecord> {
        self.files.get_mut(&normalize(path))
    }

    /// Every tracked path, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.files.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Get or create the record for `path`.
    pub fn for_path(&mut self, path: &Path) -> &mut FileRecord {
        let path = normalize(path);
        let by_dir = &mut self.by_dir;
        self.files.entry(path.clone()).or_insert_with(|| {
            trace!("Tracking new file: {}", path.display());
            by_dir
                .entry(directory_of(&path))
                .or_default()
                .insert(path.clone());
            FileRecord::new(path)
        })
    }

    /// Associate freshly defined symbols with `path`.
    pub fn record_load<I, S>(&mut self, path: &Path, symbols: I) -> &mut FileRecord
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let record = self.for_path(path);
        for symbol in symbols {
            record.add_symbol(symbol);
        }
        record
    }

    /// Compare the stored mtime of `path` with the live one. Unknown paths are unchanged.
    pub fn changed(&mut self, path: &Path) -> bool {
        self.get_mut(path).map_or(false, FileRecord::changed)
    }

    /// Record a symmetric interdependency between two files.
    pub fn relate(&mut self, a: &Path, b: &Path) {
        let (a, b) = (normalize(a), normalize(b));
        if a == b {
            return;
        }
        self.for_path(&a).related.insert(b.clone());
        self.for_path(&b).related.insert(a);
    }

    /// Drain the relations of `path`, removing the back edges on the other side.
    pub fn take_related(&mut self, path: &Path) -> Vec<PathBuf> {
        let path = normalize(path);
        let Some(record) = self.files.get_mut(&path) else {
            return Vec::new();
        };
        let related = record.take_related();
        for other in &related {
            if let Some(other) = self.files.get_mut(other) {
                other.related.remove(&path);
            }
        }
        related.into_iter().collect()
    }

    /// Mark `path` stale and propagate to the files it was related to.
    pub fn mark_stale(&mut self, path: &Path) {
        let path = normalize(path);
        let mut pending = vec![path];
        while let Some(current) = pending.pop() {
            let Some(record) = self.files.get_mut(&current) else {
                continue;
            };
            if record.stale {
                continue;
            }
            debug!("Marking file stale: {}", current.display());
            record.mark_stale();
            pending.extend(self.take_related(&current));
        }
    }

    /// Paths of changed files under any of `dirs` (every file when `None`).
    ///
    /// Each returned record has had its stored mtime refreshed.
    pub fn scan_changed_under(&mut self, dirs: Option<&[PathBuf]>) -> Vec<PathBuf> {
        let candidates = match dirs {
            None => self.paths(),
            Some(dirs) => self.paths_under(dirs),
        };
        candidates
            .into_iter()
            .filter(|path| self.files.get_mut(path).map_or(false, FileRecord::changed))
            .collect()
    }

    /// Tracked paths living in `dirs` or any directory below them.
    pub fn paths_under(&self, dirs: &[PathBuf]) -> Vec<PathBuf> {
        let mut found = BTreeSet::new();
        for dir in dirs {
            let dir = normalize(dir);
            for (indexed, paths) in self.by_dir.range(dir.clone()..) {
                if !indexed.starts_with(&dir) {
                    break;
                }
                found.extend(paths.iter().cloned());
            }
        }
        found.into_iter().collect()
    }

    pub fn remove(&mut self, path: &Path) -> Option<FileRecord> {
        let path = normalize(path);
        let record = self.files.remove(&path)?;
        let dir = directory_of(&path);
        if let Some(paths) = self.by_dir.get_mut(&dir) {
            paths.remove(&path);
            if paths.is_empty() {
                self.by_dir.remove(&dir);
            }
        }
        Some(record)
    }

    /// Drop the record if it holds neither symbols nor relations.
    pub fn remove_if_empty(&mut self, path: &Path) -> bool {
        if self.get(path).map_or(false, FileRecord::is_empty) {
            self.remove(path);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.files.clear();
        self.by_dir.clear();
    }
}
