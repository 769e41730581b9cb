//! Path normalization shared by file records and watch notifications

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// Normalize a path so that loader-reported and watcher-reported paths compare equal.
///
/// Existing paths are canonicalized (symlinks resolved). Missing paths are made
/// absolute and cleaned lexically, so a deleted file still maps onto the key it
/// was registered under as long as its directory survives.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        if !parent.as_os_str().is_empty() {
            if let Ok(parent) = parent.canonicalize() {
                return parent.join(name);
            }
        }
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    clean(&absolute)
}

/// Lexically resolve `.` and `..` components and drop trailing separators.
pub fn clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push(component);
                }
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}

/// Live modification time of `path`, `None` when the file is gone or unreadable.
pub fn current_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// Directory a file record is indexed under.
pub fn directory_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}
