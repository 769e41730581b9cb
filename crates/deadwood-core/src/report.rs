//! Unload reports handed back to hosts after each pass

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What one top-level unload operation removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnloadReport {
    /// Monotonically increasing across non-empty reports of one graph.
    pub sequence: u64,
    /// Symbols removed, in removal order.
    pub removed_symbols: Vec<String>,
    /// Files whose records were dropped.
    pub removed_files: Vec<PathBuf>,
}

impl UnloadReport {
    pub fn new(sequence: u64) -> Self {
        UnloadReport {
            sequence,
            ..Self::default()
        }
    }

    /// Check if nothing was unloaded.
    pub fn is_empty(&self) -> bool {
        self.removed_symbols.is_empty() && self.removed_files.is_empty()
    }

    pub fn unloaded_anything(&self) -> bool {
        !self.is_empty()
    }

    pub fn removed(&self, name: &str) -> bool {
        self.removed_symbols.iter().any(|removed| removed == name)
    }

    pub(crate) fn push_symbol(&mut self, name: &str) {
        if !self.removed(name) {
            self.removed_symbols.push(name.to_string());
        }
    }

    pub(crate) fn push_file(&mut self, path: PathBuf) {
        if !self.removed_files.contains(&path) {
            self.removed_files.push(path);
        }
    }
}
