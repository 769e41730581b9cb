//! Tracker configuration loaded from `deadwood.toml`

use crate::error::{Error, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the project root.
pub const CONFIG_FILE: &str = "deadwood.toml";

/// Directories never worth watching.
pub const DEFAULT_IGNORE_DIRS: &[&str] = &[".git", "target", "node_modules", "tmp", "log"];

/// How change detection runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    /// Stat every tracked file on each heartbeat.
    Sync,
    /// Background reactor on the best available native backend.
    Native,
    /// Background reactor on the polling backend only.
    Poll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Detect changes on a background reactor instead of on each heartbeat.
    pub async_mode: bool,
    /// Directories holding tracked source files.
    pub watch_roots: Vec<PathBuf>,
    /// Skip native backends and poll in the background.
    pub poll_only: bool,
    pub poll_interval_ms: u64,
    /// Window used to coalesce notifications into one batch.
    pub debounce_ms: u64,
    /// Glob patterns selecting tracked files. Empty means every file.
    pub include: Vec<String>,
    pub ignore_dirs: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            async_mode: true,
            watch_roots: Vec::new(),
            poll_only: false,
            poll_interval_ms: 500,
            debounce_ms: 50,
            include: Vec::new(),
            ignore_dirs: DEFAULT_IGNORE_DIRS.iter().map(|dir| dir.to_string()).collect(),
        }
    }
}

impl Config {
    pub fn from_toml_str(source: &str, origin: &Path) -> Result<Self> {
        toml::from_str(source).map_err(|source| Error::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load a config file, resolving relative watch roots against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source, path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Ok(config.resolve_roots(base))
    }

    /// Load `deadwood.toml` from `root` if present, otherwise defaults watching `root`.
    pub fn discover(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        let config = if path.is_file() {
            tracing::debug!("Loading config from {}", path.display());
            Self::load(&path)?
        } else {
            Self::default()
        };
        Ok(config.or_root(root))
    }

    /// Resolve relative roots against `base`.
    pub fn resolve_roots(mut self, base: &Path) -> Self {
        for root in &mut self.watch_roots {
            if root.is_relative() {
                *root = base.join(&*root);
            }
        }
        self
    }

    /// Watch `root` when no roots were configured.
    pub fn or_root(mut self, root: &Path) -> Self {
        if self.watch_roots.is_empty() {
            self.watch_roots.push(root.to_path_buf());
        }
        self
    }

    pub fn watch_mode(&self) -> WatchMode {
        match (self.async_mode, self.poll_only) {
            (false, _) => WatchMode::Sync,
            (true, true) => WatchMode::Poll,
            (true, false) => WatchMode::Native,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Compile `include` into a matcher. `None` accepts every file.
    pub fn include_set(&self) -> Result<Option<GlobSet>> {
        if self.include.is_empty() {
            return Ok(None);
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.include {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Some(builder.build()?))
    }

    /// Whether any component of `path` is an ignored directory.
    pub fn is_ignored(&self, path: &Path) -> bool {
        path.components().any(|component| {
            component
                .as_os_str()
                .to_str()
                .map_or(false, |name| self.ignore_dirs.iter().any(|dir| dir == name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = Config::from_toml_str("poll_only = true\n", Path::new("deadwood.toml")).unwrap();
        assert!(config.async_mode);
        assert!(config.poll_only);
        assert_eq!(config.watch_mode(), WatchMode::Poll);
        assert_eq!(config.debounce(), Duration::from_millis(50));
    }

    #[test]
    fn test_sync_mode_wins_over_poll_only() {
        let config = Config {
            async_mode: false,
            poll_only: true,
            ..Config::default()
        };
        assert_eq!(config.watch_mode(), WatchMode::Sync);
    }

    #[test]
    fn test_load_resolves_relative_roots() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            "watch_roots = [\"app/models\", \"/opt/shared\"]\ninclude = [\"**/*.rb\"]\n",
        )
        .unwrap();

        let config = Config::discover(temp_dir.path()).unwrap();
        assert_eq!(
            config.watch_roots,
            vec![temp_dir.path().join("app/models"), PathBuf::from("/opt/shared")]
        );
        let include = config.include_set().unwrap().unwrap();
        assert!(include.is_match("app/models/user.rb"));
        assert!(!include.is_match("app/models/user.erb"));
    }

    #[test]
    fn test_discover_without_file_watches_root() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::discover(temp_dir.path()).unwrap();
        assert_eq!(config.watch_roots, vec![temp_dir.path().to_path_buf()]);
        assert!(config.include_set().unwrap().is_none());
    }

    #[test]
    fn test_invalid_toml_is_reported_with_path() {
        let err = Config::from_toml_str("async_mode = \"yes\"", Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
        assert!(Config::default().is_ignored(Path::new("/app/.git/HEAD")));
    }
}
