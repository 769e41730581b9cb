//! Error types for the dependency tracker

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error coming from host-supplied code (loaders, runtimes, listeners).
pub type HostError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the tracker.
///
/// Structural inconsistencies (removing an unknown symbol, recording a file
/// twice) are not errors; those operations are no-ops.
#[derive(Error, Debug)]
pub enum Error {
    /// The loader failed while executing a file. The file is now stale.
    #[error("failed to load {}: {source}", path.display())]
    LoadFailure { path: PathBuf, source: HostError },

    /// The host runtime or a removal listener failed during a cascade.
    #[error("failed to remove `{name}`: {source}")]
    Removal { name: String, source: HostError },

    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid include pattern: {0}")]
    Pattern(#[from] globset::Error),
}

impl Error {
    pub(crate) fn load_failure(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        Error::LoadFailure {
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn removal(name: &str, source: anyhow::Error) -> Self {
        Error::Removal {
            name: name.to_string(),
            source: source.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
