//! Errors raised while watching for changes

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatcherError {
    /// No backend could be constructed, not even polling.
    #[error("no filesystem watch backend is available")]
    WatchBackendUnavailable,

    /// The OS ran out of watch descriptors. Fatal; switch to `poll_only` explicitly.
    #[error("watch limit exceeded while watching {}", path.display())]
    WatchLimitExceeded { path: PathBuf },

    #[error("failed to watch {}: {source}", path.display())]
    WatchPath {
        path: PathBuf,
        source: notify::Error,
    },

    #[error("failed to start reactor: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] deadwood_core::Error),

    /// An unload triggered by the reactor failed; surfaced at the next heartbeat.
    #[error("background unload failed: {0}")]
    BackgroundRemoval(#[source] deadwood_core::Error),
}

pub type Result<T, E = WatcherError> = std::result::Result<T, E>;
