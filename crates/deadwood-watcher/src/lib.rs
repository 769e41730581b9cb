//! Deadwood Watcher: change detection backends, the background reactor and the heartbeat

pub mod backend;
pub mod error;
pub mod heartbeat;
pub mod reactor;

pub use backend::{changed_dirs, select_backend, BackendKind, DirSink, NotifyBackend, WatchBackend};
pub use error::{Result, WatcherError};
pub use heartbeat::{ChangeCallback, Heartbeat};
pub use reactor::{BatchHandler, Reactor};
