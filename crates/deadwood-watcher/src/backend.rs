//! Watch backends: native OS notifications via `notify`, with a polling fallback

use crate::error::{Result, WatcherError};
use deadwood_core::{Config, WatchMode};
use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Receives the directory of every relevant change.
pub type DirSink = mpsc::UnboundedSender<PathBuf>;

/// `ENOSPC` as reported by `inotify_add_watch` when descriptors run out.
const ENOSPC: i32 = 28;

static FALLBACK_WARNED: AtomicBool = AtomicBool::new(false);

/// A source of filesystem change notifications.
pub trait WatchBackend: Send {
    fn name(&self) -> &'static str;

    /// Start reporting changed directories under `dirs` into `sink`.
    fn watch(&mut self, dirs: &[PathBuf], sink: DirSink) -> Result<()>;

    /// Stop reporting. Idempotent.
    fn stop(&mut self);
}

/// Backends in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// inotify / FSEvents / ReadDirectoryChangesW / kqueue, whichever `notify` picks.
    Native,
    Poll,
}

impl BackendKind {
    pub fn ranked(mode: WatchMode) -> &'static [BackendKind] {
        match mode {
            WatchMode::Sync => &[],
            WatchMode::Native => &[BackendKind::Native, BackendKind::Poll],
            WatchMode::Poll => &[BackendKind::Poll],
        }
    }

    /// Whether this backend can be constructed on the current host.
    pub fn probe(self) -> bool {
        match self {
            BackendKind::Native => {
                RecommendedWatcher::new(|_: notify::Result<Event>| {}, notify::Config::default())
                    .is_ok()
            }
            BackendKind::Poll => true,
        }
    }

    pub fn create(self, config: &Config) -> Box<dyn WatchBackend> {
        match self {
            BackendKind::Native => Box::new(NotifyBackend::<RecommendedWatcher>::new(
                "native",
                notify::Config::default(),
                config.clone(),
            )),
            BackendKind::Poll => Box::new(NotifyBackend::<PollWatcher>::new(
                "poll",
                notify::Config::default()
                    .with_poll_interval(config.poll_interval())
                    .with_compare_contents(false),
                config.clone(),
            )),
        }
    }
}

/// Pick the first backend in rank order that probes successfully.
///
/// Falling back from the native backend is logged once per process.
pub fn select_backend(config: &Config) -> Result<Box<dyn WatchBackend>> {
    let ranked = BackendKind::ranked(config.watch_mode());
    for (rank, kind) in ranked.iter().enumerate() {
        if kind.probe() {
            if rank > 0 && !FALLBACK_WARNED.swap(true, Ordering::Relaxed) {
                warn!("Native file watching is unavailable, falling back to {:?}", kind);
            }
            debug!("Selected {:?} watch backend", kind);
            return Ok(kind.create(config));
        }
        debug!("Watch backend {:?} failed its probe", kind);
    }
    Err(WatcherError::WatchBackendUnavailable)
}

/// A backend driving one of `notify`'s watchers, constructed on first `watch`.
pub struct NotifyBackend<W: Watcher> {
    name: &'static str,
    notify_config: notify::Config,
    config: Config,
    watcher: Option<W>,
}

impl<W: Watcher> NotifyBackend<W> {
    pub fn new(name: &'static str, notify_config: notify::Config, config: Config) -> Self {
        NotifyBackend {
            name,
            notify_config,
            config,
            watcher: None,
        }
    }
}

impl<W: Watcher + Send> WatchBackend for NotifyBackend<W> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn watch(&mut self, dirs: &[PathBuf], sink: DirSink) -> Result<()> {
        let roots: Vec<PathBuf> = dirs.to_vec();
        let origin = roots.first().cloned().unwrap_or_default();
        let config = self.config.clone();
        let name = self.name;
        let mut watcher = W::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    trace!("File system event: {:?}", event);
                    for dir in changed_dirs(&event, &roots, &config) {
                        // the reactor is gone; nothing left to notify
                        if sink.send(dir).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => error!("{} watch error: {}", name, e),
            },
            self.notify_config.clone(),
        )
        .map_err(|e| classify(&origin, e))?;

        for dir in dirs {
            watcher
                .watch(dir, RecursiveMode::Recursive)
                .map_err(|e| classify(dir, e))?;
            info!("Watching directory: {} ({})", dir.display(), self.name);
        }
        self.watcher = Some(watcher);
        Ok(())
    }

    fn stop(&mut self) {
        if self.watcher.take().is_some() {
            debug!("Stopped {} watch backend", self.name);
        }
    }
}

/// Map a failed `watch` call, singling out descriptor exhaustion.
pub fn classify(path: &Path, err: notify::Error) -> WatcherError {
    let exhausted = match &err.kind {
        notify::ErrorKind::MaxFilesWatch => true,
        notify::ErrorKind::Io(io) => io.raw_os_error() == Some(ENOSPC),
        _ => false,
    };
    if exhausted {
        WatcherError::WatchLimitExceeded {
            path: path.to_path_buf(),
        }
    } else {
        WatcherError::WatchPath {
            path: path.to_path_buf(),
            source: err,
        }
    }
}

/// Directories whose tracked files may have changed because of `event`.
///
/// Reads are ignored, except a close after writing. Events on a watch root
/// itself and inside ignored directories are dropped.
pub fn changed_dirs(event: &Event, roots: &[PathBuf], config: &Config) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {}
        EventKind::Access(_) => return Vec::new(),
        _ => {}
    }

    let mut dirs = BTreeSet::new();
    for path in &event.paths {
        // only components below the root are matched against ignore_dirs
        let relative = roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
            .unwrap_or(path);
        if relative.as_os_str().is_empty() || config.is_ignored(relative) {
            continue;
        }
        if let Some(parent) = path.parent() {
            dirs.insert(parent.to_path_buf());
        }
    }
    dirs.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, ModifyKind};

    fn modified(path: &str) -> Event {
        Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from(path))
    }

    #[test]
    fn test_events_map_to_parent_directories() {
        let roots = vec![PathBuf::from("/app")];
        let event = modified("/app/models/user.rb").add_path(PathBuf::from("/app/models/post.rb"));
        assert_eq!(
            changed_dirs(&event, &roots, &Config::default()),
            vec![PathBuf::from("/app/models")]
        );
    }

    #[test]
    fn test_root_and_ignored_events_are_dropped() {
        let roots = vec![PathBuf::from("/app")];
        let config = Config::default();
        assert!(changed_dirs(&modified("/app"), &roots, &config).is_empty());
        assert!(changed_dirs(&modified("/app/.git/index"), &roots, &config).is_empty());

        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/app/a.rb"));
        assert_eq!(changed_dirs(&created, &roots, &config), vec![PathBuf::from("/app")]);
    }

    #[test]
    fn test_only_write_closes_count_as_access() {
        let roots = vec![PathBuf::from("/app")];
        let config = Config::default();
        let read = Event::new(EventKind::Access(AccessKind::Read)).add_path(PathBuf::from("/app/lib/a.rb"));
        let closed = Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write)))
            .add_path(PathBuf::from("/app/lib/a.rb"));
        assert!(changed_dirs(&read, &roots, &config).is_empty());
        assert_eq!(changed_dirs(&closed, &roots, &config), vec![PathBuf::from("/app/lib")]);
    }

    #[test]
    fn test_descriptor_exhaustion_is_fatal() {
        let err = classify(Path::new("/app"), notify::Error::new(notify::ErrorKind::MaxFilesWatch));
        assert!(matches!(err, WatcherError::WatchLimitExceeded { .. }));

        let io = notify::Error::io(std::io::Error::from_raw_os_error(ENOSPC));
        assert!(matches!(classify(Path::new("/app"), io), WatcherError::WatchLimitExceeded { .. }));

        let missing = notify::Error::new(notify::ErrorKind::PathNotFound);
        assert!(matches!(classify(Path::new("/app"), missing), WatcherError::WatchPath { .. }));
    }

    #[test]
    fn test_ranking_follows_watch_mode() {
        assert!(BackendKind::ranked(WatchMode::Sync).is_empty());
        assert_eq!(BackendKind::ranked(WatchMode::Poll), &[BackendKind::Poll]);
        assert_eq!(BackendKind::ranked(WatchMode::Native)[0], BackendKind::Native);
        assert!(BackendKind::Poll.probe());
    }

    #[test]
    fn test_poll_only_selects_polling() {
        let config = Config {
            poll_only: true,
            ..Config::default()
        };
        assert_eq!(select_backend(&config).unwrap().name(), "poll");
    }
}
