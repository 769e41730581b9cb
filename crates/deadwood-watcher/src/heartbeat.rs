//! Heartbeat: the host's periodic entry point into change detection

use crate::error::{Result, WatcherError};
use crate::reactor::Reactor;
use deadwood_core::path::normalize;
use deadwood_core::{Config, DependencyGraph, Tracker, UnloadReport, WatchMode};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Called with every non-empty report, outside the graph lock.
pub type ChangeCallback = Arc<dyn Fn(&UnloadReport) + Send + Sync + 'static>;

/// State written by background batches and consumed by the next heartbeat.
#[derive(Default)]
struct Shared {
    unloaded: AtomicBool,
    failure: Mutex<Option<deadwood_core::Error>>,
}

impl Shared {
    /// Record a finished pass. Runs under the graph lock.
    fn record(&self, report: &UnloadReport) {
        if report.unloaded_anything() {
            self.unloaded.store(true, Ordering::SeqCst);
        }
    }

    /// Keep the first failure until a heartbeat collects it.
    fn capture(&self, err: deadwood_core::Error) {
        error!("Background unload failed: {}", err);
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(err);
        }
    }
}

/// Drives change detection for one tracker, either by stat-ing every tracked
/// file on each check or through a background [`Reactor`].
pub struct Heartbeat {
    tracker: Tracker,
    config: Config,
    roots: Vec<PathBuf>,
    reactor: Option<Reactor>,
    shared: Arc<Shared>,
    on_change: Option<ChangeCallback>,
}

impl std::fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heartbeat")
            .field("mode", &self.mode())
            .field("roots", &self.roots)
            .field("reactor", &self.reactor)
            .finish()
    }
}

impl Heartbeat {
    pub fn new(tracker: Tracker, config: Config) -> Self {
        let roots = config.watch_roots.iter().map(normalize).collect();
        Heartbeat {
            tracker,
            config,
            roots,
            reactor: None,
            shared: Arc::new(Shared::default()),
            on_change: None,
        }
    }

    pub fn on_change(mut self, callback: impl Fn(&UnloadReport) + Send + Sync + 'static) -> Self {
        self.on_change = Some(Arc::new(callback));
        self
    }

    pub fn mode(&self) -> WatchMode {
        self.config.watch_mode()
    }

    pub fn is_watching(&self) -> bool {
        self.reactor
            .as_ref()
            .map_or(false, |reactor| reactor.is_alive_and_watching(&self.roots))
    }

    /// Start (or restart) the background reactor on `roots`, then replay a
    /// synchronous scan to pick up changes made while nothing was watching.
    ///
    /// A no-op in sync mode.
    pub fn start_async_watch(&mut self, roots: &[PathBuf]) -> Result<()> {
        self.roots = roots.iter().map(normalize).collect();
        if self.mode() == WatchMode::Sync {
            debug!("Sync mode; not starting a reactor");
            return Ok(());
        }
        self.stop_async_watch();

        let tracker = self.tracker.clone();
        let shared = Arc::clone(&self.shared);
        let on_change = self.on_change.clone();
        let reactor = Reactor::start(
            &self.roots,
            &self.config,
            Box::new(move |dirs: Vec<PathBuf>| {
                let report = tracker.synchronize(|graph| {
                    match graph.unload_modified(Some(dirs.as_slice())) {
                        Ok(report) => {
                            shared.record(&report);
                            Some(report)
                        }
                        Err(e) => {
                            shared.capture(e);
                            None
                        }
                    }
                });
                if let Some(report) = report {
                    announce(on_change.as_ref(), &report);
                }
            }),
        )?;
        self.reactor = Some(reactor);

        let roots = self.roots.clone();
        let report = self.tracker.synchronize(|graph| self.replay(graph, &roots))?;
        announce(self.on_change.as_ref(), &report);
        Ok(())
    }

    fn replay(
        &self,
        graph: &mut DependencyGraph,
        roots: &[PathBuf],
    ) -> deadwood_core::Result<UnloadReport> {
        let report = graph.unload_modified(Some(roots))?;
        self.shared.record(&report);
        Ok(report)
    }

    pub fn stop_async_watch(&mut self) {
        if let Some(mut reactor) = self.reactor.take() {
            reactor.stop();
        }
    }

    /// Whether anything was unloaded since the previous check.
    ///
    /// In async mode a dead or stale reactor is restarted first, and an error
    /// captured by a background pass is returned instead.
    pub fn heartbeat_check(&mut self) -> Result<bool> {
        if self.mode() == WatchMode::Sync {
            let report = self.tracker.unload_under(None)?;
            announce(self.on_change.as_ref(), &report);
            return Ok(report.unloaded_anything());
        }

        if !self.is_watching() {
            if self.reactor.is_some() {
                warn!("Reactor is no longer watching every root; restarting");
            } else {
                info!("Starting reactor");
            }
            let roots = self.roots.clone();
            self.start_async_watch(&roots)?;
        }

        // an in-flight batch finishes before the flag is read
        let shared = Arc::clone(&self.shared);
        let (failure, unloaded) = self.tracker.synchronize(|_| {
            let failure = shared.failure.lock().take();
            let unloaded = failure.is_none() && shared.unloaded.swap(false, Ordering::SeqCst);
            (failure, unloaded)
        });

        match failure {
            Some(e) => Err(WatcherError::BackgroundRemoval(e)),
            None => Ok(unloaded),
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop_async_watch();
    }
}

fn announce(callback: Option<&ChangeCallback>, report: &UnloadReport) {
    if let Some(callback) = callback {
        if report.unloaded_anything() {
            callback(report);
        }
    }
}
