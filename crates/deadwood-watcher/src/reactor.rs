//! Background reactor: one thread per instance, batching changed directories

use crate::backend::{select_backend, WatchBackend};
use crate::error::Result;
use deadwood_core::path::normalize;
use deadwood_core::Config;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

/// Handler for one coalesced batch of changed directories.
pub type BatchHandler = Box<dyn FnMut(Vec<PathBuf>) + Send + 'static>;

/// Owns a watch backend on a dedicated thread and hands coalesced batches of
/// changed directories to a handler.
pub struct Reactor {
    roots: Vec<PathBuf>,
    backend: &'static str,
    alive: Arc<AtomicBool>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("roots", &self.roots)
            .field("backend", &self.backend)
            .field("alive", &self.alive.load(Ordering::SeqCst))
            .finish()
    }
}

impl Reactor {
    /// Select a backend, watch `roots`, and start the reactor thread.
    ///
    /// Backend errors (including watch limit exhaustion) are returned here,
    /// before any thread is spawned.
    pub fn start(roots: &[PathBuf], config: &Config, handler: BatchHandler) -> Result<Self> {
        let backend = select_backend(config)?;
        Self::with_backend(roots, config.debounce(), backend, handler)
    }

    pub fn with_backend(
        roots: &[PathBuf],
        debounce: Duration,
        mut backend: Box<dyn WatchBackend>,
        handler: BatchHandler,
    ) -> Result<Self> {
        let roots: Vec<PathBuf> = roots.iter().map(normalize).collect();
        let (tx, rx) = mpsc::unbounded_channel();
        backend.watch(&roots, tx)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let alive = Arc::new(AtomicBool::new(true));
        let name = backend.name();

        let thread_alive = Arc::clone(&alive);
        let handle = std::thread::Builder::new()
            .name("deadwood-reactor".to_string())
            .spawn(move || {
                runtime.block_on(run(rx, shutdown_rx, debounce, handler));
                backend.stop();
                thread_alive.store(false, Ordering::SeqCst);
                debug!("Reactor thread exiting");
            })?;

        info!("Reactor started on {} backend for {} roots", name, roots.len());
        Ok(Reactor {
            roots,
            backend: name,
            alive,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
            && self.handle.as_ref().map_or(false, |handle| !handle.is_finished())
    }

    /// Alive and watching every one of `dirs`.
    pub fn is_alive_and_watching(&self, dirs: &[PathBuf]) -> bool {
        self.is_alive()
            && dirs
                .iter()
                .map(normalize)
                .all(|dir| self.roots.contains(&dir))
    }

    /// Signal the thread, let it drain queued batches, and join it. Idempotent.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Reactor thread panicked");
            }
            info!("Reactor stopped");
        }
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    mut shutdown: oneshot::Receiver<()>,
    debounce: Duration,
    mut handler: BatchHandler,
) {
    let mut stopping = false;

    while !stopping {
        let first = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            dir = rx.recv() => match dir {
                Some(dir) => dir,
                None => break,
            },
        };

        let mut batch = BTreeSet::from([first]);
        let window = tokio::time::sleep(debounce);
        tokio::pin!(window);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown, if !stopping => stopping = true,
                _ = &mut window => break,
                dir = rx.recv() => match dir {
                    Some(dir) => { batch.insert(dir); }
                    None => break,
                },
            }
            if stopping {
                break;
            }
        }

        trace!("Dispatching batch of {} directories", batch.len());
        handler(batch.into_iter().collect());
    }

    // batches already queued still get processed
    let mut pending = BTreeSet::new();
    while let Ok(dir) = rx.try_recv() {
        pending.insert(dir);
    }
    if !pending.is_empty() {
        debug!("Draining {} queued directories", pending.len());
        handler(pending.into_iter().collect());
    }
}
