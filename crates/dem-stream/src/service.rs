//! Background terrain worker.
//!
//! The loader's file reads are blocking, so the engine is moved onto a tokio
//! blocking thread and driven through a bounded channel. Requests are served
//! in submission order by the same state machine as the synchronous API.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Result, TerrainError};
use crate::types::{LoadStats, StoreStats, TerrainWindow, WindowRequest};
use crate::window::TerrainLoader;

enum Command {
    Load {
        request: WindowRequest,
        reply: oneshot::Sender<Result<TerrainWindow>>,
    },
    Stats {
        reply: oneshot::Sender<ServiceStats>,
    },
}

/// Snapshot of the worker's engine statistics.
#[derive(Debug, Clone, Default)]
pub struct ServiceStats {
    pub last_load: LoadStats,
    pub store: StoreStats,
}

/// A window requested with [`TerrainHandle::submit`].
pub struct PendingWindow {
    rx: oneshot::Receiver<Result<TerrainWindow>>,
}

impl PendingWindow {
    /// Take the result if the worker has finished, without blocking.
    ///
    /// Returns `None` while the request is still queued or running.
    pub fn try_take(&mut self) -> Option<Result<TerrainWindow>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(TerrainError::ServiceClosed)),
        }
    }

    /// Wait for the result.
    pub async fn wait(self) -> Result<TerrainWindow> {
        self.rx.await.map_err(|_| TerrainError::ServiceClosed)?
    }
}

/// Handle to a [`TerrainLoader`] running on a blocking worker.
///
/// Must be created inside a tokio runtime.
pub struct TerrainHandle {
    tx: mpsc::Sender<Command>,
    worker: JoinHandle<TerrainLoader>,
}

impl TerrainHandle {
    /// Move `loader` onto a worker accepting up to `queue_depth` pending
    /// requests.
    pub fn spawn(loader: TerrainLoader, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        info!(queue_depth, "Starting terrain worker");
        let worker = tokio::task::spawn_blocking(move || run_worker(loader, rx));
        Self { tx, worker }
    }

    /// Spawn with the queue depth from the loader's configuration.
    pub fn from_loader(loader: TerrainLoader) -> Self {
        let depth = loader.config().service_queue_depth;
        Self::spawn(loader, depth)
    }

    /// Load a window, waiting for queue space and for the result.
    pub async fn load(&self, request: WindowRequest) -> Result<TerrainWindow> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Load { request, reply })
            .await
            .map_err(|_| TerrainError::ServiceClosed)?;
        PendingWindow { rx }.wait().await
    }

    /// Queue a window load without waiting.
    ///
    /// Fails with [`TerrainError::ServiceBusy`] when the queue is full.
    pub fn submit(&self, request: WindowRequest) -> Result<PendingWindow> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .try_send(Command::Load { request, reply })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => TerrainError::ServiceBusy,
                mpsc::error::TrySendError::Closed(_) => TerrainError::ServiceClosed,
            })?;
        Ok(PendingWindow { rx })
    }

    /// Statistics of the worker's engine, after every earlier request.
    pub async fn stats(&self) -> Result<ServiceStats> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Stats { reply })
            .await
            .map_err(|_| TerrainError::ServiceClosed)?;
        rx.await.map_err(|_| TerrainError::ServiceClosed)
    }

    /// Stop the worker once queued requests are served, returning the engine.
    pub async fn shutdown(self) -> Result<TerrainLoader> {
        drop(self.tx);
        self.worker.await.map_err(|_| TerrainError::ServiceClosed)
    }
}

fn run_worker(mut loader: TerrainLoader, mut rx: mpsc::Receiver<Command>) -> TerrainLoader {
    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Load { request, reply } => {
                let result = loader.load(&request);
                // The requester may have given up.
                let _ = reply.send(result);
            }
            Command::Stats { reply } => {
                let _ = reply.send(ServiceStats {
                    last_load: loader.last_load_stats().clone(),
                    store: loader.store_stats(),
                });
            }
        }
    }
    debug!("Terrain worker stopped");
    loader
}
