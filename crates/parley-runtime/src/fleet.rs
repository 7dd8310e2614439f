//! The set of running workers.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::error::{RuntimeError, RuntimeResult};
use crate::worker::{DispatchWorker, ExitOptions};

/// Workers keyed by bot name.
///
/// Workers hold a weak handle back to their fleet so a quitting worker can
/// remove itself; when the last one leaves, [`wait_shutdown`](Self::wait_shutdown)
/// resolves.
#[derive(Debug, Default)]
pub struct Fleet {
    workers: RwLock<BTreeMap<String, Arc<DispatchWorker>>>,
    shutdown: Notify,
}

impl Fleet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds `worker`, rejecting a second worker with the same name.
    pub fn register(self: &Arc<Self>, worker: Arc<DispatchWorker>) -> RuntimeResult<()> {
        let name = worker.config().name.clone();
        let mut workers = self.workers.write();
        if workers.contains_key(&name) {
            return Err(RuntimeError::BotExists(name));
        }
        worker.set_fleet(Arc::downgrade(self));
        debug!(bot = %name, "Worker registered");
        workers.insert(name, worker);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Option<Arc<DispatchWorker>> {
        let removed = self.workers.write().remove(name);
        if removed.is_some() {
            debug!(bot = %name, "Worker removed");
        }
        removed
    }

    pub fn get(&self, name: &str) -> RuntimeResult<Arc<DispatchWorker>> {
        self.workers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::BotNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.workers.read().keys().cloned().collect()
    }

    pub fn workers(&self) -> Vec<Arc<DispatchWorker>> {
        self.workers.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.workers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.read().is_empty()
    }

    /// Stops every worker, saving its state.
    pub fn shutdown_all(&self) {
        let workers = self.workers();
        info!(count = workers.len(), "Stopping all workers");
        for worker in workers {
            worker.exit(ExitOptions::default());
        }
    }

    /// Wakes whoever awaits [`wait_shutdown`](Self::wait_shutdown).
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub async fn wait_shutdown(&self) {
        self.shutdown.notified().await;
    }
}
