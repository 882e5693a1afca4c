//! Tracked background task spawning and coordinated cancellation.
//!
//! Every long-running responsibility in §5 ("each long-running
//! responsibility owns one task") is spawned through a `TaskSupervisor` so
//! shutdown can cancel the shared token and then wait for every task to
//! actually exit before the node reports stopped.

use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct TaskSupervisor {
    token: CancellationToken,
    handles: std::sync::Arc<parking_lot::Mutex<Vec<JoinHandle<()>>>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            handles: std::sync::Arc::new(parking_lot::Mutex::new(Vec::new())),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a task, remembering its handle so `shutdown` can join it.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.handles.lock().push(handle);
    }

    /// Cancel the shared token and wait for every spawned task to finish.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!("background task panicked during shutdown: {err}");
            }
        }
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
