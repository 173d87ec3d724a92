//! Job queue and worker pool
//!
//! Requests are enqueued by id at ingest; N worker tasks drain the shared
//! queue, one request per logical task. Dropping every [`JobQueue`] handle
//! closes the channel and the workers exit after their current job.

use std::sync::Arc;

use casegen_model::RequestId;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::orchestrator::Orchestrator;

/// Sender half of the in-process job queue
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<RequestId>,
}

impl JobQueue {
    /// Create a queue and its receiver
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RequestId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue a request for processing
    ///
    /// Returns false when the worker pool has shut down.
    pub fn enqueue(&self, request_id: RequestId) -> bool {
        self.tx.send(request_id).is_ok()
    }
}

/// Running worker tasks
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers draining `rx`
    #[must_use]
    pub fn spawn(
        count: usize,
        orchestrator: Arc<Orchestrator>,
        rx: mpsc::UnboundedReceiver<RequestId>,
    ) -> Self {
        let rx = Arc::new(Mutex::new(rx));
        let mut handles = Vec::with_capacity(count.max(1));

        for worker in 0..count.max(1) {
            let rx = Arc::clone(&rx);
            let orchestrator = Arc::clone(&orchestrator);
            handles.push(tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(request_id) = job else {
                        tracing::debug!(worker, "queue closed, worker exiting");
                        break;
                    };
                    tracing::info!(worker, request = %request_id, "worker picked job");
                    if let Err(error) = orchestrator.start(request_id).await {
                        tracing::error!(worker, request = %request_id, %error, "pipeline error");
                    }
                }
            }));
        }

        Self { handles }
    }

    /// Wait for every worker to exit (after the queue senders are dropped)
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
