//! Bounded ingestion queue.
//!
//! A single-producer, single-consumer channel between the file-watcher
//! collaborator and the pipeline worker. The channel is bounded, and
//! [`IngestQueue::enqueue`] blocks when it is full — that blocking *is* the
//! backpressure contract. The worker drains requests serially on its own
//! thread and honors the pipeline's shutdown flag.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::error::IngestError;
use crate::pipeline::{IngestPipeline, IngestRequest};

/// Producer half: hand this to the watcher collaborator.
#[derive(Clone)]
pub struct IngestQueue {
    tx: flume::Sender<IngestRequest>,
}

impl IngestQueue {
    /// Enqueue a request, blocking while the queue is full.
    pub fn enqueue(&self, req: IngestRequest) -> Result<(), IngestError> {
        self.tx.send(req).map_err(|_| IngestError::ShuttingDown)
    }

    /// Non-blocking variant; `false` means the queue was full.
    pub fn try_enqueue(&self, req: IngestRequest) -> Result<bool, IngestError> {
        match self.tx.try_send(req) {
            Ok(()) => Ok(true),
            Err(flume::TrySendError::Full(_)) => Ok(false),
            Err(flume::TrySendError::Disconnected(_)) => Err(IngestError::ShuttingDown),
        }
    }

    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// Consumer half: owns the worker thread.
pub struct IngestWorker {
    handle: JoinHandle<()>,
    pipeline: Arc<IngestPipeline>,
}

impl IngestWorker {
    /// Signal shutdown and wait for the worker to drain. In-flight window
    /// transactions finish; everything still queued is dropped.
    pub fn shutdown(self) {
        self.pipeline.shutdown_flag().store(true, Ordering::Relaxed);
        let _ = self.handle.join();
    }
}

/// Spawn the queue worker. `capacity` bounds how many requests may wait.
pub fn spawn_queue(
    pipeline: Arc<IngestPipeline>,
    capacity: usize,
) -> (IngestQueue, IngestWorker) {
    let (tx, rx) = flume::bounded::<IngestRequest>(capacity.max(1));
    let worker_pipeline = pipeline.clone();
    let shutdown = pipeline.shutdown_flag();
    let handle = std::thread::Builder::new()
        .name("anchor-ingest".to_string())
        .spawn(move || {
            info!("ingest_worker_started");
            loop {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                match rx.recv_timeout(std::time::Duration::from_millis(100)) {
                    Ok(req) => {
                        let source = req.source.clone();
                        if let Err(err) = worker_pipeline.ingest(req) {
                            warn!(source = %source, error = %err, "queued_ingest_failed");
                        }
                    }
                    Err(flume::RecvTimeoutError::Timeout) => continue,
                    Err(flume::RecvTimeoutError::Disconnected) => break,
                }
            }
            info!("ingest_worker_stopped");
        })
        .expect("spawn ingest worker");

    (IngestQueue { tx }, IngestWorker { handle, pipeline })
}
