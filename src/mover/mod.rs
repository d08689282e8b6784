//! The crash-mover: a bounded worker pool that saves extracted crash reports
//! to a [`Store`] and announces them on a [`Publish`] queue.
//!
//! Grounded on `original_source/antenna/crashmover.py` (`CrashMover`,
//! `handle_crashreport`): save is attempted with retries; if it still fails
//! after `max_attempts`, the crash is dropped entirely. Publish is retried
//! independently, but a publish failure after `max_attempts` does *not* drop
//! the crash — it was already durably saved, so the id is left to be
//! recovered by an out-of-band resubmission (spec.md §4.5). The worker-pool
//! shape (bounded `mpsc` channel, fixed task set draining it) follows the
//! teacher's `PipelineClient` batching loop (`pipeline/client.rs`).

pub mod retry;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::sink::{Publish, SinkCrash, Store};
use retry::{with_retry, RetryConfig};

/// A crash report ready to be handed to storage and the publish queue.
pub struct MoveJob {
    pub crash_id: String,
    pub annotations: HashMap<String, String>,
    pub dumps: HashMap<String, Vec<u8>>,
    pub notes: Vec<String>,
    /// Signalled once the save phase completes (or is dropped), mirroring
    /// `handle_crashreport`'s return value: `true` iff the crash was saved,
    /// regardless of whether publish also succeeded.
    pub done: Option<oneshot::Sender<bool>>,
}

/// Handle used by the HTTP layer to enqueue crash reports without blocking
/// on the save/publish round trip.
#[derive(Clone)]
pub struct CrashMoverHandle {
    tx: mpsc::Sender<MoveJob>,
}

impl CrashMoverHandle {
    /// Enqueue a job, waiting for the save phase (but not publish) to settle.
    ///
    /// Returns `true` if the crash was durably saved. Returns `false` if the
    /// queue was full and the job had to be dropped outright (spec.md
    /// §4.5's overload behavior), or if the save phase exhausted its
    /// retries.
    pub async fn submit(
        &self,
        crash_id: String,
        annotations: HashMap<String, String>,
        dumps: HashMap<String, Vec<u8>>,
        notes: Vec<String>,
    ) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        let job = MoveJob {
            crash_id,
            annotations,
            dumps,
            notes,
            done: Some(done_tx),
        };

        if self.tx.try_send(job).is_err() {
            metrics::counter!("crashmover_queue_full.count").increment(1);
            return false;
        }

        done_rx.await.unwrap_or(false)
    }

    /// Enqueue a job without waiting for save or publish to settle. This is
    /// the path the HTTP handler uses: the client gets its `CrashID=` response
    /// as soon as the job is queued, and the worker pool reports success or
    /// failure later purely through logging and metrics (spec.md §4.5/§5 —
    /// the store write must not block the response).
    pub fn enqueue(
        &self,
        crash_id: String,
        annotations: HashMap<String, String>,
        dumps: HashMap<String, Vec<u8>>,
        notes: Vec<String>,
    ) {
        let job = MoveJob {
            crash_id: crash_id.clone(),
            annotations,
            dumps,
            notes,
            done: None,
        };

        if self.tx.try_send(job).is_err() {
            metrics::counter!("crashmover_queue_full.count").increment(1);
            tracing::error!(crash_id = %crash_id, "crash-mover queue full; dropped");
        }
    }
}

/// Configuration for the worker pool.
#[derive(Clone)]
pub struct MoverConfig {
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub save_retry: RetryConfig,
    pub publish_retry: RetryConfig,
}

impl Default for MoverConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            worker_count: 1,
            save_retry: RetryConfig::default(),
            publish_retry: RetryConfig::default(),
        }
    }
}

/// Spawn the worker pool and return a handle for enqueuing jobs.
///
/// Each worker pulls from the same `mpsc::Receiver` behind a shared mutex,
/// so jobs are load-balanced across workers with no further coordination.
pub fn spawn(
    config: MoverConfig,
    store: Arc<dyn Store>,
    publish: Arc<dyn Publish>,
) -> CrashMoverHandle {
    let (tx, rx) = mpsc::channel(config.queue_capacity);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    for worker_id in 0..config.worker_count.max(1) {
        let rx = rx.clone();
        let store = store.clone();
        let publish = publish.clone();
        let config = config.clone();
        tokio::spawn(async move {
            loop {
                let job = {
                    let mut rx = rx.lock().await;
                    rx.recv().await
                };
                let Some(job) = job else {
                    tracing::debug!(worker_id, "crash-mover worker shutting down");
                    break;
                };
                handle_job(&config, &store, &publish, job).await;
            }
        });
    }

    CrashMoverHandle { tx }
}

async fn handle_job(config: &MoverConfig, store: &Arc<dyn Store>, publish: &Arc<dyn Publish>, mut job: MoveJob) {
    let crash_id = job.crash_id.clone();
    let saved = save_with_retry(&config.save_retry, store, &job).await;

    if !saved {
        tracing::error!(crash_id = %crash_id, "too many errors trying to save; dropped");
        metrics::counter!("save_crash_dropped.count").increment(1);
        if let Some(done) = job.done.take() {
            let _ = done.send(false);
        }
        return;
    }

    if let Some(done) = job.done.take() {
        let _ = done.send(true);
    }

    let published = publish_with_retry(&config.publish_retry, publish, &crash_id).await;
    if published {
        metrics::counter!("save_crash.count").increment(1);
    } else {
        tracing::error!(crash_id = %crash_id, "too many errors trying to publish; dropped");
        metrics::counter!("publish_crash_dropped.count").increment(1);
    }
}

async fn save_with_retry(config: &RetryConfig, store: &Arc<dyn Store>, job: &MoveJob) -> bool {
    let result = with_retry(config, || async {
        store
            .save(SinkCrash {
                crash_id: &job.crash_id,
                annotations: &job.annotations,
                dumps: &job.dumps,
                notes: &job.notes,
            })
            .await
            .map_err(|e| {
                metrics::counter!("save_crash_exception.count").increment(1);
                e
            })
    })
    .await;

    match result {
        Ok(()) => {
            tracing::info!(crash_id = %job.crash_id, "saved");
            true
        }
        Err(_) => false,
    }
}

async fn publish_with_retry(config: &RetryConfig, publish: &Arc<dyn Publish>, crash_id: &str) -> bool {
    let result = with_retry(config, || async {
        publish.publish(crash_id).await.map_err(|e| {
            metrics::counter!("publish_crash_exception.count").increment(1);
            e
        })
    })
    .await;

    match result {
        Ok(()) => {
            tracing::info!(crash_id = %crash_id, "published");
            true
        }
        Err(_) => false,
    }
}
