//! Durable-storage and notification adapter contracts.
//!
//! `Store` and `Publish` are the two sinks a [`crate::mover`] hands a saved
//! crash report to. Grounded on `original_source/antenna/ext/s3/crashstorage.py`
//! (`Store`) and `original_source/antenna/ext/sqs/crashpublish.py` (`Publish`);
//! shaped as `async-trait` objects the way the teacher's `PipelineSender`
//! trait (`pipeline/sender.rs`) lets the mover stay agnostic of the concrete
//! backend.

pub mod s3_store;
pub mod sqs_publish;

use async_trait::async_trait;
use std::collections::HashMap;

/// A crash report reduced to what a sink needs: its id, annotations, dump
/// bytes keyed by (already-sanitized) dump name, and the diagnostic notes
/// accumulated during extraction and cleanup (spec.md §4.6's
/// `collector_notes`).
pub struct SinkCrash<'a> {
    pub crash_id: &'a str,
    pub annotations: &'a HashMap<String, String>,
    pub dumps: &'a HashMap<String, Vec<u8>>,
    pub notes: &'a [String],
}

/// Durable object storage for a crash report.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist dumps, the dump-name manifest, and the raw crash annotations,
    /// in that order (spec.md §6 — dumps must land before the raw crash
    /// record that references them).
    async fn save(&self, crash: SinkCrash<'_>) -> anyhow::Result<()>;

    /// Round-trip a small canary object through the backend; called once at
    /// startup so misconfiguration fails fast instead of on the first crash.
    async fn verify_write(&self) -> anyhow::Result<()>;

    async fn check_health(&self) -> anyhow::Result<()>;
}

/// Notification queue a saved crash id is announced on.
#[async_trait]
pub trait Publish: Send + Sync {
    async fn publish(&self, crash_id: &str) -> anyhow::Result<()>;

    /// Confirm the configured queue/topic exists and is reachable.
    async fn verify_topic(&self) -> anyhow::Result<()>;

    async fn check_health(&self) -> anyhow::Result<()>;
}
