//! S3-backed [`Store`], bit-exact with `original_source/antenna/ext/s3/crashstorage.py`.
//!
//! Object layout (spec.md §6, ported from `S3CrashStorage.get_crash_storage_object_key`):
//!   - `v1/dump_names/<crash_id>`        — JSON array of dump names
//!   - `v1/<dump_name>/<crash_id>`       — raw dump bytes, one object per dump
//!     (`upload_file_minidump` is rewritten to `dump` in the object key only)
//!   - `v1/raw_crash/<YYMMDD>/<crash_id>` — the annotation map as JSON
//!
//! Dumps and the dump-name manifest are written before the raw crash record,
//! so a reader that finds `raw_crash/...` can assume its dumps already exist.

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sha2::{Digest, Sha256};

use crate::health::HealthCheck;
use crate::id;
use crate::sink::{SinkCrash, Store};

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Build the raw-crash JSON document: annotations plus the `dump_checksums`
/// and `collector_notes` metadata, with top-level keys sorted
/// lexicographically (spec.md §6).
fn build_raw_crash_document(crash: &SinkCrash<'_>) -> anyhow::Result<BTreeMap<String, serde_json::Value>> {
    let mut doc: BTreeMap<String, serde_json::Value> = crash
        .annotations
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    let dump_checksums: BTreeMap<&str, String> = crash
        .dumps
        .iter()
        .map(|(name, bytes)| (name.as_str(), sha256_hex(bytes)))
        .collect();
    doc.insert("dump_checksums".to_string(), serde_json::to_value(&dump_checksums)?);
    doc.insert("collector_notes".to_string(), serde_json::to_value(crash.notes)?);
    Ok(doc)
}

/// Rewrites applied to dump names when computing the object key. The stored
/// `dump_names` manifest still lists the original (sanitized) field name.
/// `original_source/antenna/ext/s3/crashstorage.py`'s
/// `get_crash_storage_object_key` rewrites both the canonical minidump field
/// and the empty name (a dump submitted with no `name` part at all) to
/// `dump`.
fn object_dump_name(dump_name: &str) -> &str {
    match dump_name {
        "" | "upload_file_minidump" => "dump",
        other => other,
    }
}

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    fn dump_names_key(crash_id: &str) -> String {
        format!("v1/dump_names/{crash_id}")
    }

    fn dump_key(dump_name: &str, crash_id: &str) -> String {
        format!("v1/{}/{crash_id}", object_dump_name(dump_name))
    }

    fn raw_crash_key(crash_id: &str) -> String {
        format!("v1/raw_crash/{}/{crash_id}", id::date_of(crash_id))
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for S3Store {
    async fn save(&self, crash: SinkCrash<'_>) -> anyhow::Result<()> {
        for (dump_name, bytes) in crash.dumps {
            self.put_object(&Self::dump_key(dump_name, crash.crash_id), bytes.clone())
                .await?;
        }

        // Keys sorted lexicographically (spec.md §6), even when empty.
        let mut dump_names: Vec<&str> = crash.dumps.keys().map(String::as_str).collect();
        dump_names.sort_unstable();
        let manifest = serde_json::to_vec(&dump_names)?;
        self.put_object(&Self::dump_names_key(crash.crash_id), manifest)
            .await?;

        let doc = build_raw_crash_document(&crash)?;
        let raw_crash = serde_json::to_vec(&doc)?;
        self.put_object(&Self::raw_crash_key(crash.crash_id), raw_crash)
            .await?;

        Ok(())
    }

    async fn verify_write(&self) -> anyhow::Result<()> {
        let key = format!("test/testfile-{}", uuid::Uuid::new_v4());
        self.put_object(&key, b"test".to_vec()).await?;
        self.client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await?;
        Ok(())
    }

    async fn check_health(&self) -> anyhow::Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await?;
        Ok(())
    }
}

#[async_trait]
impl HealthCheck for S3Store {
    fn name(&self) -> &'static str {
        "crashstorage"
    }

    async fn check_health(&self) -> anyhow::Result<()> {
        Store::check_health(self).await
    }
}
