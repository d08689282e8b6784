//! HTTP ingestion endpoint: `POST /submit`.
//!
//! Grounded bit-exact on `original_source/antenna/breakpad_resource.py`
//! (`BreakpadSubmitterResource.on_post`): extract the payload, throttle it,
//! mint or reuse a crash id, decide accept/defer/reject/fake-accept, then
//! (for accept/defer) clean up and enqueue with the crash-mover. Response
//! shape (`text/plain`, `CrashID=bp-<id>` / `Discarded=...`) is carried over
//! verbatim since breakpad clients parse it literally.

use chrono::Utc;
use tracing::info;

use crate::extractor::{self, MalformedCrashReport, RequestMeta};
use crate::id;
use crate::mover::CrashMoverHandle;
use crate::report::CrashReport;
use crate::throttle::{Decision, Throttler};

/// The plain-text body returned to the breakpad client, and the status
/// code it should be paired with.
pub struct SubmitResponse {
    pub status: u16,
    pub body: String,
}

impl SubmitResponse {
    fn ok(body: String) -> Self {
        Self { status: 200, body }
    }

    fn malformed(reason: &str) -> Self {
        metrics::counter!("malformed.count", "reason" => reason.to_string()).increment(1);
        Self {
            status: 400,
            body: format!("Discarded=malformed_{reason}"),
        }
    }
}

/// Handle a single crash submission end to end.
pub async fn submit(
    meta: RequestMeta<'_>,
    body: bytes::Bytes,
    throttler: &Throttler,
    mover: &CrashMoverHandle,
) -> SubmitResponse {
    let submitted_at = Utc::now();

    let report = match extractor::extract(meta, body).await {
        Ok(report) => report,
        Err(MalformedCrashReport(reason)) => {
            return SubmitResponse::malformed(reason.as_str());
        }
    };

    metrics::counter!("incoming_crash.count").increment(1);

    let CrashReport {
        mut annotations,
        dumps,
        payload_kind,
        payload_compressed,
        notes,
        ..
    } = report;

    annotations.insert(
        "submitted_timestamp".to_string(),
        submitted_at.to_rfc3339(),
    );
    annotations.insert(
        "payload".to_string(),
        payload_kind.map(|k| k.as_str()).unwrap_or("unknown").to_string(),
    );
    annotations.insert(
        "payload_compressed".to_string(),
        if payload_compressed { "1" } else { "0" }.to_string(),
    );
    annotations.insert("version".to_string(), "2".to_string());

    // `dump_checksums` and `collector_notes` are attached as nested JSON by
    // the store adapter at save time (spec.md §6) rather than flattened into
    // the text-only annotation map here.
    let (decision, rule_name, percentage) = throttler.throttle(&annotations);

    let crash_id = match annotations.get("uuid") {
        Some(existing) if id::validate(existing, false) => {
            info!(crash_id = %existing, "has existing crash_id");
            existing.clone()
        }
        _ => {
            let minted = id::mint(submitted_at, decision.as_throttle_digit());
            annotations.insert("uuid".to_string(), minted.clone());
            minted
        }
    };

    info!(
        crash_id = %crash_id,
        rule = %rule_name,
        decision = decision.as_text(),
        percentage,
        "throttle result"
    );
    metrics::counter!("throttle_rule.count", "rule" => rule_name.clone()).increment(1);
    metrics::counter!("throttle.count", "result" => decision.as_text().to_lowercase()).increment(1);

    match decision {
        Decision::Reject => {
            return SubmitResponse::ok(format!("Discarded=rule_{rule_name}"));
        }
        Decision::FakeAccept => {
            return SubmitResponse::ok(format!("CrashID=bp-{crash_id}\n"));
        }
        Decision::Accept | Decision::Defer => {}
    }

    let mut report = CrashReport {
        annotations,
        dumps,
        payload_kind,
        payload_compressed,
        notes,
        crash_id: crash_id.clone(),
    };
    report.strip_forbidden_annotations();

    // Enqueue and respond immediately; the store write must not hold up the
    // HTTP response (spec.md §4.5/§5). The worker logs and counts a dropped
    // save on its own (`mover::handle_job`).
    mover.enqueue(crash_id.clone(), report.annotations, report.dumps, report.notes);

    SubmitResponse::ok(format!("CrashID=bp-{crash_id}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mover::{self, MoverConfig};
    use crate::sink::memory::{MemoryPublish, MemoryStore};
    use crate::throttle::{Condition, Outcome, Rule};
    use std::sync::Arc;

    fn build_multipart_body(boundary: &str, fields: &[(&str, &str)]) -> bytes::Bytes {
        let mut buf = Vec::new();
        for (name, value) in fields {
            buf.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            buf.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n").as_bytes(),
            );
            buf.extend_from_slice(b"Content-Type: text/plain\r\n\r\n");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        bytes::Bytes::from(buf)
    }

    #[tokio::test]
    async fn accepted_crash_is_saved_and_returns_crash_id() {
        let throttler = Throttler::new(
            vec![Rule::new(
                "accept_everything",
                "*",
                Condition::Always,
                Outcome::Terminal(Decision::Accept),
            )],
            vec![],
        );
        let store = Arc::new(MemoryStore::default());
        let publish = Arc::new(MemoryPublish::default());
        let mover_handle = mover::spawn(MoverConfig::default(), store.clone(), publish);

        let boundary = "XBOUNDARY";
        let body = build_multipart_body(boundary, &[("ProductName", "Firefox")]);
        let meta = RequestMeta {
            content_type: Some(&format!("multipart/form-data; boundary={boundary}")),
            content_encoding: None,
            content_length: Some(body.len()),
        };

        let response = submit(meta, body, &throttler, &mover_handle).await;
        assert_eq!(response.status, 200);
        assert!(response.body.starts_with("CrashID=bp-"));

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(store.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejected_crash_is_discarded_without_saving() {
        let throttler = Throttler::new(
            vec![Rule::new(
                "reject_everything",
                "*",
                Condition::Always,
                Outcome::Terminal(Decision::Reject),
            )],
            vec![],
        );
        let store = Arc::new(MemoryStore::default());
        let publish = Arc::new(MemoryPublish::default());
        let mover_handle = mover::spawn(MoverConfig::default(), store.clone(), publish);

        let boundary = "XBOUNDARY";
        let body = build_multipart_body(boundary, &[("ProductName", "Firefox")]);
        let meta = RequestMeta {
            content_type: Some(&format!("multipart/form-data; boundary={boundary}")),
            content_encoding: None,
            content_length: Some(body.len()),
        };

        let response = submit(meta, body, &throttler, &mover_handle).await;
        assert_eq!(response.body, "Discarded=rule_reject_everything");

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fakeaccept_returns_crash_id_but_does_not_save() {
        let throttler = Throttler::new(
            vec![Rule::new(
                "always_fakeaccept",
                "*",
                Condition::Always,
                Outcome::Terminal(Decision::FakeAccept),
            )],
            vec![],
        );
        let store = Arc::new(MemoryStore::default());
        let publish = Arc::new(MemoryPublish::default());
        let mover_handle = mover::spawn(MoverConfig::default(), store.clone(), publish);

        let boundary = "XBOUNDARY";
        let body = build_multipart_body(boundary, &[("ProductName", "Firefox")]);
        let meta = RequestMeta {
            content_type: Some(&format!("multipart/form-data; boundary={boundary}")),
            content_encoding: None,
            content_length: Some(body.len()),
        };

        let response = submit(meta, body, &throttler, &mover_handle).await;
        assert!(response.body.starts_with("CrashID=bp-"));

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected_with_400() {
        let throttler = Throttler::mozilla();
        let store = Arc::new(MemoryStore::default());
        let publish = Arc::new(MemoryPublish::default());
        let mover_handle = mover::spawn(MoverConfig::default(), store, publish);

        let meta = RequestMeta {
            content_type: None,
            content_encoding: None,
            content_length: Some(1),
        };
        let response = submit(meta, bytes::Bytes::from_static(b"x"), &throttler, &mover_handle).await;
        assert_eq!(response.status, 400);
        assert_eq!(response.body, "Discarded=malformed_no_content_type");
    }
}
