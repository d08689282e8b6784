//! Multipart crash-report extraction.
//!
//! Parses an HTTP POST body (optionally gzip-framed) into a [`CrashReport`].
//! Grounded on the teacher's gzip handling
//! (`handler::decompress_if_gzipped` in the upstream OTLP ingestion worker)
//! and on `multer` — the same multipart engine axum's own `Multipart`
//! extractor wraps — driven directly over the already-decompressed body.

mod sanitize;

pub use sanitize::sanitize_dump_name;

use bytes::Bytes;
use flate2::read::GzDecoder;
use futures::stream;
use multer::{Constraints, Multipart, SizeLimit};
use std::io::Read;

use crate::report::{CrashReport, PayloadKind};

/// Per-part buffer ceiling (spec: 20 MiB).
const MAX_PART_SIZE: usize = 20 * 1024 * 1024;

/// Machine-readable reason a crash report was rejected as malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    NoContentType,
    WrongContentType,
    NoBoundary,
    NoContentLength,
    BadGzip,
    InvalidJson,
    InvalidJsonValue,
    InvalidAnnotationValue,
    InvalidPayloadStructure,
    NoAnnotations,
    HasJsonAndKv,
}

impl MalformedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MalformedReason::NoContentType => "no_content_type",
            MalformedReason::WrongContentType => "wrong_content_type",
            MalformedReason::NoBoundary => "no_boundary",
            MalformedReason::NoContentLength => "no_content_length",
            MalformedReason::BadGzip => "bad_gzip",
            MalformedReason::InvalidJson => "invalid_json",
            MalformedReason::InvalidJsonValue => "invalid_json_value",
            MalformedReason::InvalidAnnotationValue => "invalid_annotation_value",
            MalformedReason::InvalidPayloadStructure => "invalid_payload_structure",
            MalformedReason::NoAnnotations => "no_annotations",
            MalformedReason::HasJsonAndKv => "has_json_and_kv",
        }
    }
}

#[derive(Debug)]
pub struct MalformedCrashReport(pub MalformedReason);

impl std::fmt::Display for MalformedCrashReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed crash report: {}", self.0.as_str())
    }
}

impl std::error::Error for MalformedCrashReport {}

/// The headers this module needs off the inbound request, already lowercased
/// by the caller (an axum `HeaderMap` or a test double).
pub struct RequestMeta<'a> {
    pub content_type: Option<&'a str>,
    pub content_encoding: Option<&'a str>,
    pub content_length: Option<usize>,
}

fn parse_content_type(content_type: &str) -> Result<(&str, &str), MalformedCrashReport> {
    let mut parts = content_type.splitn(2, ';');
    let base = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim();

    if base != "multipart/form-data" && base != "multipart/mixed" {
        return Err(MalformedCrashReport(MalformedReason::WrongContentType));
    }

    let boundary = rest
        .split(';')
        .map(str::trim)
        .find_map(|p| p.strip_prefix("boundary="))
        .ok_or(MalformedCrashReport(MalformedReason::NoBoundary))?;

    Ok((base, boundary.trim_matches('"')))
}

fn decompress_gzip(body: Bytes) -> Result<Bytes, MalformedCrashReport> {
    let mut decoder = GzDecoder::new(body.as_ref());
    let mut out = Vec::with_capacity(body.len().saturating_mul(2));
    decoder
        .read_to_end(&mut out)
        .map_err(|_| MalformedCrashReport(MalformedReason::BadGzip))?;
    Ok(Bytes::from(out))
}

/// Extract a [`CrashReport`] from a request body per spec: decompress if
/// gzipped, then walk the multipart parts.
pub async fn extract(meta: RequestMeta<'_>, body: Bytes) -> Result<CrashReport, MalformedCrashReport> {
    let content_type = meta
        .content_type
        .ok_or(MalformedCrashReport(MalformedReason::NoContentType))?;
    let (_, boundary) = parse_content_type(content_type)?;

    let content_length = meta.content_length.unwrap_or(0);
    if content_length == 0 {
        return Err(MalformedCrashReport(MalformedReason::NoContentLength));
    }

    let is_gzipped = meta
        .content_encoding
        .map(|v| v.eq_ignore_ascii_case("gzip"))
        .unwrap_or(false);

    let mut report = CrashReport::new();
    let body = if is_gzipped {
        report.payload_compressed = true;
        decompress_gzip(body)?
    } else {
        body
    };

    let constraints = Constraints::new().size_limit(SizeLimit::new().per_field(MAX_PART_SIZE as u64));
    let stream = stream::once(async move { Ok::<_, std::io::Error>(body) });
    let mut multipart = Multipart::with_constraints(stream, boundary, constraints);

    let mut has_json = false;
    let mut has_kvpairs = false;

    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|_| MalformedCrashReport(MalformedReason::InvalidPayloadStructure))?;
        let Some(field) = field else { break };

        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(|m| m.to_string());

        if content_type
            .as_deref()
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false)
        {
            has_json = true;
            let bytes = field
                .bytes()
                .await
                .map_err(|_| MalformedCrashReport(MalformedReason::InvalidPayloadStructure))?;
            let parsed: serde_json::Value = serde_json::from_slice(&bytes)
                .map_err(|_| MalformedCrashReport(MalformedReason::InvalidJson))?;
            let serde_json::Value::Object(map) = parsed else {
                return Err(MalformedCrashReport(MalformedReason::InvalidJsonValue));
            };
            report.annotations.clear();
            for (k, v) in map {
                let text = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                report.annotations.insert(k, text);
            }
        } else if content_type
            .as_deref()
            .map(|ct| ct.starts_with("text/plain"))
            .unwrap_or(false)
            && file_name.is_none()
        {
            has_kvpairs = true;
            let bytes = field
                .bytes()
                .await
                .map_err(|_| MalformedCrashReport(MalformedReason::InvalidAnnotationValue))?;
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|_| MalformedCrashReport(MalformedReason::InvalidAnnotationValue))?;
            report.annotations.insert(name, text);
        } else {
            if content_type.as_deref() != Some("application/octet-stream") {
                report.notes.push(format!(
                    "unknown content type for dump {name}: {}",
                    content_type.as_deref().unwrap_or("none")
                ));
            }
            let sanitized = sanitize_dump_name(&name);
            let bytes = field
                .bytes()
                .await
                .map_err(|_| MalformedCrashReport(MalformedReason::InvalidPayloadStructure))?;
            report.dumps.insert(sanitized, bytes.to_vec());
        }
    }

    if report.annotations.is_empty() {
        return Err(MalformedCrashReport(MalformedReason::NoAnnotations));
    }

    if has_json && has_kvpairs {
        return Err(MalformedCrashReport(MalformedReason::HasJsonAndKv));
    }

    report.payload_kind = Some(if has_json {
        PayloadKind::Json
    } else {
        PayloadKind::Multipart
    });

    Ok(report)
}
