//! HTTP ingestion endpoint for breakpad-style native crash reports:
//! extraction, throttling, crash-id minting, and handoff to a durable
//! store and notification queue via a bounded-concurrency crash-mover.

pub mod config;
pub mod extractor;
pub mod handler;
pub mod health;
pub mod id;
pub mod mover;
pub mod native;
pub mod report;
pub mod sink;
pub mod throttle;

pub use native::{build_router, init_tracing, AppState};
