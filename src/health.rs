//! Health and heartbeat endpoints.
//!
//! Grounded on `original_source/antenna/health_resource.py` (routes and
//! status codes) and `original_source/antenna/heartbeat.py` (the
//! verify-at-startup / beat-on-interval shape). Per the REDESIGN FLAG in
//! spec.md §9, the original's module-level mutable registration sets
//! (`_registered_verify`, `_registered_hb_funs`) are replaced with an
//! explicit [`HealthRegistry`] value threaded through the app, rather than
//! global state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Serialize;
use tracing::{error, info, warn};

/// A component that can be asked for its health, the way `Store`/`Publish`
/// sinks (and anything else with a `check_health`) report theirs.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &'static str;
    async fn check_health(&self) -> anyhow::Result<()>;
}

/// Accumulated health state for a single `/__heartbeat__` pass, mirroring
/// `HealthState.to_dict()` (an `errors` list plus an `info` gauge map, no
/// early return on the first failure so every component gets to report).
#[derive(Debug, Default, Serialize)]
pub struct HealthState {
    pub errors: Vec<HealthError>,
    pub info: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct HealthError {
    pub name: String,
    pub msg: String,
}

impl HealthState {
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The set of components whose health gates startup and `/__heartbeat__`.
#[derive(Clone, Default)]
pub struct HealthRegistry {
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, check: Arc<dyn HealthCheck>) {
        self.checks.push(check);
    }

    /// Run every registered check and fold the results into a [`HealthState`].
    /// A passing component reports itself in `info` (mirroring the upstream
    /// statsd gauge dict); a failing one is recorded in `errors` instead.
    pub async fn check_all(&self) -> HealthState {
        let mut state = HealthState::default();
        for check in &self.checks {
            match check.check_health().await {
                Ok(()) => {
                    state
                        .info
                        .insert(check.name().to_string(), serde_json::json!("ok"));
                }
                Err(e) => {
                    state.errors.push(HealthError {
                        name: check.name().to_string(),
                        msg: e.to_string(),
                    });
                }
            }
        }
        state
    }

    /// Run every check once and fail hard if any component is unhealthy.
    /// Called at startup so misconfiguration is fatal before the first
    /// request is served (spec.md §4.7).
    pub async fn verify_or_halt(&self) -> anyhow::Result<()> {
        info!("verification starting");
        let state = self.check_all().await;
        if !state.is_healthy() {
            for err in &state.errors {
                error!(component = %err.name, error = %err.msg, "startup verification failed");
            }
            anyhow::bail!("{} component(s) failed startup verification", state.errors.len());
        }
        info!("verification complete: everything is good");
        Ok(())
    }

    /// Spawn the periodic heartbeat loop. Runs until the process exits;
    /// failures are logged, never panic the task (mirrors
    /// `HeartbeatManager.heartbeat`'s exception-swallowing `_heartbeat_beat_once`).
    pub fn spawn_heartbeat(self: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let state = self.check_all().await;
                if !state.is_healthy() {
                    for err in &state.errors {
                        warn!(component = %err.name, error = %err.msg, "heartbeat check failed");
                    }
                }
            }
        });
    }
}

pub async fn heartbeat(registry: Arc<HealthRegistry>) -> impl IntoResponse {
    let state = registry.check_all().await;
    let status = if state.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(state))
}

pub async fn lb_heartbeat() -> impl IntoResponse {
    StatusCode::OK
}

/// Load `version.json` from `basedir`, mirroring `libdockerflow.get_version_info`:
/// missing file, unreadable file, or malformed JSON all fall back to `{}`
/// rather than failing the request.
pub fn load_version_info(basedir: &std::path::Path) -> serde_json::Value {
    let path = basedir.join("version.json");
    std::fs::read_to_string(path)
        .ok()
        .and_then(|contents| serde_json::from_str(&contents).ok())
        .unwrap_or_else(|| serde_json::json!({}))
}

pub async fn broken() -> impl IntoResponse {
    metrics::counter!("collector_health_broken.count").increment(1);
    panic!("intentional exception");
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysOk;
    #[async_trait]
    impl HealthCheck for AlwaysOk {
        fn name(&self) -> &'static str {
            "always_ok"
        }
        async fn check_health(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct AlwaysFails;
    #[async_trait]
    impl HealthCheck for AlwaysFails {
        fn name(&self) -> &'static str {
            "always_fails"
        }
        async fn check_health(&self) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
    }

    #[tokio::test]
    async fn healthy_registry_has_no_errors() {
        let mut registry = HealthRegistry::new();
        registry.register(Arc::new(AlwaysOk));
        let state = registry.check_all().await;
        assert!(state.is_healthy());
        assert_eq!(state.info["always_ok"], serde_json::json!("ok"));
        assert!(registry.verify_or_halt().await.is_ok());
    }

    #[tokio::test]
    async fn unhealthy_component_surfaces_in_errors_and_fails_verify() {
        let mut registry = HealthRegistry::new();
        registry.register(Arc::new(AlwaysOk));
        registry.register(Arc::new(AlwaysFails));

        let state = registry.check_all().await;
        assert!(!state.is_healthy());
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].name, "always_fails");
        assert_eq!(state.info["always_ok"], serde_json::json!("ok"));
        assert!(!state.info.contains_key("always_fails"));

        assert!(registry.verify_or_halt().await.is_err());
    }

    #[test]
    fn missing_version_json_falls_back_to_empty_object() {
        let dir = std::env::temp_dir().join("crash-collector-health-test-missing");
        let info = load_version_info(&dir);
        assert_eq!(info, serde_json::json!({}));
    }

    #[test]
    fn version_json_is_parsed_when_present() {
        let dir = std::env::temp_dir().join(format!(
            "crash-collector-health-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("version.json"), r#"{"version":"1.2.3","commit":"abc123"}"#).unwrap();

        let info = load_version_info(&dir);
        assert_eq!(info["version"], "1.2.3");
        assert_eq!(info["commit"], "abc123");

        std::fs::remove_dir_all(&dir).ok();
    }
}
