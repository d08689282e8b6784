//! Environment-driven configuration, grounded in the teacher's
//! `clap`-derive CLI config (`cli/config.rs`'s serde/env loading pattern)
//! and the `CRASHMOVER_*`/`BREAKPAD_THROTTLER_*` keys spec.md §6 names.

use std::time::Duration;

use clap::Parser;

use crate::mover::retry::RetryConfig;
use crate::mover::MoverConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "crash-collector")]
#[command(about = "HTTP ingestion endpoint for native crash reports")]
#[command(version)]
pub struct Config {
    /// Address the HTTP server binds to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0:8000")]
    pub bind_addr: String,

    /// S3 bucket crash artifacts are written to.
    #[arg(long, env = "CRASHMOVER_CRASHSTORAGE_BUCKET_NAME")]
    pub crashstorage_bucket_name: String,

    /// Override the S3 endpoint (for S3-compatible stores in dev/test).
    #[arg(long, env = "CRASHMOVER_CRASHSTORAGE_ENDPOINT_URL")]
    pub crashstorage_endpoint_url: Option<String>,

    #[arg(long, env = "CRASHMOVER_CRASHSTORAGE_REGION", default_value = "us-west-2")]
    pub crashstorage_region: String,

    /// SQS queue URL crash ids are published to.
    #[arg(long, env = "CRASHMOVER_CRASHPUBLISH_QUEUE_NAME")]
    pub crashpublish_queue_url: String,

    #[arg(long, env = "CRASHMOVER_MAX_ATTEMPTS", default_value_t = 5)]
    pub crashmover_max_attempts: u32,

    #[arg(long, env = "CRASHMOVER_RETRY_SLEEP_SECONDS", default_value_t = 2)]
    pub crashmover_retry_sleep_seconds: u64,

    /// Number of crash-mover workers draining the save/publish queue.
    #[arg(long, env = "CRASHMOVER_WORKER_COUNT", default_value_t = 1)]
    pub crashmover_worker_count: usize,

    /// Bounded queue capacity between the HTTP handler and the workers.
    #[arg(long, env = "CRASHMOVER_QUEUE_CAPACITY", default_value_t = 256)]
    pub crashmover_queue_capacity: usize,

    /// Named product allow-list; "*" accepts everything.
    #[arg(long, env = "BREAKPAD_THROTTLER_PRODUCTS", value_delimiter = ',')]
    pub breakpad_throttler_products: Vec<String>,

    #[arg(long, env = "HEARTBEAT_INTERVAL_SECONDS", default_value_t = 10)]
    pub heartbeat_interval_seconds: u64,

    /// Base directory `version.json` is read from for `/__version__`.
    #[arg(long, env = "BASEDIR", default_value = ".")]
    pub basedir: std::path::PathBuf,
}

impl Config {
    pub fn mover_config(&self) -> MoverConfig {
        let retry = RetryConfig {
            max_attempts: self.crashmover_max_attempts,
            delay: Duration::from_secs(self.crashmover_retry_sleep_seconds),
        };
        MoverConfig {
            queue_capacity: self.crashmover_queue_capacity,
            worker_count: self.crashmover_worker_count,
            save_retry: retry.clone(),
            publish_retry: retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_and_defaulted_fields() {
        let config = Config::parse_from([
            "crash-collector",
            "--crashstorage-bucket-name",
            "crashes",
            "--crashpublish-queue-url",
            "https://sqs.example/queue",
        ]);
        assert_eq!(config.crashstorage_bucket_name, "crashes");
        assert_eq!(config.crashmover_max_attempts, 5);
        assert_eq!(config.crashmover_worker_count, 1);
    }

    #[test]
    fn mover_config_applies_fixed_retry_from_env() {
        let config = Config::parse_from([
            "crash-collector",
            "--crashstorage-bucket-name",
            "crashes",
            "--crashpublish-queue-url",
            "https://sqs.example/queue",
            "--crashmover-max-attempts",
            "7",
            "--crashmover-retry-sleep-seconds",
            "3",
        ]);
        let mover = config.mover_config();
        assert_eq!(mover.save_retry.max_attempts, 7);
        assert_eq!(mover.save_retry.delay, Duration::from_secs(3));
    }
}
