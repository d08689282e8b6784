//! Binary entry point: wires env-driven configuration into concrete S3/SQS
//! sinks, runs startup verification, and serves the axum router.

use std::sync::Arc;

use clap::Parser;
use crash_collector::config::Config;
use crash_collector::health::HealthCheck;
use crash_collector::sink::s3_store::S3Store;
use crash_collector::sink::sqs_publish::SqsPublish;
use crash_collector::throttle::Throttler;
use crash_collector::{build_router, init_tracing, health, mover, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::parse();

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let mut s3_builder = aws_sdk_s3::config::Builder::from(&aws_config);
    if let Some(endpoint) = &config.crashstorage_endpoint_url {
        s3_builder = s3_builder.endpoint_url(endpoint.clone()).force_path_style(true);
    }
    let s3_client = aws_sdk_s3::Client::from_conf(s3_builder.build());
    let store = Arc::new(S3Store::new(s3_client, config.crashstorage_bucket_name.clone()));

    let sqs_client = aws_sdk_sqs::Client::new(&aws_config);
    let publish = Arc::new(SqsPublish::new(sqs_client, config.crashpublish_queue_url.clone()));

    let mut health_registry = health::HealthRegistry::new();
    health_registry.register(store.clone() as Arc<dyn HealthCheck>);
    health_registry.register(publish.clone() as Arc<dyn HealthCheck>);
    let health_registry = Arc::new(health_registry);

    health_registry.verify_or_halt().await?;
    health_registry
        .clone()
        .spawn_heartbeat(std::time::Duration::from_secs(config.heartbeat_interval_seconds));

    let products: Vec<&'static str> = if config.breakpad_throttler_products.is_empty() {
        crash_collector::throttle::rules::MOZILLA_PRODUCTS.to_vec()
    } else {
        config
            .breakpad_throttler_products
            .iter()
            .map(|p| &*Box::leak(p.clone().into_boxed_str()))
            .collect()
    };
    let throttler = Arc::new(Throttler::new(
        crash_collector::throttle::rules::mozilla_rules(),
        products,
    ));

    let mover_handle = mover::spawn(config.mover_config(), store, publish);
    let version = Arc::new(health::load_version_info(&config.basedir));

    let state = AppState {
        throttler,
        mover: mover_handle,
        health: health_registry,
        version,
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "crash collector listening");
    axum::serve(listener, router).await?;

    Ok(())
}
