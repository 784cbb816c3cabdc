//! esbridged binary, a bridge daemon streaming partial document updates
//! from kafka into elasticsearch through a noop-aware scripted bulk update.

mod config;
mod consumer;
mod exposition;
mod kafka;
mod metrics;
mod record;
mod routes;
mod split;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rdkafka::consumer::Consumer;
use tracing::{error, info};

use config::Config;
use exposition::Readiness;
use metrics::BridgeMetrics;
use record::RecordValidator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::parse();

    let bridge_metrics = BridgeMetrics::new();
    let readiness = Arc::new(Readiness::default());

    // The exposition endpoint is best-effort; a failed bind costs scrapes
    // and probes, not updates.
    {
        let port = config.metrics_port;
        let metrics = bridge_metrics.clone();
        let readiness = readiness.clone();
        tokio::spawn(async move {
            if let Err(err) = exposition::serve(port, metrics, readiness).await {
                error!("Metrics exposition failed: {err:#}");
            }
        });
    }

    // Each bootstrap host must answer as a distinct cluster.
    let clusters = esbridge_elastic::connect_all(&config.es_clusters).await?;
    let validator = RecordValidator::new()?;

    let consumer = kafka::build_consumer(&config)?;
    info!("Subscribing to: {}", config.topics.join(", "));
    let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
    consumer.subscribe(&topics)?;
    readiness.mark_consuming(
        clusters
            .iter()
            .map(|cluster| cluster.name().to_string())
            .collect(),
    );

    // Run the consume loop (blocks until signal or error)
    consumer::run(consumer, clusters, validator, bridge_metrics).await
}
