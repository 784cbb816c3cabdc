//! Consume loop: poll, split, submit, stage and commit offsets.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use rdkafka::consumer::{CommitMode, StreamConsumer};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use esbridge_elastic::{stream_updates, ElasticCluster};

use crate::kafka::{self, TopicPartition, MAX_POLL_RECORDS, POLL_TIMEOUT};
use crate::metrics::BridgeMetrics;
use crate::record::RecordValidator;
use crate::routes::RouteCache;
use crate::split::split_by_cluster;

/// Staged offsets are committed at most this often.
const OFFSET_COMMIT_INTERVAL: Duration = Duration::from_secs(60);

/// Run the bridge until a shutdown signal or an unrecoverable error.
///
/// Offsets for a partition are staged only once the whole poll batch has
/// been handed to the bulk API, so anything committed was submitted at
/// least once. On the way out, staged offsets are flushed with a
/// synchronous commit; the consumer closes on drop whether or not that
/// final commit succeeds.
///
/// Connection-level errors propagate and take the process down; the
/// supervisor restarts it and the consumer-group rebalance moves
/// partitions to a healthy instance.
pub async fn run(
    consumer: StreamConsumer,
    clusters: Vec<ElasticCluster>,
    validator: RecordValidator,
    metrics: BridgeMetrics,
) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut routes = RouteCache::new();
    let mut staged: HashMap<TopicPartition, i64> = HashMap::new();
    let mut last_commit: Option<Instant> = None;

    let result: Result<()> = async {
        loop {
            let commit_due = last_commit.map_or(true, |at| at.elapsed() >= OFFSET_COMMIT_INTERVAL);
            if !staged.is_empty() && commit_due {
                kafka::commit_offsets(&consumer, &staged, CommitMode::Async)?;
                last_commit = Some(Instant::now());
                staged.clear();
            }

            let batch = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                    return Ok(());
                }
                _ = sigterm.recv() => {
                    info!("Terminated, shutting down");
                    return Ok(());
                }
                polled = kafka::poll_batch(&consumer, MAX_POLL_RECORDS, POLL_TIMEOUT) => polled?,
            };
            // Did the poll time out?
            if batch.is_empty() {
                continue;
            }
            metrics.records.inc_by(batch.record_count() as u64);

            // Figure out where everything goes.
            let table = routes.get(&clusters).await?;
            let split = split_by_cluster(&batch, &table, &validator, &metrics);

            // Send to the clusters, one at a time. A slow cluster stalls
            // the whole batch.
            let started = Instant::now();
            for (cluster, requests) in clusters.iter().zip(&split) {
                if requests.is_empty() {
                    continue;
                }
                for outcome in stream_updates(cluster, requests).await? {
                    metrics.bulk_outcome(outcome);
                }
            }
            metrics.submit_batch.observe(started.elapsed().as_secs_f64());

            // Record the work as done, to be committed on the next cycle.
            for (tp, next_offset) in batch.next_offsets() {
                staged.insert(tp.clone(), next_offset);
            }
        }
    }
    .await;

    if !staged.is_empty() {
        match kafka::commit_offsets(&consumer, &staged, CommitMode::Sync) {
            Ok(()) => {}
            Err(error) if result.is_ok() => return Err(error.into()),
            Err(error) => warn!("Failed to commit offsets during shutdown: {}", error),
        }
    }
    result
}
