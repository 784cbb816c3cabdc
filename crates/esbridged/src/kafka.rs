//! Kafka consumer construction, batch polling and offset commits.

use std::collections::HashMap;
use std::time::Duration;

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};

use crate::config::Config;

/// Upper bound on records returned by one poll. Update requests are tiny
/// and compress well, so a full batch is still only a few hundred KB.
pub const MAX_POLL_RECORDS: usize = 2000;

/// How long a poll waits for the first record before returning empty.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Once a batch has started, how long to wait for further records.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

pub type TopicPartition = (String, i32);

/// One consumed record, reduced to what the bridge needs. A tombstone
/// (absent payload) becomes an empty body and is dropped downstream as
/// malformed.
#[derive(Debug)]
pub struct RawRecord {
    pub payload: Vec<u8>,
    pub offset: i64,
}

/// A poll response: per-partition record lists in consumption order.
#[derive(Debug, Default)]
pub struct PollBatch {
    pub records: HashMap<TopicPartition, Vec<RawRecord>>,
}

impl PollBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// Next offset to consume per polled partition: one past the last
    /// record of this batch.
    pub fn next_offsets(&self) -> impl Iterator<Item = (&TopicPartition, i64)> {
        self.records
            .iter()
            .filter_map(|(tp, records)| records.last().map(|record| (tp, record.offset + 1)))
    }
}

/// Build the consumer: commits are manual, performed for each poll batch
/// after elasticsearch has processed it; a lost group offset replays from
/// the earliest retained record.
pub fn build_consumer(config: &Config) -> KafkaResult<StreamConsumer> {
    ClientConfig::new()
        .set("bootstrap.servers", &config.brokers)
        .set("group.id", &config.group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .create()
}

/// Poll up to `max_records`, waiting at most `timeout` for the first one.
///
/// After a record arrives, only immediately available records are drained
/// so a slow trickle does not hold a batch open.
pub async fn poll_batch(
    consumer: &StreamConsumer,
    max_records: usize,
    timeout: Duration,
) -> Result<PollBatch, KafkaError> {
    let mut batch = PollBatch::default();
    let mut wait = timeout;
    while batch.record_count() < max_records {
        let message = match tokio::time::timeout(wait, consumer.recv()).await {
            Ok(received) => received?,
            Err(_) => break,
        };
        let record = RawRecord {
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            offset: message.offset(),
        };
        batch
            .records
            .entry((message.topic().to_string(), message.partition()))
            .or_default()
            .push(record);
        wait = DRAIN_TIMEOUT;
    }
    Ok(batch)
}

/// Commit staged next-offsets for their partitions.
pub fn commit_offsets(
    consumer: &StreamConsumer,
    staged: &HashMap<TopicPartition, i64>,
    mode: CommitMode,
) -> KafkaResult<()> {
    let mut offsets = TopicPartitionList::new();
    for ((topic, partition), next_offset) in staged {
        offsets.add_partition_offset(topic, *partition, Offset::Offset(*next_offset))?;
    }
    consumer.commit(&offsets, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(offset: i64) -> RawRecord {
        RawRecord {
            payload: b"{}".to_vec(),
            offset,
        }
    }

    #[test]
    fn empty_batch_reports_empty() {
        let batch = PollBatch::default();
        assert!(batch.is_empty());
        assert_eq!(batch.record_count(), 0);
        assert_eq!(batch.next_offsets().count(), 0);
    }

    #[test]
    fn record_count_sums_partitions() {
        let mut batch = PollBatch::default();
        batch
            .records
            .insert(("updates".to_string(), 0), vec![record(5), record(6)]);
        batch
            .records
            .insert(("updates".to_string(), 1), vec![record(11)]);

        assert!(!batch.is_empty());
        assert_eq!(batch.record_count(), 3);
    }

    #[test]
    fn next_offsets_point_past_the_last_record() {
        let mut batch = PollBatch::default();
        batch
            .records
            .insert(("updates".to_string(), 0), vec![record(5), record(6)]);
        batch
            .records
            .insert(("updates".to_string(), 1), vec![record(11)]);

        let staged: HashMap<TopicPartition, i64> = batch
            .next_offsets()
            .map(|(tp, next)| (tp.clone(), next))
            .collect();
        assert_eq!(staged[&("updates".to_string(), 0)], 7);
        assert_eq!(staged[&("updates".to_string(), 1)], 12);
    }
}
