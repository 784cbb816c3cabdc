//! Partition a poll batch into per-cluster sub-batches.

use tracing::warn;

use esbridge_elastic::UpdateRequest;

use crate::kafka::PollBatch;
use crate::metrics::{BridgeMetrics, FAIL_VALIDATE, MISSING_INDEX};
use crate::record::{RecordError, RecordValidator};
use crate::routes::RouteTable;

/// Bytes of a malformed payload echoed into the log.
const PAYLOAD_LOG_BYTES: usize = 128;

/// Validate every record of a poll batch and group the survivors by
/// target cluster.
///
/// The returned list is parallel to the cluster list. Routing scans the
/// table in configured order and the first cluster whose set contains the
/// target index wins; records nobody recognizes are counted and dropped.
pub fn split_by_cluster(
    batch: &PollBatch,
    routes: &RouteTable,
    validator: &RecordValidator,
    metrics: &BridgeMetrics,
) -> Vec<Vec<UpdateRequest>> {
    let mut split: Vec<Vec<UpdateRequest>> = routes.iter().map(|_| Vec::new()).collect();
    for records in batch.records.values() {
        for record in records {
            let request = match validator.parse(&record.payload) {
                Ok(request) => request,
                Err(RecordError::Malformed) => {
                    metrics.invalid_record(FAIL_VALIDATE);
                    let prefix = &record.payload[..record.payload.len().min(PAYLOAD_LOG_BYTES)];
                    warn!("Invalid message: {}", String::from_utf8_lossy(prefix));
                    continue;
                }
                Err(RecordError::Invalid(violations)) => {
                    metrics.invalid_record(FAIL_VALIDATE);
                    warn!("{}", violations.join("\n"));
                    continue;
                }
            };
            match routes
                .iter()
                .position(|names| names.contains(&request.index))
            {
                Some(i) => split[i].push(request),
                None => {
                    metrics.invalid_record(MISSING_INDEX);
                    warn!("Could not find cluster for index {}", request.index);
                }
            }
        }
    }
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::RawRecord;
    use std::collections::HashSet;

    fn batch_of(payloads: &[&str]) -> PollBatch {
        let mut batch = PollBatch::default();
        batch.records.insert(
            ("updates".to_string(), 0),
            payloads
                .iter()
                .enumerate()
                .map(|(i, payload)| RawRecord {
                    payload: payload.as_bytes().to_vec(),
                    offset: i as i64,
                })
                .collect(),
        );
        batch
    }

    fn routes(clusters: &[&[&str]]) -> RouteTable {
        clusters
            .iter()
            .map(|names| names.iter().map(|n| n.to_string()).collect::<HashSet<_>>())
            .collect()
    }

    #[test]
    fn routes_records_to_their_clusters() {
        let validator = RecordValidator::new().unwrap();
        let metrics = BridgeMetrics::new();
        let batch = batch_of(&[
            r#"{"_index":"enwiki_content","_id":1,"_source":{"popularity_score":0.1}}"#,
            r#"{"_index":"dewiki_content","_id":2,"_source":{"popularity_score":0.2}}"#,
        ]);
        let table = routes(&[&["enwiki_content"], &["dewiki_content"]]);

        let split = split_by_cluster(&batch, &table, &validator, &metrics);

        assert_eq!(split.len(), 2);
        assert_eq!(split[0].len(), 1);
        assert_eq!(split[0][0].index, "enwiki_content");
        assert_eq!(split[1].len(), 1);
        assert_eq!(split[1][0].index, "dewiki_content");
    }

    #[test]
    fn first_matching_cluster_wins() {
        let validator = RecordValidator::new().unwrap();
        let metrics = BridgeMetrics::new();
        let batch = batch_of(&[
            r#"{"_index":"enwiki_content","_id":1,"_source":{"popularity_score":0.1}}"#,
        ]);
        // Both clusters claim the index; only the first receives it.
        let table = routes(&[&["enwiki_content"], &["enwiki_content"]]);

        let split = split_by_cluster(&batch, &table, &validator, &metrics);

        assert_eq!(split[0].len(), 1);
        assert!(split[1].is_empty());
    }

    #[test]
    fn unroutable_index_is_counted_and_dropped() {
        let validator = RecordValidator::new().unwrap();
        let metrics = BridgeMetrics::new();
        let batch = batch_of(&[
            r#"{"_index":"zzwiki_content","_id":1,"_source":{"popularity_score":0.1}}"#,
        ]);
        let table = routes(&[&["enwiki_content"]]);

        let split = split_by_cluster(&batch, &table, &validator, &metrics);

        assert!(split[0].is_empty());
        assert_eq!(
            metrics.invalid_records.get_or_create(&MISSING_INDEX).get(),
            1
        );
        assert_eq!(
            metrics.invalid_records.get_or_create(&FAIL_VALIDATE).get(),
            0
        );
    }

    #[test]
    fn invalid_records_never_reach_a_cluster() {
        let validator = RecordValidator::new().unwrap();
        let metrics = BridgeMetrics::new();
        let batch = batch_of(&[
            "not json at all",
            r#"{"_index":"enwiki_content","_id":1,"_source":{}}"#,
            r#"{"_index":"enwiki_content","_id":1,"_source":{"popularity_score":0.1}}"#,
        ]);
        let table = routes(&[&["enwiki_content"]]);

        let split = split_by_cluster(&batch, &table, &validator, &metrics);

        assert_eq!(split[0].len(), 1);
        assert_eq!(
            metrics.invalid_records.get_or_create(&FAIL_VALIDATE).get(),
            2
        );
    }
}
