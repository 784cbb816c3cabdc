//! Bulk submission and per-item outcome classification.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::action::{encode_bulk, UpdateRequest};
use crate::client::ElasticCluster;
use crate::error::ElasticError;

/// Number of actions submitted per `_bulk` request.
const BULK_CHUNK_SIZE: usize = 500;

/// Per-item failure renderings are capped at this many characters in logs.
const FAILURE_LOG_CHARS: usize = 512;

/// Body of a `_bulk` response. Each item is an object with a single key
/// naming the operation (`update` for everything this daemon sends).
#[derive(Debug, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    pub items: Vec<Map<String, Value>>,
}

/// What happened to one action, as reported by the bulk API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkOutcome {
    Updated,
    Created,
    Noop,
    /// 2xx response without a recognized `result` field.
    OkUnknown,
    /// Target document or index absent. Common enough that it is counted
    /// but never logged: upstream producers speculatively target
    /// content-namespace aliases that may not exist.
    Missing,
    Failed,
}

impl BulkOutcome {
    pub const ALL: [BulkOutcome; 6] = [
        BulkOutcome::Updated,
        BulkOutcome::Created,
        BulkOutcome::Noop,
        BulkOutcome::OkUnknown,
        BulkOutcome::Missing,
        BulkOutcome::Failed,
    ];

    /// Metric label value for this outcome.
    pub fn as_label(self) -> &'static str {
        match self {
            BulkOutcome::Updated => "updated",
            BulkOutcome::Created => "created",
            BulkOutcome::Noop => "noop",
            BulkOutcome::OkUnknown => "ok_unknown",
            BulkOutcome::Missing => "missing",
            BulkOutcome::Failed => "failed",
        }
    }
}

/// Classify a single bulk response item.
///
/// The operation key is extracted rather than hardcoded so this keeps
/// working if the operation kind is ever parameterized.
pub fn classify_item(item: &Map<String, Value>) -> BulkOutcome {
    debug_assert_eq!(item.len(), 1, "bulk response item carries one operation key");
    let Some((_, result)) = item.iter().next() else {
        return BulkOutcome::Failed;
    };

    let status = result.get("status").and_then(Value::as_u64).unwrap_or(500);
    if (200..300).contains(&status) {
        match result.get("result").and_then(Value::as_str) {
            Some("updated") => BulkOutcome::Updated,
            Some("created") => BulkOutcome::Created,
            Some("noop") => BulkOutcome::Noop,
            _ => BulkOutcome::OkUnknown,
        }
    } else if status == 404 {
        BulkOutcome::Missing
    } else {
        BulkOutcome::Failed
    }
}

/// Stream a sub-batch of update requests to one cluster and classify every
/// response item.
///
/// Connection-level errors propagate; per-item failures are classified,
/// logged (except 404s) and returned so the caller can feed its counters.
pub async fn stream_updates(
    cluster: &ElasticCluster,
    requests: &[UpdateRequest],
) -> Result<Vec<BulkOutcome>, ElasticError> {
    let mut outcomes = Vec::with_capacity(requests.len());
    for chunk in requests.chunks(BULK_CHUNK_SIZE) {
        let response = cluster.bulk(encode_bulk(chunk)).await?;
        for item in &response.items {
            let outcome = classify_item(item);
            if outcome == BulkOutcome::Failed {
                if let Some((operation, result)) = item.iter().next() {
                    warn!(
                        "Failed elasticsearch {} request: {}",
                        operation,
                        truncated(&result.to_string(), FAILURE_LOG_CHARS)
                    );
                }
            }
            outcomes.push(outcome);
        }
    }
    Ok(outcomes)
}

fn truncated(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
