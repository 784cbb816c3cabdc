//! Typed errors for the Elasticsearch connector.

use thiserror::Error;

/// Errors raised while talking to an Elasticsearch cluster.
///
/// All of these are connection-level: per-item bulk failures are reported
/// through [`crate::bulk::BulkOutcome`] instead and never surface here.
#[derive(Debug, Error)]
pub enum ElasticError {
    /// A bootstrap host could not be parsed into a usable base URL.
    #[error("invalid cluster host {host}: {source}")]
    InvalidHost {
        host: String,
        #[source]
        source: url::ParseError,
    },
    /// Transport failure or non-success HTTP status from the cluster.
    #[error("elasticsearch request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Two bootstrap hosts resolved to the same cluster.
    #[error("cluster {name} (uuid {uuid}) seen from more than one bootstrap host")]
    DuplicateCluster { name: String, uuid: String },
}
