//! Elasticsearch connector for the esbridge update daemon.
//!
//! This crate covers the search-engine side of the bridge:
//! - cluster handles over the HTTP API, with cluster-identity checks
//! - alias discovery (the set of names a cluster will accept in a bulk action)
//! - scripted-update bulk actions and their NDJSON encoding
//! - bulk submission and per-item outcome classification

pub mod action;
pub mod bulk;
pub mod client;
pub mod error;

pub use action::{expand_action, UpdateRequest, FIELD_CONFIG};
pub use bulk::{classify_item, stream_updates, BulkOutcome, BulkResponse};
pub use client::{connect_all, ElasticCluster};
pub use error::ElasticError;
