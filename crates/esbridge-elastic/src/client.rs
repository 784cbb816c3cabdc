//! Cluster handles over the Elasticsearch HTTP API.

use std::collections::{HashMap, HashSet};

use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use url::Url;

use crate::bulk::BulkResponse;
use crate::error::ElasticError;

/// Root endpoint response, as far as this daemon cares.
#[derive(Debug, Deserialize)]
pub struct ClusterInfo {
    pub cluster_name: String,
    pub cluster_uuid: String,
}

/// One entry of the `_alias` listing: an index and its alias sub-map.
#[derive(Debug, Deserialize)]
pub struct AliasListing {
    #[serde(default)]
    pub aliases: HashMap<String, Value>,
}

/// A handle to one Elasticsearch cluster, identified at connect time.
#[derive(Debug)]
pub struct ElasticCluster {
    name: String,
    uuid: String,
    http: reqwest::Client,
    alias_url: Url,
    bulk_url: Url,
}

impl ElasticCluster {
    /// Connect to a bootstrap host and fetch the cluster identity.
    pub async fn connect(host: &str) -> Result<Self, ElasticError> {
        let parse_err = |source| ElasticError::InvalidHost {
            host: host.to_string(),
            source,
        };
        let root = Url::parse(host).map_err(parse_err)?;
        let alias_url = root.join("_alias").map_err(parse_err)?;
        let bulk_url = root.join("_bulk").map_err(parse_err)?;

        let http = reqwest::Client::new();
        let info: ClusterInfo = http
            .get(root)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(Self {
            name: info.cluster_name,
            uuid: info.cluster_uuid,
            http,
            alias_url,
            bulk_url,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// The set of names this cluster will accept in a bulk action: every
    /// concrete index name plus every alias pointing at one.
    pub async fn recognized_names(&self) -> Result<HashSet<String>, ElasticError> {
        let listing: HashMap<String, AliasListing> = self
            .http
            .get(self.alias_url.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(names_from_alias_listing(listing))
    }

    /// POST an NDJSON body to `_bulk`. Per-item errors come back in the
    /// response; a non-success status on the request itself is an error.
    pub async fn bulk(&self, body: String) -> Result<BulkResponse, ElasticError> {
        let response = self
            .http
            .post(self.bulk_url.clone())
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response)
    }
}

fn names_from_alias_listing(listing: HashMap<String, AliasListing>) -> HashSet<String> {
    let mut names = HashSet::new();
    for (index_name, entry) in listing {
        names.extend(entry.aliases.into_keys());
        names.insert(index_name);
    }
    names
}

/// Connect to every bootstrap host in a comma-separated list.
///
/// Each host must resolve to a distinct cluster; two hosts answering with
/// the same cluster UUID is a configuration error.
pub async fn connect_all(bootstrap_hosts: &str) -> Result<Vec<ElasticCluster>, ElasticError> {
    let mut clusters = Vec::new();
    let mut seen = HashSet::new();
    for host in bootstrap_hosts
        .split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
    {
        let cluster = ElasticCluster::connect(host).await?;
        if !seen.insert(cluster.uuid().to_string()) {
            return Err(ElasticError::DuplicateCluster {
                name: cluster.name().to_string(),
                uuid: cluster.uuid().to_string(),
            });
        }
        info!("Connected to elasticsearch {}", cluster.name());
        clusters.push(cluster);
    }
    Ok(clusters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn alias_listing_unions_index_and_alias_names() {
        let listing: HashMap<String, AliasListing> = serde_json::from_value(json!({
            "enwiki_content_1234": {"aliases": {"enwiki_content": {}, "enwiki": {}}},
            "dewiki_content_5678": {"aliases": {}},
        }))
        .unwrap();

        let names = names_from_alias_listing(listing);
        assert_eq!(names.len(), 4);
        assert!(names.contains("enwiki_content_1234"));
        assert!(names.contains("enwiki_content"));
        assert!(names.contains("enwiki"));
        assert!(names.contains("dewiki_content_5678"));
    }

    #[test]
    fn alias_listing_tolerates_missing_aliases_key() {
        let listing: HashMap<String, AliasListing> =
            serde_json::from_value(json!({"lonely_index": {}})).unwrap();

        let names = names_from_alias_listing(listing);
        assert_eq!(names.len(), 1);
        assert!(names.contains("lonely_index"));
    }

    #[test]
    fn cluster_info_parses_root_response() {
        let info: ClusterInfo = serde_json::from_value(json!({
            "name": "node-1",
            "cluster_name": "production-search",
            "cluster_uuid": "Kk0idVf1Tm-useEsC5KNbQ",
            "version": {"number": "6.5.4"},
        }))
        .unwrap();

        assert_eq!(info.cluster_name, "production-search");
        assert_eq!(info.cluster_uuid, "Kk0idVf1Tm-useEsC5KNbQ");
    }
}
