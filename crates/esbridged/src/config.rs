//! Daemon configuration from CLI flags and environment variables.

use clap::Parser;

/// Bridge daemon configuration.
///
/// Everything can come from the environment so the daemon runs under a
/// process supervisor without a wrapper script.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "esbridged",
    about = "Streams partial document updates from kafka into elasticsearch"
)]
pub struct Config {
    /// Kafka bootstrap servers, comma separated
    #[arg(long, env = "KAFKA_BROKERS")]
    pub brokers: String,

    /// Elasticsearch bootstrap hosts, comma separated, one per cluster
    #[arg(long, env = "ES_CLUSTERS")]
    pub es_clusters: String,

    /// Topics to consume update requests from
    #[arg(long, env = "KAFKA_TOPICS", value_delimiter = ',', required = true)]
    pub topics: Vec<String>,

    /// Consumer group id
    #[arg(long, env = "KAFKA_GROUP_ID", default_value = "esbridge")]
    pub group_id: String,

    /// Port for the prometheus metrics and health endpoints
    #[arg(long, env = "METRICS_PORT", default_value = "9171")]
    pub metrics_port: u16,
}
