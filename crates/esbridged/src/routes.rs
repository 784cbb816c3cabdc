//! Memoized per-cluster routing table with a fixed TTL.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use esbridge_elastic::{ElasticCluster, ElasticError};

/// Entry `i` is the set of index and alias names cluster `i` accepts.
pub type RouteTable = Vec<HashSet<String>>;

/// How long a built route table stays valid.
const ROUTE_TTL: Duration = Duration::from_secs(300);

/// Key-less memo of the route table: a value plus a monotonic deadline,
/// rebuilt in one piece when a read misses.
#[derive(Default)]
pub struct RouteCache {
    entry: Option<(Arc<RouteTable>, Instant)>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current routing table, rebuilt from every cluster's alias listing
    /// when the cached one has expired. A failure against any cluster
    /// leaves the cache unchanged and propagates to the caller.
    pub async fn get(
        &mut self,
        clusters: &[ElasticCluster],
    ) -> Result<Arc<RouteTable>, ElasticError> {
        let now = Instant::now();
        if let Some(table) = self.fresh(now) {
            return Ok(table);
        }
        let mut table = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            table.push(cluster.recognized_names().await?);
        }
        Ok(self.store(Arc::new(table), now))
    }

    fn fresh(&self, now: Instant) -> Option<Arc<RouteTable>> {
        match &self.entry {
            Some((table, valid_until)) if *valid_until > now => Some(Arc::clone(table)),
            _ => None,
        }
    }

    fn store(&mut self, table: Arc<RouteTable>, now: Instant) -> Arc<RouteTable> {
        self.entry = Some((Arc::clone(&table), now + ROUTE_TTL));
        table
    }
}
