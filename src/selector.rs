//! Replica selection: random live replica for reads, primary as fallback.

use crate::config::Topology;
use crate::handle::DatabaseHandle;
use crate::liveness::LivenessProber;
use crate::routing::RoutingState;
use rand::seq::SliceRandom;
use std::sync::Arc;

pub struct ReplicaSelector {
    primary: DatabaseHandle,
    replicas: Vec<DatabaseHandle>,
    prober: Arc<LivenessProber>,
}

impl ReplicaSelector {
    pub fn new(topology: &Topology, prober: Arc<LivenessProber>) -> Self {
        ReplicaSelector {
            primary: topology.primary.clone(),
            replicas: topology.replicas.clone(),
            prober,
        }
    }

    pub fn prober(&self) -> &Arc<LivenessProber> {
        &self.prober
    }

    /// Handle that should serve a read under `state`.
    ///
    /// Replicas are tried in random order; the first live one wins. With no live replica the
    /// primary serves the read.
    pub async fn choose_read_handle(&self, state: RoutingState) -> DatabaseHandle {
        if state == RoutingState::Master {
            return self.primary.clone();
        }

        let mut candidates: Vec<&DatabaseHandle> = self.replicas.iter().collect();
        candidates.shuffle(&mut rand::thread_rng());
        for replica in candidates {
            if self.prober.is_alive(replica).await {
                return replica.clone();
            }
        }

        if self.replicas.is_empty() {
            tracing::debug!("no replicas configured, reading from primary");
        } else {
            tracing::warn!(
                replicas = self.replicas.len(),
                primary = %self.primary,
                "all replicas down, reading from primary"
            );
        }
        self.primary.clone()
    }
}
