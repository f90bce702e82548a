//! Resource Handle Store: persistence of the declared topology.
//!
//! The topology is stored as one opaque JSON document per tenant in the
//! backend's tenant state document. Saves are whole-document replaces;
//! there are no partial-field updates. The persistence medium is the
//! backend's concern, not the caller's.

use crate::cluster::{ClusterBackend, Deletion};
use crate::error::SimlabError;
use crate::topology::Topology;
use std::sync::Arc;
use tracing::debug;

pub struct TopologyStore {
    backend: Arc<dyn ClusterBackend>,
}

impl TopologyStore {
    pub fn new(backend: Arc<dyn ClusterBackend>) -> Self {
        Self { backend }
    }

    /// Replace the tenant's stored topology with `topology`.
    pub async fn save(&self, topology: &Topology) -> Result<(), SimlabError> {
        let data = serde_json::to_vec(topology)?;
        self.backend
            .write_state_document(&topology.tenant, data)
            .await?;
        debug!(tenant = %topology.tenant, agents = topology.agents.len(), "topology saved");
        Ok(())
    }

    /// Load the tenant's topology. A tenant with no stored document gets a
    /// typed `TopologyNotFound`, distinct from an empty-but-present topology.
    pub async fn load(&self, tenant: &str) -> Result<Topology, SimlabError> {
        let raw = self
            .backend
            .read_state_document(tenant)
            .await?
            .ok_or_else(|| SimlabError::TopologyNotFound(tenant.to_string()))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Delete the tenant's stored topology. Absent documents are success.
    pub async fn delete(&self, tenant: &str) -> Result<(), SimlabError> {
        match self.backend.delete_state_document(tenant).await? {
            Deletion::Deleted => debug!(tenant, "topology document deleted"),
            Deletion::NotFound => debug!(tenant, "no topology document to delete"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::mock::MockClusterBackend;
    use crate::topology::{Agent, AgentKind, Edge};

    fn sample_topology(tenant: &str) -> Topology {
        let mut topology = Topology::new(tenant);
        topology.agents.push(Agent::new("alpha", AgentKind::Emitter));
        topology.agents.push(Agent::new("beta", AgentKind::Relay));
        topology.edges.push(Edge::new("alpha", "beta"));
        topology
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let store = TopologyStore::new(Arc::new(MockClusterBackend::new()));
        store.save(&sample_topology("u1")).await.unwrap();

        let loaded = store.load("u1").await.unwrap();
        assert_eq!(loaded.tenant, "u1");
        assert_eq!(loaded.agents.len(), 2);
        assert_eq!(loaded.edges, vec![Edge::new("alpha", "beta")]);
    }

    #[tokio::test]
    async fn test_load_missing_is_typed_not_found() {
        let store = TopologyStore::new(Arc::new(MockClusterBackend::new()));
        let err = store.load("nobody").await.unwrap_err();
        assert!(matches!(err, SimlabError::TopologyNotFound(t) if t == "nobody"));
    }

    #[tokio::test]
    async fn test_empty_topology_is_distinct_from_absent() {
        let store = TopologyStore::new(Arc::new(MockClusterBackend::new()));
        store.save(&Topology::new("u1")).await.unwrap();

        let loaded = store.load("u1").await.unwrap();
        assert!(loaded.agents.is_empty());
    }

    #[tokio::test]
    async fn test_save_is_whole_document_replace() {
        let store = TopologyStore::new(Arc::new(MockClusterBackend::new()));
        store.save(&sample_topology("u1")).await.unwrap();

        let mut replacement = Topology::new("u1");
        replacement.agents.push(Agent::new("gamma", AgentKind::Relay));
        store.save(&replacement).await.unwrap();

        let loaded = store.load("u1").await.unwrap();
        assert_eq!(loaded.agents.len(), 1);
        assert_eq!(loaded.agents[0].id, "gamma");
    }

    #[tokio::test]
    async fn test_delete_absent_is_success() {
        let store = TopologyStore::new(Arc::new(MockClusterBackend::new()));
        store.delete("u1").await.unwrap();
    }
}
