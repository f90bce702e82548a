//! In-memory cluster backend.
//!
//! Serves two purposes: the `backend = "mock"` runtime mode (no cluster
//! required), and a scriptable test double. Endpoints get a synthesized
//! address at creation unless scripted to stay unready; creation and
//! deletion calls can be scripted to fail for specific resource names.

use super::{
    ClusterBackend, Deletion, EndpointSpec, ResourceKind, WorkloadSpec, WorkloadStatus,
};
use crate::error::SimlabError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone)]
struct MockWorkload {
    instance_name: String,
    status: WorkloadStatus,
}

#[derive(Debug, Clone)]
struct MockEndpoint {
    address: Option<String>,
}

#[derive(Default)]
struct MockState {
    workloads: HashMap<(String, String), MockWorkload>,
    endpoints: HashMap<(String, String), MockEndpoint>,
    monitors: HashSet<(String, String)>,
    documents: HashMap<String, Vec<u8>>,
    // Scripted behaviors, keyed by resource name.
    reject_creations: HashSet<String>,
    reject_monitors: HashSet<String>,
    unready_endpoints: HashSet<String>,
    lagging_workloads: HashSet<String>,
    failing_status_reads: HashSet<String>,
    failing_deletions: HashSet<String>,
    address_counter: u8,
    instance_counter: u32,
}

/// In-memory implementation of [`ClusterBackend`].
pub struct MockClusterBackend {
    state: Mutex<MockState>,
}

impl MockClusterBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Script the named resource's creation calls to be rejected.
    pub fn reject_creation(&self, name: &str) {
        self.state.lock().reject_creations.insert(name.to_string());
    }

    /// Script only the named monitor-hook creation to be rejected,
    /// leaving workload and endpoint creation intact.
    pub fn reject_monitor(&self, name: &str) {
        self.state.lock().reject_monitors.insert(name.to_string());
    }

    /// Script the named endpoint to never report an address.
    pub fn hold_endpoint_unready(&self, name: &str) {
        self.state.lock().unready_endpoints.insert(name.to_string());
    }

    /// Script the named workload to stay below its desired replica count.
    pub fn hold_workload_lagging(&self, name: &str) {
        self.state.lock().lagging_workloads.insert(name.to_string());
    }

    /// Script status reads of the named workload to fail with a backend error.
    pub fn fail_workload_status(&self, name: &str) {
        self.state
            .lock()
            .failing_status_reads
            .insert(name.to_string());
    }

    /// Script deletions of the named resource to fail.
    pub fn fail_deletion(&self, name: &str) {
        self.state.lock().failing_deletions.insert(name.to_string());
    }

    fn check_rejection(state: &MockState, kind: ResourceKind, name: &str) -> Result<(), SimlabError> {
        if state.reject_creations.contains(name) {
            return Err(SimlabError::ResourceCreation {
                resource: format!("{}/{}", kind.as_str(), name),
                reason: "creation rejected by backend".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MockClusterBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterBackend for MockClusterBackend {
    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<(), SimlabError> {
        let mut state = self.state.lock();
        Self::check_rejection(&state, ResourceKind::Workload, &spec.name)?;
        state.instance_counter += 1;
        let instance_name = format!("{}-{:07x}-{:05x}", spec.name, 0x5c4f2a1, state.instance_counter);
        let ready = !state.lagging_workloads.contains(&spec.name);
        debug!(workload = %spec.name, instance = %instance_name, "mock workload created");
        state.workloads.insert(
            (spec.tenant.clone(), spec.name.clone()),
            MockWorkload {
                instance_name,
                status: WorkloadStatus {
                    desired_replicas: 1,
                    ready_replicas: if ready { 1 } else { 0 },
                },
            },
        );
        Ok(())
    }

    async fn create_endpoint(&self, spec: &EndpointSpec) -> Result<(), SimlabError> {
        let mut state = self.state.lock();
        Self::check_rejection(&state, ResourceKind::Endpoint, &spec.name)?;
        let address = if state.unready_endpoints.contains(&spec.name) {
            None
        } else {
            state.address_counter = state.address_counter.wrapping_add(1);
            Some(format!("10.217.4.{}", state.address_counter))
        };
        state.endpoints.insert(
            (spec.tenant.clone(), spec.name.clone()),
            MockEndpoint { address },
        );
        Ok(())
    }

    async fn create_monitor(&self, tenant: &str, name: &str) -> Result<(), SimlabError> {
        let mut state = self.state.lock();
        Self::check_rejection(&state, ResourceKind::Monitor, name)?;
        if state.reject_monitors.contains(name) {
            return Err(SimlabError::ResourceCreation {
                resource: format!("monitor/{}", name),
                reason: "monitoring stack rejected the hook".to_string(),
            });
        }
        state.monitors.insert((tenant.to_string(), name.to_string()));
        Ok(())
    }

    async fn list_instances(&self, tenant: &str) -> Result<Vec<String>, SimlabError> {
        let state = self.state.lock();
        let mut names: Vec<String> = state
            .workloads
            .iter()
            .filter(|((t, _), _)| t == tenant)
            .map(|(_, w)| w.instance_name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn list_resources(
        &self,
        tenant: &str,
        kind: ResourceKind,
    ) -> Result<Vec<String>, SimlabError> {
        let state = self.state.lock();
        let mut names: Vec<String> = match kind {
            ResourceKind::Workload => state
                .workloads
                .keys()
                .filter(|(t, _)| t == tenant)
                .map(|(_, n)| n.clone())
                .collect(),
            ResourceKind::Endpoint => state
                .endpoints
                .keys()
                .filter(|(t, _)| t == tenant)
                .map(|(_, n)| n.clone())
                .collect(),
            ResourceKind::Monitor => state
                .monitors
                .iter()
                .filter(|(t, _)| t == tenant)
                .map(|(_, n)| n.clone())
                .collect(),
        };
        names.sort();
        Ok(names)
    }

    async fn endpoint_address(
        &self,
        tenant: &str,
        name: &str,
    ) -> Result<Option<String>, SimlabError> {
        let state = self.state.lock();
        Ok(state
            .endpoints
            .get(&(tenant.to_string(), name.to_string()))
            .and_then(|e| e.address.clone()))
    }

    async fn workload_status(
        &self,
        tenant: &str,
        name: &str,
    ) -> Result<WorkloadStatus, SimlabError> {
        let state = self.state.lock();
        if state.failing_status_reads.contains(name) {
            return Err(SimlabError::Backend(format!(
                "reading status of workload {}: control plane unreachable",
                name
            )));
        }
        state
            .workloads
            .get(&(tenant.to_string(), name.to_string()))
            .map(|w| w.status)
            .ok_or_else(|| SimlabError::Backend(format!("workload {} not found", name)))
    }

    async fn delete_resource(
        &self,
        tenant: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Deletion, SimlabError> {
        let mut state = self.state.lock();
        if state.failing_deletions.contains(name) {
            return Err(SimlabError::Backend(format!(
                "deletion of {}/{} failed",
                kind.as_str(),
                name
            )));
        }
        let key = (tenant.to_string(), name.to_string());
        let removed = match kind {
            ResourceKind::Workload => state.workloads.remove(&key).is_some(),
            ResourceKind::Endpoint => state.endpoints.remove(&key).is_some(),
            ResourceKind::Monitor => state.monitors.remove(&key),
        };
        Ok(if removed {
            Deletion::Deleted
        } else {
            Deletion::NotFound
        })
    }

    async fn read_state_document(&self, tenant: &str) -> Result<Option<Vec<u8>>, SimlabError> {
        Ok(self.state.lock().documents.get(tenant).cloned())
    }

    async fn write_state_document(&self, tenant: &str, data: Vec<u8>) -> Result<(), SimlabError> {
        self.state.lock().documents.insert(tenant.to_string(), data);
        Ok(())
    }

    async fn delete_state_document(&self, tenant: &str) -> Result<Deletion, SimlabError> {
        Ok(if self.state.lock().documents.remove(tenant).is_some() {
            Deletion::Deleted
        } else {
            Deletion::NotFound
        })
    }
}
