//! Cluster control-plane abstraction.
//!
//! Every component of the core depends on the `ClusterBackend` trait, never
//! on a concrete implementation. Two implementations exist: an in-memory
//! mock (`cluster::mock`) and a REST client against a live control plane
//! (`cluster::rest`), selected once at startup by configuration.

pub mod mock;
pub mod rest;

use crate::error::SimlabError;
use async_trait::async_trait;

/// Label key identifying the resource role.
pub const ROLE_LABEL: &str = "simlab.io/role";
/// Label key identifying the owning tenant.
pub const TENANT_LABEL: &str = "simlab.io/tenant";
/// Role value applied to every agent resource.
pub const AGENT_ROLE: &str = "agent";

/// Selector matching all agent resources of one tenant. Deletion and
/// instance listing are set-based on this selector, so partially created
/// topologies are still fully covered.
pub fn tenant_selector(tenant: &str) -> String {
    format!("{}={},{}={}", ROLE_LABEL, AGENT_ROLE, TENANT_LABEL, tenant)
}

/// The three resource categories created per agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Compute unit (deployment-like, one desired replica).
    Workload,
    /// Network endpoint exposing the api and metrics ports.
    Endpoint,
    /// Scrape hook for the monitoring system; always best-effort.
    Monitor,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Workload => "workload",
            ResourceKind::Endpoint => "endpoint",
            ResourceKind::Monitor => "monitor",
        }
    }
}

/// Desired shape of one agent's compute unit.
#[derive(Debug, Clone)]
pub struct WorkloadSpec {
    pub name: String,
    pub tenant: String,
    pub image: String,
    /// Port the readiness probe hits.
    pub api_port: u16,
}

/// Desired shape of one agent's network endpoint.
#[derive(Debug, Clone)]
pub struct EndpointSpec {
    pub name: String,
    pub tenant: String,
    pub api_port: u16,
    pub metrics_port: u16,
}

/// Replica readiness of a workload at one observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadStatus {
    pub desired_replicas: u32,
    pub ready_replicas: u32,
}

impl WorkloadStatus {
    pub fn is_ready(&self) -> bool {
        self.desired_replicas > 0 && self.ready_replicas == self.desired_replicas
    }
}

/// Outcome of a deletion call. "Already gone" is a success, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Deleted,
    NotFound,
}

/// Control-plane operations the core consumes.
///
/// Creation calls are idempotent from the caller's perspective; a conflict
/// on an existing resource surfaces as `ResourceCreation`. All list and
/// delete operations select by the tenant+role label, never by remembered
/// identifiers.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<(), SimlabError>;
    async fn create_endpoint(&self, spec: &EndpointSpec) -> Result<(), SimlabError>;
    async fn create_monitor(&self, tenant: &str, name: &str) -> Result<(), SimlabError>;

    /// Generated instance names of all live agent workload instances for
    /// the tenant. Instance names carry the owning workload name as a prefix.
    async fn list_instances(&self, tenant: &str) -> Result<Vec<String>, SimlabError>;

    /// Names of all resources of `kind` labeled for the tenant.
    async fn list_resources(
        &self,
        tenant: &str,
        kind: ResourceKind,
    ) -> Result<Vec<String>, SimlabError>;

    /// One observation of the endpoint's routable address, if allocated yet.
    async fn endpoint_address(
        &self,
        tenant: &str,
        name: &str,
    ) -> Result<Option<String>, SimlabError>;

    /// One observation of workload replica readiness.
    async fn workload_status(
        &self,
        tenant: &str,
        name: &str,
    ) -> Result<WorkloadStatus, SimlabError>;

    async fn delete_resource(
        &self,
        tenant: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Deletion, SimlabError>;

    /// Opaque whole-document tenant state (topology persistence).
    async fn read_state_document(&self, tenant: &str) -> Result<Option<Vec<u8>>, SimlabError>;
    async fn write_state_document(&self, tenant: &str, data: Vec<u8>) -> Result<(), SimlabError>;
    async fn delete_state_document(&self, tenant: &str) -> Result<Deletion, SimlabError>;
}

/// Map generated instance names back to their owning workload by prefix.
///
/// Instance names have the form `{workload}-{replica-set}-{suffix}`; the
/// owning name is everything before the final two dash-separated segments.
pub fn owning_workload(instance_name: &str) -> Option<String> {
    let parts: Vec<&str> = instance_name.split('-').collect();
    if parts.len() <= 2 {
        return None;
    }
    Some(parts[..parts.len() - 2].join("-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_selector_carries_role_and_tenant() {
        let selector = tenant_selector("u1");
        assert_eq!(selector, "simlab.io/role=agent,simlab.io/tenant=u1");
    }

    #[test]
    fn test_owning_workload_strips_generated_suffixes() {
        assert_eq!(
            owning_workload("alpha-7f6d4c9b8-x2j4z").as_deref(),
            Some("alpha")
        );
        // Workload names may themselves contain dashes.
        assert_eq!(
            owning_workload("edge-relay-7f6d4c9b8-x2j4z").as_deref(),
            Some("edge-relay")
        );
        assert_eq!(owning_workload("alpha-x2j4z"), None);
    }

    #[test]
    fn test_workload_status_readiness() {
        assert!(WorkloadStatus {
            desired_replicas: 1,
            ready_replicas: 1
        }
        .is_ready());
        assert!(!WorkloadStatus {
            desired_replicas: 1,
            ready_replicas: 0
        }
        .is_ready());
        assert!(!WorkloadStatus::default().is_ready());
    }
}
