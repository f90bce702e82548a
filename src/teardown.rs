//! Teardown Coordinator.
//!
//! Deletion is set-based: every category is enumerated by the tenant+role
//! selector, so resources from partially failed provisioning attempts are
//! covered too. Categories are attempted in order (monitors, endpoints,
//! workloads, then the persisted topology document) and a failure in one
//! never short-circuits the rest — failures are collected and surfaced
//! together. "Already gone" is success.

use crate::cluster::{ClusterBackend, Deletion, ResourceKind};
use crate::error::SimlabError;
use std::sync::Arc;
use tracing::{debug, info, warn};

const TEARDOWN_ORDER: [ResourceKind; 3] = [
    ResourceKind::Monitor,
    ResourceKind::Endpoint,
    ResourceKind::Workload,
];

pub struct TeardownCoordinator {
    backend: Arc<dyn ClusterBackend>,
}

impl TeardownCoordinator {
    pub fn new(backend: Arc<dyn ClusterBackend>) -> Self {
        Self { backend }
    }

    /// Delete every resource provisioned for the tenant.
    ///
    /// Idempotent: a second call finds nothing and succeeds. Returns
    /// `TeardownPartialFailure` naming each resource that could not be
    /// deleted, after all categories have been attempted.
    pub async fn teardown(&self, tenant: &str) -> Result<(), SimlabError> {
        info!(tenant, "tearing down topology resources");
        let mut failed = Vec::new();

        for kind in TEARDOWN_ORDER {
            let names = match self.backend.list_resources(tenant, kind).await {
                Ok(names) => names,
                Err(e) => {
                    warn!(tenant, kind = kind.as_str(), error = %e, "listing failed, category skipped");
                    failed.push(format!("{}/*", kind.as_str()));
                    continue;
                }
            };
            for name in names {
                match self.backend.delete_resource(tenant, kind, &name).await {
                    Ok(Deletion::Deleted) => {
                        debug!(tenant, kind = kind.as_str(), name = %name, "deleted")
                    }
                    Ok(Deletion::NotFound) => {
                        debug!(tenant, kind = kind.as_str(), name = %name, "already gone")
                    }
                    Err(e) => {
                        warn!(tenant, kind = kind.as_str(), name = %name, error = %e, "deletion failed");
                        failed.push(format!("{}/{}", kind.as_str(), name));
                    }
                }
            }
        }

        match self.backend.delete_state_document(tenant).await {
            Ok(_) => debug!(tenant, "state document removed"),
            Err(e) => {
                warn!(tenant, error = %e, "state document deletion failed");
                failed.push(format!("document/simlab-state-{}", tenant));
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(SimlabError::TeardownPartialFailure { failed })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::mock::MockClusterBackend;
    use crate::config::ProvisionSettings;
    use crate::provision::Provisioner;
    use crate::topology::{Agent, AgentKind};

    fn fast_settings() -> ProvisionSettings {
        ProvisionSettings {
            readiness_timeout_secs: 0,
            endpoint_poll_secs: 0,
            workload_poll_secs: 0,
        }
    }

    async fn provisioned_backend(tenant: &str, ids: &[&str]) -> Arc<MockClusterBackend> {
        let backend = Arc::new(MockClusterBackend::new());
        let provisioner =
            Provisioner::new(backend.clone(), fast_settings(), "simlab-agent:latest");
        let agents: Vec<Agent> = ids.iter().map(|id| Agent::new(*id, AgentKind::Relay)).collect();
        provisioner.provision(tenant, agents).await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_teardown_removes_every_category() {
        let backend = provisioned_backend("u1", &["alpha", "beta"]).await;
        backend
            .write_state_document("u1", b"{\"tenant\":\"u1\"}".to_vec())
            .await
            .unwrap();
        let coordinator = TeardownCoordinator::new(backend.clone());
        coordinator.teardown("u1").await.unwrap();

        for kind in TEARDOWN_ORDER {
            assert!(backend.list_resources("u1", kind).await.unwrap().is_empty());
        }
        assert!(backend.read_state_document("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_teardown_twice_is_idempotent() {
        let backend = provisioned_backend("u1", &["alpha"]).await;
        let coordinator = TeardownCoordinator::new(backend);
        coordinator.teardown("u1").await.unwrap();
        // Second pass finds nothing and still succeeds.
        coordinator.teardown("u1").await.unwrap();
    }

    #[tokio::test]
    async fn test_failures_are_collected_not_short_circuited() {
        let backend = provisioned_backend("u1", &["alpha", "beta"]).await;
        backend.fail_deletion("alpha");
        let coordinator = TeardownCoordinator::new(backend.clone());

        let err = coordinator.teardown("u1").await.unwrap_err();
        match err {
            SimlabError::TeardownPartialFailure { failed } => {
                // alpha failed in all three categories; beta was still removed.
                assert_eq!(failed.len(), 3);
                assert!(failed.iter().all(|f| f.ends_with("/alpha")));
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
        for kind in TEARDOWN_ORDER {
            let remaining = backend.list_resources("u1", kind).await.unwrap();
            assert_eq!(remaining, vec!["alpha".to_string()]);
        }
    }

    #[tokio::test]
    async fn test_other_tenants_are_untouched() {
        let backend = provisioned_backend("u1", &["alpha"]).await;
        let provisioner =
            Provisioner::new(backend.clone(), fast_settings(), "simlab-agent:latest");
        provisioner
            .provision("u2", vec![Agent::new("omega", AgentKind::Relay)])
            .await
            .unwrap();

        TeardownCoordinator::new(backend.clone())
            .teardown("u1")
            .await
            .unwrap();
        assert_eq!(
            backend
                .list_resources("u2", ResourceKind::Workload)
                .await
                .unwrap(),
            vec!["omega".to_string()]
        );
    }
}
