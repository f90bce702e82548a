//! Provisioner: materializes one workload + endpoint (+ best-effort
//! monitoring hook) per agent and blocks until the topology is
//! operationally ready.
//!
//! Readiness is observed, never assumed — workload scheduling and address
//! allocation are asynchronous relative to the creation calls. Partial
//! success is deliberate: an agent whose endpoint never resolves is
//! returned flagged `unready`, and its siblings proceed normally.

use crate::cluster::{
    owning_workload, ClusterBackend, EndpointSpec, WorkloadSpec,
};
use crate::config::ProvisionSettings;
use crate::error::SimlabError;
use crate::topology::{Agent, ProvisionedAgent, ReadyState, AGENT_API_PORT, AGENT_METRICS_PORT};
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

pub struct Provisioner {
    backend: Arc<dyn ClusterBackend>,
    settings: ProvisionSettings,
    agent_image: String,
}

impl Provisioner {
    pub fn new(
        backend: Arc<dyn ClusterBackend>,
        settings: ProvisionSettings,
        agent_image: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            settings,
            agent_image: agent_image.into(),
        }
    }

    /// Provision every agent and wait for readiness.
    ///
    /// Returns exactly one result per input agent, in input order. A
    /// rejected creation call aborts the whole provision; a readiness
    /// timeout only marks its agent `unready`.
    pub async fn provision(
        &self,
        tenant: &str,
        agents: Vec<Agent>,
    ) -> Result<Vec<ProvisionedAgent>, SimlabError> {
        info!(tenant, count = agents.len(), "provisioning topology");

        // Creation calls for different agents run concurrently; readiness
        // waiting starts only after every creation call has been issued.
        try_join_all(
            agents
                .iter()
                .map(|agent| self.create_agent_resources(tenant, agent)),
        )
        .await?;

        // Map generated instance names back to their owning agent.
        let handles: HashMap<String, String> = self
            .backend
            .list_instances(tenant)
            .await?
            .into_iter()
            .filter_map(|instance| owning_workload(&instance).map(|owner| (owner, instance)))
            .collect();

        let mut results = Vec::with_capacity(agents.len());
        for mut agent in agents {
            match self.wait_for_endpoint(tenant, &agent.id).await {
                Ok(address) => {
                    info!(tenant, agent = %agent.id, %address, "endpoint resolved");
                    agent.resolved_address = Some(address);
                    agent.resolved_handle = handles.get(&agent.id).cloned();
                    // Replica lag past the window degrades to a warning;
                    // the agent keeps its resolved address. Control-plane
                    // failures during the poll still abort the operation.
                    match self.wait_for_workload(tenant, &agent.id).await {
                        Ok(()) => {}
                        Err(e @ SimlabError::ReadinessTimeout { .. }) => {
                            warn!(tenant, agent = %agent.id, error = %e, "workload not fully ready, continuing");
                        }
                        Err(other) => return Err(other),
                    }
                    results.push(ProvisionedAgent {
                        agent,
                        state: ReadyState::Ready,
                    });
                }
                Err(e @ SimlabError::ReadinessTimeout { .. }) => {
                    warn!(tenant, agent = %agent.id, error = %e, "agent endpoint never resolved");
                    results.push(ProvisionedAgent {
                        agent,
                        state: ReadyState::Unready {
                            reason: e.to_string(),
                        },
                    });
                }
                Err(other) => return Err(other),
            }
        }
        Ok(results)
    }

    /// Issue the three creation calls for one agent. Monitor-hook failure
    /// must not abort provisioning.
    async fn create_agent_resources(&self, tenant: &str, agent: &Agent) -> Result<(), SimlabError> {
        self.backend
            .create_workload(&WorkloadSpec {
                name: agent.id.clone(),
                tenant: tenant.to_string(),
                image: self.agent_image.clone(),
                api_port: AGENT_API_PORT,
            })
            .await?;
        self.backend
            .create_endpoint(&EndpointSpec {
                name: agent.id.clone(),
                tenant: tenant.to_string(),
                api_port: AGENT_API_PORT,
                metrics_port: AGENT_METRICS_PORT,
            })
            .await?;
        if let Err(e) = self.backend.create_monitor(tenant, &agent.id).await {
            warn!(tenant, agent = %agent.id, error = %e, "monitor hook creation failed, skipping");
        }
        Ok(())
    }

    /// Poll the endpoint until it reports a routable address, bounded by
    /// the readiness window.
    async fn wait_for_endpoint(&self, tenant: &str, name: &str) -> Result<String, SimlabError> {
        let deadline = Instant::now() + self.settings.readiness_timeout();
        loop {
            if let Some(address) = self.backend.endpoint_address(tenant, name).await? {
                return Ok(address);
            }
            if Instant::now() >= deadline {
                return Err(SimlabError::ReadinessTimeout {
                    resource: format!("endpoint/{}", name),
                    timeout_secs: self.settings.readiness_timeout_secs,
                });
            }
            sleep(self.settings.endpoint_poll_interval()).await;
        }
    }

    /// Poll the workload until ready replicas match desired replicas,
    /// bounded by the readiness window.
    async fn wait_for_workload(&self, tenant: &str, name: &str) -> Result<(), SimlabError> {
        let deadline = Instant::now() + self.settings.readiness_timeout();
        loop {
            let status = self.backend.workload_status(tenant, name).await?;
            if status.is_ready() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SimlabError::ReadinessTimeout {
                    resource: format!("workload/{}", name),
                    timeout_secs: self.settings.readiness_timeout_secs,
                });
            }
            sleep(self.settings.workload_poll_interval()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::mock::MockClusterBackend;
    use crate::topology::AgentKind;

    fn fast_settings() -> ProvisionSettings {
        ProvisionSettings {
            readiness_timeout_secs: 0,
            endpoint_poll_secs: 0,
            workload_poll_secs: 0,
        }
    }

    fn agents(ids: &[&str]) -> Vec<Agent> {
        ids.iter().map(|id| Agent::new(*id, AgentKind::Relay)).collect()
    }

    fn provisioner(backend: Arc<MockClusterBackend>) -> Provisioner {
        Provisioner::new(backend, fast_settings(), "simlab-agent:latest")
    }

    #[tokio::test]
    async fn test_every_agent_gets_exactly_one_result() {
        let backend = Arc::new(MockClusterBackend::new());
        let results = provisioner(backend)
            .provision("u1", agents(&["alpha", "beta", "gamma"]))
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        let ids: Vec<&str> = results.iter().map(|r| r.agent.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta", "gamma"]);
        for result in &results {
            assert!(result.state.is_ready());
            assert!(result.agent.resolved_address.as_deref().map(|a| !a.is_empty()).unwrap_or(false));
            assert!(result
                .agent
                .resolved_handle
                .as_deref()
                .map(|h| h.starts_with(&result.agent.id))
                .unwrap_or(false));
        }
    }

    #[tokio::test]
    async fn test_unready_sibling_does_not_poison_the_rest() {
        let backend = Arc::new(MockClusterBackend::new());
        backend.hold_endpoint_unready("beta");
        let results = provisioner(backend)
            .provision("u1", agents(&["alpha", "beta"]))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].state.is_ready());
        match &results[1].state {
            ReadyState::Unready { reason } => assert!(reason.contains("endpoint/beta")),
            other => panic!("expected beta unready, got {:?}", other),
        }
        assert!(results[1].agent.resolved_address.is_none());
    }

    #[tokio::test]
    async fn test_creation_rejection_aborts_provision() {
        let backend = Arc::new(MockClusterBackend::new());
        backend.reject_creation("beta");
        let err = provisioner(backend)
            .provision("u1", agents(&["alpha", "beta"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SimlabError::ResourceCreation { .. }));
    }

    #[tokio::test]
    async fn test_monitor_failure_is_best_effort() {
        let backend = Arc::new(MockClusterBackend::new());
        backend.reject_monitor("alpha");
        let results = provisioner(backend)
            .provision("u1", agents(&["alpha"]))
            .await
            .unwrap();
        assert!(results[0].state.is_ready());
    }

    #[tokio::test]
    async fn test_backend_failure_during_workload_poll_aborts() {
        let backend = Arc::new(MockClusterBackend::new());
        backend.fail_workload_status("alpha");
        // Only the replica-lag timeout is tolerated; a control-plane
        // failure while polling must fail the provision, not mark ready.
        let err = provisioner(backend)
            .provision("u1", agents(&["alpha"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SimlabError::Backend(_)));
    }

    #[tokio::test]
    async fn test_lagging_replicas_degrade_to_ready_with_warning() {
        let backend = Arc::new(MockClusterBackend::new());
        backend.hold_workload_lagging("alpha");
        let results = provisioner(backend)
            .provision("u1", agents(&["alpha"]))
            .await
            .unwrap();
        // Replica lag past the window is non-fatal: address is kept.
        assert!(results[0].state.is_ready());
        assert!(results[0].agent.resolved_address.is_some());
    }
}
