//! Simulation orchestration flows.
//!
//! One facade per process, constructed from settings at startup. Each flow
//! mirrors a tenant request: submit a topology, read it back, tear it
//! down, kick a traversal, or push a metric to a provisioned agent.
//! Directive dispatch inside these flows is best-effort — an unreachable
//! agent is logged and skipped, never fatal to the flow.

use crate::cluster::{owning_workload, ClusterBackend};
use crate::config::Settings;
use crate::dispatch::{AgentDirectiveDispatcher, MetricMethod, NextHopAddress};
use crate::error::SimlabError;
use crate::graph::traversal::{TraversalReport, TraversalSimulator};
use crate::graph::CommGraphStore;
use crate::provision::Provisioner;
use crate::store::TopologyStore;
use crate::teardown::TeardownCoordinator;
use crate::topology::{ProvisionedAgent, Topology, AGENT_API_PORT};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct SimulationOrchestrator {
    backend: Arc<dyn ClusterBackend>,
    provisioner: Provisioner,
    teardown: TeardownCoordinator,
    topologies: TopologyStore,
    graph: Arc<CommGraphStore>,
    traversal: TraversalSimulator,
    dispatcher: AgentDirectiveDispatcher,
}

impl SimulationOrchestrator {
    pub fn new(backend: Arc<dyn ClusterBackend>, settings: &Settings) -> Result<Self, SimlabError> {
        let graph = Arc::new(CommGraphStore::new(
            settings.graph.document_dir.clone(),
            settings.graph.lock_timeout(),
        ));
        Ok(Self {
            provisioner: Provisioner::new(
                backend.clone(),
                settings.provision.clone(),
                settings.cluster.agent_image.clone(),
            ),
            teardown: TeardownCoordinator::new(backend.clone()),
            topologies: TopologyStore::new(backend.clone()),
            traversal: TraversalSimulator::new(graph.clone()),
            dispatcher: AgentDirectiveDispatcher::new(&settings.dispatch)?,
            graph,
            backend,
        })
    }

    /// Submit a topology: provision its resources, record the communication
    /// graph, push next-hop directives to the resolved agents, and persist
    /// the annotated topology. Returns the per-agent provision statuses.
    pub async fn create_simulation(
        &self,
        mut topology: Topology,
    ) -> Result<Vec<ProvisionedAgent>, SimlabError> {
        let tenant = topology.tenant.clone();
        let results = self
            .provisioner
            .provision(&tenant, topology.agents.clone())
            .await?;

        // Fold resolved identities back into the topology being persisted.
        for result in &results {
            if let Some(agent) = topology.agent_mut(&result.agent.id) {
                agent.resolved_address = result.agent.resolved_address.clone();
                agent.resolved_handle = result.agent.resolved_handle.clone();
            }
        }

        let edges = topology.edges.clone();
        for edge in &edges {
            self.graph.add_edge(&tenant, &edge.source, &edge.target)?;

            let source_address = topology
                .agent(&edge.source)
                .and_then(|a| a.resolved_address.clone());
            let target_ip = topology
                .agent(&edge.target)
                .and_then(|a| a.resolved_address.clone());
            match (source_address, target_ip) {
                (Some(source), Some(ip)) => {
                    let next_hop = NextHopAddress {
                        ip,
                        port: AGENT_API_PORT,
                    };
                    if let Err(e) = self
                        .dispatcher
                        .set_next_hop(&source, &edge.target, &next_hop)
                        .await
                    {
                        warn!(tenant = %tenant, source = %edge.source, target = %edge.target,
                              error = %e, "next-hop directive failed, continuing");
                    }
                }
                _ => warn!(tenant = %tenant, source = %edge.source, target = %edge.target,
                           "edge endpoints not resolved, next-hop directive skipped"),
            }
        }

        self.topologies.save(&topology).await?;
        info!(tenant = %tenant, agents = results.len(), "simulation created");
        Ok(results)
    }

    /// Load the tenant's topology, refreshing each agent's instance handle
    /// from a live listing.
    pub async fn get_simulation(&self, tenant: &str) -> Result<Topology, SimlabError> {
        let mut topology = self.topologies.load(tenant).await?;
        let handles: HashMap<String, String> = self
            .backend
            .list_instances(tenant)
            .await?
            .into_iter()
            .filter_map(|instance| owning_workload(&instance).map(|owner| (owner, instance)))
            .collect();
        for agent in &mut topology.agents {
            if let Some(handle) = handles.get(&agent.id) {
                agent.resolved_handle = Some(handle.clone());
            }
        }
        Ok(topology)
    }

    /// Tear down every resource of the tenant's topology.
    pub async fn delete_simulation(&self, tenant: &str) -> Result<(), SimlabError> {
        self.teardown.teardown(tenant).await
    }

    /// Run a kick: a bounded random walk from `start`, issuing a kick
    /// directive to each visited agent with its remaining step budget.
    pub async fn kick<R: Rng>(
        &self,
        tenant: &str,
        start: &str,
        max_steps: u32,
        rng: &mut R,
    ) -> Result<TraversalReport, SimlabError> {
        let report = self.traversal.kick(tenant, start, max_steps, rng)?;
        info!(tenant, start, hops = report.hops.len(), dead_end = report.dead_end, "kick walked");

        // Addresses come from the stored topology; a tenant kicking a
        // graph without a live topology just skips dispatch.
        let topology = match self.topologies.load(tenant).await {
            Ok(topology) => topology,
            Err(SimlabError::TopologyNotFound(_)) => return Ok(report),
            Err(e) => return Err(e),
        };
        for (index, hop) in report.hops.iter().enumerate() {
            let remaining = max_steps - index as u32;
            match topology
                .agent(&hop.from)
                .and_then(|a| a.resolved_address.as_deref())
            {
                Some(address) => {
                    if let Err(e) = self.dispatcher.kick_directive(address, remaining).await {
                        warn!(tenant, agent = %hop.from, error = %e, "kick directive failed, continuing");
                    }
                }
                None => {
                    warn!(tenant, agent = %hop.from, "no resolved address, kick directive skipped")
                }
            }
        }
        Ok(report)
    }

    /// Create (`POST`) or modify (`PUT`) a metric on one agent, resolved
    /// through the stored topology.
    pub async fn set_metric(
        &self,
        tenant: &str,
        agent_id: &str,
        method: MetricMethod,
        name: &str,
        value: i64,
    ) -> Result<(), SimlabError> {
        let topology = self.topologies.load(tenant).await?;
        let address = topology
            .agent(agent_id)
            .and_then(|a| a.resolved_address.clone())
            .ok_or_else(|| SimlabError::AgentUnreachable {
                address: agent_id.to_string(),
                reason: "agent has no resolved address".to_string(),
            })?;
        self.dispatcher
            .set_metric(method, &address, name, value)
            .await
    }

    /// Read a metric's current value from one agent.
    pub async fn get_metric(
        &self,
        tenant: &str,
        agent_id: &str,
        name: &str,
    ) -> Result<String, SimlabError> {
        let topology = self.topologies.load(tenant).await?;
        let address = topology
            .agent(agent_id)
            .and_then(|a| a.resolved_address.clone())
            .ok_or_else(|| SimlabError::AgentUnreachable {
                address: agent_id.to_string(),
                reason: "agent has no resolved address".to_string(),
            })?;
        self.dispatcher.get_metric(&address, name).await
    }

    /// Drop the tenant's communication graph. The graph outlives topology
    /// teardown by design, so this is an explicit separate operation.
    pub fn reset_graph(&self, tenant: &str) -> Result<(), SimlabError> {
        self.graph.clear(tenant)
    }

    /// Shared handle to the communication graph store.
    pub fn graph(&self) -> &Arc<CommGraphStore> {
        &self.graph
    }
}
