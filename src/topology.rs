//! Topology data model: agents, edges, and the per-tenant submission unit.
//!
//! A topology is the whole declared set of agents and directed edges for one
//! tenant. Exactly one live topology exists per tenant; it is replaced or
//! deleted as a whole, never partially mutated.

use serde::{Deserialize, Serialize};

/// Primary port every provisioned agent listens on.
pub const AGENT_API_PORT: u16 = 8080;
/// Port agents expose scrape metrics on.
pub const AGENT_METRICS_PORT: u16 = 8081;

/// Workload profile an agent is provisioned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Default relay profile.
    Relay,
    /// Profile that originates traffic (accepts kick directives).
    Emitter,
}

impl Default for AgentKind {
    fn default() -> Self {
        AgentKind::Relay
    }
}

/// Cosmetic canvas position carried through from the submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A simulated workload node, backed by one workload and one endpoint.
///
/// `resolved_address` and `resolved_handle` are empty on submission and
/// filled in once by the provisioner when the backing resources are ready.
/// They are never mutated afterward except by a full re-provision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique within the tenant.
    pub id: String,
    #[serde(default)]
    pub kind: AgentKind,
    #[serde(default)]
    pub position: Position,
    /// Routable address of the agent's endpoint, set by the provisioner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_address: Option<String>,
    /// Generated instance name of the backing workload, set by the provisioner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_handle: Option<String>,
}

impl Agent {
    pub fn new(id: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            id: id.into(),
            kind,
            position: Position::default(),
            resolved_address: None,
            resolved_handle: None,
        }
    }
}

/// A directed communication edge between two agents of the same tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// The full declared topology for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    pub tenant: String,
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Topology {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            agents: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Find an agent by id.
    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn agent_mut(&mut self, id: &str) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| a.id == id)
    }
}

/// Readiness outcome for one agent of a provision call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "status")]
pub enum ReadyState {
    /// Endpoint resolved; address is routable.
    Ready,
    /// Endpoint never reported an address within the wait window.
    Unready { reason: String },
}

impl ReadyState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadyState::Ready)
    }
}

/// Per-agent provision result. Agents that failed readiness are present
/// and flagged, never omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedAgent {
    pub agent: Agent,
    pub state: ReadyState,
}
