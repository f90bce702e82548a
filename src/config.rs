//! Runtime settings.
//!
//! Layered the usual way: built-in defaults, then an optional TOML file,
//! then `SIMLAB_*` environment variables (double underscore for nesting,
//! e.g. `SIMLAB_CLUSTER__NAMESPACE`). Everything downstream receives an
//! explicit `Settings` value; there is no ambient global configuration.

use crate::error::SimlabError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which `ClusterBackend` implementation to construct at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-memory backend; no cluster required.
    Mock,
    /// REST backend against a live cluster control plane.
    Cluster,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Mock
    }
}

/// Connection settings for the cluster REST backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// Control-plane base URL, e.g. `https://api.cluster.local:6443`.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Bearer token; omitted for anonymous local development.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Image every agent workload runs.
    #[serde(default = "default_agent_image")]
    pub agent_image: String,
}

fn default_api_url() -> String {
    "http://127.0.0.1:6443".to_string()
}

fn default_namespace() -> String {
    "simlab".to_string()
}

fn default_agent_image() -> String {
    "simlab-agent:latest".to_string()
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            namespace: default_namespace(),
            agent_image: default_agent_image(),
        }
    }
}

/// Readiness wait windows for the provisioner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionSettings {
    /// Hard cap on waiting for an endpoint address or workload readiness.
    #[serde(default = "default_readiness_timeout_secs")]
    pub readiness_timeout_secs: u64,
    /// Interval between endpoint address observations.
    #[serde(default = "default_endpoint_poll_secs")]
    pub endpoint_poll_secs: u64,
    /// Interval between workload ready-replica observations.
    #[serde(default = "default_workload_poll_secs")]
    pub workload_poll_secs: u64,
}

fn default_readiness_timeout_secs() -> u64 {
    300
}

fn default_endpoint_poll_secs() -> u64 {
    1
}

fn default_workload_poll_secs() -> u64 {
    5
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            readiness_timeout_secs: default_readiness_timeout_secs(),
            endpoint_poll_secs: default_endpoint_poll_secs(),
            workload_poll_secs: default_workload_poll_secs(),
        }
    }
}

impl ProvisionSettings {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn endpoint_poll_interval(&self) -> Duration {
        Duration::from_secs(self.endpoint_poll_secs)
    }

    pub fn workload_poll_interval(&self) -> Duration {
        Duration::from_secs(self.workload_poll_secs)
    }
}

/// Communication-graph document storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSettings {
    /// Directory holding one adjacency document per tenant.
    #[serde(default = "default_graph_dir")]
    pub document_dir: PathBuf,
    /// Bound on tenant lock acquisition.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_graph_dir() -> PathBuf {
    PathBuf::from("/var/lib/simlab/graphs")
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            document_dir: default_graph_dir(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl GraphSettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Outbound agent directive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Short request timeout; directives are fire-and-observe, never retried.
    #[serde(default = "default_dispatch_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_dispatch_timeout_ms() -> u64 {
    2000
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_dispatch_timeout_ms(),
        }
    }
}

impl DispatchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Top-level settings object, constructed once at startup and passed down.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub cluster: ClusterSettings,
    #[serde(default)]
    pub provision: ProvisionSettings,
    #[serde(default)]
    pub graph: GraphSettings,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load settings: defaults, then the optional file, then `SIMLAB_*` env.
    pub fn load(file: Option<&Path>) -> Result<Self, SimlabError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("SIMLAB")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| SimlabError::Config(e.to_string()))
    }
}
