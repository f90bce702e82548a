//! Error taxonomy for orchestration, graph storage, and agent dispatch.
//!
//! Graph document corruption is intentionally absent: a corrupt or missing
//! adjacency document is recovered in place as an empty graph and never
//! surfaced to callers.

use thiserror::Error;

/// Errors surfaced by the simulation core.
#[derive(Debug, Error)]
pub enum SimlabError {
    /// A resource creation call was rejected by the control plane.
    /// Not retried; aborts the enclosing provision.
    #[error("resource creation rejected for {resource}: {reason}")]
    ResourceCreation { resource: String, reason: String },

    /// A created resource never became ready within the wait window.
    /// Degrades to a per-agent `unready` status, never a whole-operation failure.
    #[error("{resource} did not become ready within {timeout_secs}s")]
    ReadinessTimeout { resource: String, timeout_secs: u64 },

    /// One or more deletion calls failed after "not found" was excluded.
    /// Carries the identifiers that were left behind.
    #[error("teardown left {} resource(s) undeleted: {}", failed.len(), failed.join(", "))]
    TeardownPartialFailure { failed: Vec<String> },

    /// An outbound directive to a provisioned agent failed or timed out.
    /// Logged by callers, not retried; never aborts the enclosing flow.
    #[error("agent at {address} unreachable: {reason}")]
    AgentUnreachable { address: String, reason: String },

    /// Scoped lock acquisition exceeded its deadline.
    #[error("lock acquisition timed out for tenant {tenant} after {timeout_ms}ms")]
    LockTimeout { tenant: String, timeout_ms: u64 },

    /// The cluster control plane is unavailable or returned an unexpected response.
    #[error("cluster backend error: {0}")]
    Backend(String),

    /// No stored topology for the tenant. Distinct from an empty-but-present topology.
    #[error("no topology stored for tenant {0}")]
    TopologyNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SimlabError {
    /// True when the error should be tolerated by best-effort flows
    /// (directive dispatch, monitor-hook creation).
    pub fn is_best_effort(&self) -> bool {
        matches!(self, SimlabError::AgentUnreachable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_partial_failure_lists_identifiers() {
        let err = SimlabError::TeardownPartialFailure {
            failed: vec!["svc/a".to_string(), "deploy/b".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 resource(s)"));
        assert!(msg.contains("svc/a"));
        assert!(msg.contains("deploy/b"));
    }

    #[test]
    fn test_agent_unreachable_is_best_effort() {
        let err = SimlabError::AgentUnreachable {
            address: "10.0.0.1".to_string(),
            reason: "timed out".to_string(),
        };
        assert!(err.is_best_effort());
        assert!(!SimlabError::TopologyNotFound("u1".to_string()).is_best_effort());
    }
}
