//! Agent Directive Dispatcher.
//!
//! Issues out-of-band commands to already-provisioned agents over their
//! resolved addresses. Requests carry a short timeout and are never
//! retried; any connection or timeout failure surfaces as
//! `AgentUnreachable` and the caller decides whether that is fatal (in the
//! orchestration flows it never is — logged and skipped).

use crate::config::DispatchSettings;
use crate::error::SimlabError;
use crate::topology::AGENT_API_PORT;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// HTTP verb for a metric directive: POST creates, PUT modifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricMethod {
    Post,
    Put,
}

/// Next-hop registration payload understood by the agent wire protocol.
#[derive(Debug, Clone, Serialize)]
pub struct NextHopAddress {
    pub ip: String,
    pub port: u16,
}

/// Outbound directive client.
pub struct AgentDirectiveDispatcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl AgentDirectiveDispatcher {
    pub fn new(settings: &DispatchSettings) -> Result<Self, SimlabError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| SimlabError::Backend(format!("building directive client: {}", e)))?;
        Ok(Self {
            client,
            timeout: settings.timeout(),
        })
    }

    fn unreachable(address: &str, error: reqwest::Error) -> SimlabError {
        SimlabError::AgentUnreachable {
            address: address.to_string(),
            reason: error.to_string(),
        }
    }

    async fn check_status(
        address: &str,
        response: reqwest::Response,
    ) -> Result<(), SimlabError> {
        if response.status().is_success() {
            return Ok(());
        }
        Err(SimlabError::AgentUnreachable {
            address: address.to_string(),
            reason: format!("agent responded HTTP {}", response.status()),
        })
    }

    /// Register `target_id` as a next hop on the agent at `source_address`.
    pub async fn set_next_hop(
        &self,
        source_address: &str,
        target_id: &str,
        target: &NextHopAddress,
    ) -> Result<(), SimlabError> {
        let url = format!(
            "http://{}:{}/agents/{}",
            source_address, AGENT_API_PORT, target_id
        );
        debug!(url = %url, target_ip = %target.ip, "registering next hop");
        let response = self
            .client
            .post(&url)
            .json(target)
            .send()
            .await
            .map_err(|e| Self::unreachable(source_address, e))?;
        Self::check_status(source_address, response).await
    }

    /// Create or modify a metric on the agent at `address`.
    pub async fn set_metric(
        &self,
        method: MetricMethod,
        address: &str,
        name: &str,
        value: i64,
    ) -> Result<(), SimlabError> {
        let url = format!("http://{}:{}/metrics/{}", address, AGENT_API_PORT, name);
        let request = match method {
            MetricMethod::Post => self.client.post(&url),
            MetricMethod::Put => self.client.put(&url),
        };
        debug!(url = %url, value, ?method, "setting metric");
        let response = request
            .query(&[("name", name), ("value", &value.to_string())])
            .send()
            .await
            .map_err(|e| Self::unreachable(address, e))?;
        Self::check_status(address, response).await
    }

    /// Read a metric's current value from the agent at `address`.
    pub async fn get_metric(&self, address: &str, name: &str) -> Result<String, SimlabError> {
        let url = format!("http://{}:{}/metrics/{}", address, AGENT_API_PORT, name);
        debug!(url = %url, "reading metric");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::unreachable(address, e))?;
        if !response.status().is_success() {
            return Err(SimlabError::AgentUnreachable {
                address: address.to_string(),
                reason: format!("agent responded HTTP {}", response.status()),
            });
        }
        response
            .text()
            .await
            .map_err(|e| Self::unreachable(address, e))
    }

    /// Start a local relay counter on the agent at `address`.
    pub async fn kick_directive(&self, address: &str, step_budget: u32) -> Result<(), SimlabError> {
        let url = format!("http://{}:{}/kick", address, AGENT_API_PORT);
        debug!(url = %url, step_budget, "kicking agent");
        let response = self
            .client
            .post(&url)
            .json(&json!({ "count": step_budget }))
            .send()
            .await
            .map_err(|e| Self::unreachable(address, e))?;
        Self::check_status(address, response).await
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
