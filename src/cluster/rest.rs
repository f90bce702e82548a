//! REST implementation of [`ClusterBackend`] against a Kubernetes-style
//! control plane.
//!
//! Workloads are Deployments, endpoints are Services, monitoring hooks are
//! ServiceMonitors, and the tenant state document is a ConfigMap. All reads
//! and deletes go through the tenant+role label selector.

use super::{
    tenant_selector, ClusterBackend, Deletion, EndpointSpec, ResourceKind, WorkloadSpec,
    WorkloadStatus,
};
use crate::config::ClusterSettings;
use crate::error::SimlabError;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

/// Reqwest-backed control-plane client.
pub struct RestClusterBackend {
    client: reqwest::Client,
    base_url: String,
    namespace: String,
    token: Option<String>,
}

impl RestClusterBackend {
    pub fn new(settings: &ClusterSettings) -> Result<Self, SimlabError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SimlabError::Backend(format!("building HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            namespace: settings.namespace.clone(),
            token: settings.token.clone(),
        })
    }

    fn collection_path(&self, kind: ResourceKind) -> String {
        match kind {
            ResourceKind::Workload => {
                format!("/apis/apps/v1/namespaces/{}/deployments", self.namespace)
            }
            ResourceKind::Endpoint => format!("/api/v1/namespaces/{}/services", self.namespace),
            ResourceKind::Monitor => format!(
                "/apis/monitoring.coreos.com/v1/namespaces/{}/servicemonitors",
                self.namespace
            ),
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<reqwest::Response, SimlabError> {
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        builder
            .send()
            .await
            .map_err(|e| SimlabError::Backend(format!("control plane unreachable: {}", e)))
    }

    /// Issue a create call, mapping rejection statuses to `ResourceCreation`.
    async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        manifest: Value,
    ) -> Result<(), SimlabError> {
        let path = self.collection_path(kind);
        let response = self.send(Method::POST, &path, Some(manifest)).await?;
        let status = response.status();
        if status.is_success() {
            debug!(kind = kind.as_str(), name, "resource created");
            return Ok(());
        }
        let reason = read_failure_message(response).await;
        match status {
            StatusCode::CONFLICT | StatusCode::FORBIDDEN | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(SimlabError::ResourceCreation {
                    resource: format!("{}/{}", kind.as_str(), name),
                    reason,
                })
            }
            _ => Err(SimlabError::Backend(format!(
                "creating {}/{}: HTTP {}: {}",
                kind.as_str(),
                name,
                status,
                reason
            ))),
        }
    }

    async fn get_json(&self, path: &str) -> Result<Option<Value>, SimlabError> {
        let response = self.send(Method::GET, path, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let reason = read_failure_message(response).await;
            return Err(SimlabError::Backend(format!(
                "GET {}: HTTP {}: {}",
                path, status, reason
            )));
        }
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| SimlabError::Backend(format!("decoding {}: {}", path, e)))
    }

    fn labels(&self, tenant: &str, name: &str) -> Value {
        let mut labels = serde_json::Map::new();
        labels.insert("app".to_string(), json!(name));
        labels.insert(super::TENANT_LABEL.to_string(), json!(tenant));
        labels.insert(super::ROLE_LABEL.to_string(), json!(super::AGENT_ROLE));
        Value::Object(labels)
    }

    /// All tenants share one namespace, so resource names carry the tenant
    /// as a prefix. Two tenants reusing the same agent id must not collide
    /// on the control plane's per-namespace name uniqueness.
    fn scoped_name(tenant: &str, name: &str) -> String {
        format!("{}-{}", tenant, name)
    }

    /// Strip the tenant prefix from a control-plane resource name. Names
    /// belonging to other tenants yield `None`.
    fn unscoped_name(tenant: &str, name: &str) -> Option<String> {
        name.strip_prefix(tenant)
            .and_then(|rest| rest.strip_prefix('-'))
            .map(str::to_string)
    }

    fn state_document_path(&self, tenant: &str) -> String {
        format!(
            "/api/v1/namespaces/{}/configmaps/simlab-state-{}",
            self.namespace, tenant
        )
    }
}

async fn read_failure_message(response: reqwest::Response) -> String {
    match response.json::<Value>().await {
        Ok(body) => body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no failure message")
            .to_string(),
        Err(_) => "unreadable failure body".to_string(),
    }
}

fn item_names(list: &Value) -> Vec<String> {
    list.get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    item.pointer("/metadata/name")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ClusterBackend for RestClusterBackend {
    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<(), SimlabError> {
        let name = Self::scoped_name(&spec.tenant, &spec.name);
        let labels = self.labels(&spec.tenant, &name);
        let manifest = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": name, "labels": labels.clone() },
            "spec": {
                "replicas": 1,
                "selector": { "matchLabels": { "app": name } },
                "template": {
                    "metadata": { "labels": labels },
                    "spec": {
                        "containers": [{
                            "name": "core",
                            "image": spec.image,
                            "ports": [{ "containerPort": spec.api_port }],
                            "readinessProbe": {
                                "httpGet": { "path": "/", "port": spec.api_port },
                                "initialDelaySeconds": 3,
                                "periodSeconds": 3
                            }
                        }]
                    }
                }
            }
        });
        self.create(ResourceKind::Workload, &name, manifest).await
    }

    async fn create_endpoint(&self, spec: &EndpointSpec) -> Result<(), SimlabError> {
        let name = Self::scoped_name(&spec.tenant, &spec.name);
        let manifest = json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {
                "name": name,
                "labels": self.labels(&spec.tenant, &name)
            },
            "spec": {
                "selector": { "app": name },
                "ports": [
                    { "protocol": "TCP", "port": spec.api_port, "targetPort": spec.api_port, "name": "api" },
                    { "protocol": "TCP", "port": spec.metrics_port, "targetPort": spec.metrics_port, "name": "metrics" }
                ]
            }
        });
        self.create(ResourceKind::Endpoint, &name, manifest).await
    }

    async fn create_monitor(&self, tenant: &str, name: &str) -> Result<(), SimlabError> {
        let name = Self::scoped_name(tenant, name);
        let manifest = json!({
            "apiVersion": "monitoring.coreos.com/v1",
            "kind": "ServiceMonitor",
            "metadata": { "name": name, "labels": self.labels(tenant, &name) },
            "spec": {
                "selector": { "matchLabels": { "app": name } },
                "endpoints": [{ "port": "metrics", "interval": "30s" }]
            }
        });
        self.create(ResourceKind::Monitor, &name, manifest).await
    }

    async fn list_instances(&self, tenant: &str) -> Result<Vec<String>, SimlabError> {
        let path = format!(
            "/api/v1/namespaces/{}/pods?labelSelector={}",
            self.namespace,
            tenant_selector(tenant)
        );
        let list = self
            .get_json(&path)
            .await?
            .ok_or_else(|| SimlabError::Backend("pod listing not available".to_string()))?;
        Ok(item_names(&list)
            .into_iter()
            .filter_map(|name| Self::unscoped_name(tenant, &name))
            .collect())
    }

    async fn list_resources(
        &self,
        tenant: &str,
        kind: ResourceKind,
    ) -> Result<Vec<String>, SimlabError> {
        let path = format!(
            "{}?labelSelector={}",
            self.collection_path(kind),
            tenant_selector(tenant)
        );
        let list = self.get_json(&path).await?.ok_or_else(|| {
            SimlabError::Backend(format!("{} listing not available", kind.as_str()))
        })?;
        Ok(item_names(&list)
            .into_iter()
            .filter_map(|name| Self::unscoped_name(tenant, &name))
            .collect())
    }

    async fn endpoint_address(
        &self,
        tenant: &str,
        name: &str,
    ) -> Result<Option<String>, SimlabError> {
        let path = format!(
            "{}/{}",
            self.collection_path(ResourceKind::Endpoint),
            Self::scoped_name(tenant, name)
        );
        let service = match self.get_json(&path).await? {
            Some(service) => service,
            None => return Ok(None),
        };
        let address = service
            .pointer("/spec/clusterIP")
            .and_then(Value::as_str)
            .filter(|ip| !ip.is_empty() && *ip != "None")
            .map(str::to_string);
        Ok(address)
    }

    async fn workload_status(
        &self,
        tenant: &str,
        name: &str,
    ) -> Result<WorkloadStatus, SimlabError> {
        let path = format!(
            "{}/{}",
            self.collection_path(ResourceKind::Workload),
            Self::scoped_name(tenant, name)
        );
        let deployment = self
            .get_json(&path)
            .await?
            .ok_or_else(|| SimlabError::Backend(format!("workload {} not found", name)))?;
        let desired = deployment
            .pointer("/spec/replicas")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        // readyReplicas is omitted entirely while zero pods are ready.
        let ready = deployment
            .pointer("/status/readyReplicas")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        Ok(WorkloadStatus {
            desired_replicas: desired,
            ready_replicas: ready,
        })
    }

    async fn delete_resource(
        &self,
        tenant: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Deletion, SimlabError> {
        let path = format!(
            "{}/{}",
            self.collection_path(kind),
            Self::scoped_name(tenant, name)
        );
        let response = self.send(Method::DELETE, &path, None).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(Deletion::NotFound),
            status if status.is_success() => Ok(Deletion::Deleted),
            status => {
                let reason = read_failure_message(response).await;
                Err(SimlabError::Backend(format!(
                    "deleting {}/{}: HTTP {}: {}",
                    kind.as_str(),
                    name,
                    status,
                    reason
                )))
            }
        }
    }

    async fn read_state_document(&self, tenant: &str) -> Result<Option<Vec<u8>>, SimlabError> {
        let document = match self.get_json(&self.state_document_path(tenant)).await? {
            Some(document) => document,
            None => return Ok(None),
        };
        Ok(document
            .pointer("/data/topology")
            .and_then(Value::as_str)
            .map(|s| s.as_bytes().to_vec()))
    }

    async fn write_state_document(&self, tenant: &str, data: Vec<u8>) -> Result<(), SimlabError> {
        let payload = String::from_utf8(data)
            .map_err(|e| SimlabError::Backend(format!("state document not UTF-8: {}", e)))?;
        let name = format!("simlab-state-{}", tenant);
        let manifest = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": name, "labels": self.labels(tenant, &name) },
            "data": { "topology": payload }
        });

        // Whole-document replace: create, or overwrite on conflict.
        let collection = format!("/api/v1/namespaces/{}/configmaps", self.namespace);
        let response = self
            .send(Method::POST, &collection, Some(manifest.clone()))
            .await?;
        if response.status() == StatusCode::CONFLICT {
            let response = self
                .send(
                    Method::PUT,
                    &self.state_document_path(tenant),
                    Some(manifest),
                )
                .await?;
            if !response.status().is_success() {
                let status = response.status();
                let reason = read_failure_message(response).await;
                return Err(SimlabError::Backend(format!(
                    "replacing state document for {}: HTTP {}: {}",
                    tenant, status, reason
                )));
            }
            return Ok(());
        }
        if !response.status().is_success() {
            let status = response.status();
            let reason = read_failure_message(response).await;
            return Err(SimlabError::Backend(format!(
                "writing state document for {}: HTTP {}: {}",
                tenant, status, reason
            )));
        }
        Ok(())
    }

    async fn delete_state_document(&self, tenant: &str) -> Result<Deletion, SimlabError> {
        let response = self
            .send(Method::DELETE, &self.state_document_path(tenant), None)
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(Deletion::NotFound),
            status if status.is_success() => Ok(Deletion::Deleted),
            status => {
                let reason = read_failure_message(response).await;
                Err(SimlabError::Backend(format!(
                    "deleting state document for {}: HTTP {}: {}",
                    tenant, status, reason
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_names_extracts_metadata_names() {
        let list = json!({
            "items": [
                { "metadata": { "name": "alpha" } },
                { "metadata": { "name": "beta" } },
                { "metadata": {} }
            ]
        });
        assert_eq!(item_names(&list), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_item_names_tolerates_missing_items() {
        assert!(item_names(&json!({})).is_empty());
    }

    #[test]
    fn test_resource_names_carry_the_tenant() {
        assert_eq!(RestClusterBackend::scoped_name("u1", "alpha"), "u1-alpha");
        assert_eq!(
            RestClusterBackend::unscoped_name("u1", "u1-alpha").as_deref(),
            Some("alpha")
        );
        // Two tenants reusing an agent id resolve to distinct names, and a
        // tenant never sees another tenant's resources through unscoping.
        assert_ne!(
            RestClusterBackend::scoped_name("u1", "A"),
            RestClusterBackend::scoped_name("u2", "A")
        );
        assert_eq!(RestClusterBackend::unscoped_name("u2", "u1-alpha"), None);
    }

    #[test]
    fn test_unscoped_instance_names_map_back_to_agents() {
        let instance = RestClusterBackend::unscoped_name("u1", "u1-alpha-7f6d4c9b8-x2j4z").unwrap();
        assert_eq!(
            crate::cluster::owning_workload(&instance).as_deref(),
            Some("alpha")
        );
    }

    #[test]
    fn test_collection_paths_are_namespaced() {
        let backend = RestClusterBackend::new(&ClusterSettings {
            api_url: "https://api.cluster:6443/".to_string(),
            token: None,
            namespace: "lab".to_string(),
            agent_image: "simlab-agent:latest".to_string(),
        })
        .unwrap();
        assert_eq!(
            backend.collection_path(ResourceKind::Workload),
            "/apis/apps/v1/namespaces/lab/deployments"
        );
        assert_eq!(
            backend.collection_path(ResourceKind::Endpoint),
            "/api/v1/namespaces/lab/services"
        );
        assert_eq!(
            backend.collection_path(ResourceKind::Monitor),
            "/apis/monitoring.coreos.com/v1/namespaces/lab/servicemonitors"
        );
        assert_eq!(backend.base_url, "https://api.cluster:6443");
    }
}
