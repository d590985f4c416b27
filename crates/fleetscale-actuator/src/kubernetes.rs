//! Kubernetes REST implementation of [`Orchestrator`].
//!
//! Talks to the API server over plain HTTP. Inside a cluster this is a
//! `kubectl proxy` sidecar that terminates TLS and authenticates; a bearer
//! token can still be attached for API servers exposed without one.

use std::collections::BTreeSet;
use std::time::Duration;

use http::Method;
use serde::Deserialize;
use tracing::{debug, info};

use fleetscale_core::http::{self as transport, HttpResponse};
use fleetscale_core::{FleetscaleConfig, InstanceId};

use crate::error::{ActuatorError, ActuatorResult};
use crate::Orchestrator;

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: ObjectMeta,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
}

#[derive(Debug, Clone)]
pub struct KubernetesOrchestrator {
    api_server: String,
    namespace: String,
    deployment: String,
    selector: String,
    token: Option<String>,
    timeout: Duration,
}

impl KubernetesOrchestrator {
    pub fn new(
        api_server: impl Into<String>,
        namespace: impl Into<String>,
        deployment: impl Into<String>,
        selector: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            api_server: api_server.into().trim_end_matches('/').to_string(),
            namespace: namespace.into(),
            deployment: deployment.into(),
            selector: selector.into(),
            token: None,
            timeout,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Build from the `[fleet]` and `[orchestrator]` config sections,
    /// reading the token file if one is configured.
    pub fn from_config(config: &FleetscaleConfig) -> ActuatorResult<Self> {
        let timeout = config.orchestrator_timeout()?;
        let mut orchestrator = Self::new(
            config.orchestrator.api_server.clone(),
            config.fleet.namespace.clone(),
            config.fleet.deployment.clone(),
            config.fleet.selector.clone(),
            timeout,
        );
        if let Some(path) = &config.orchestrator.token_file {
            let token = std::fs::read_to_string(path).map_err(|source| ActuatorError::Token {
                path: path.clone(),
                source,
            })?;
            orchestrator = orchestrator.with_token(token.trim());
        }
        Ok(orchestrator)
    }

    fn pods_url(&self) -> String {
        format!(
            "{}/api/v1/namespaces/{}/pods?labelSelector={}",
            self.api_server,
            self.namespace,
            encode_query_value(&self.selector)
        )
    }

    fn scale_url(&self) -> String {
        format!(
            "{}/apis/apps/v1/namespaces/{}/deployments/{}/scale",
            self.api_server, self.namespace, self.deployment
        )
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        content_type: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> ActuatorResult<HttpResponse> {
        let authorization = self.token.as_ref().map(|t| format!("Bearer {t}"));
        let mut headers: Vec<(&str, &str)> = Vec::new();
        if let Some(auth) = authorization.as_deref() {
            headers.push(("authorization", auth));
        }
        if let Some(ct) = content_type {
            headers.push(("content-type", ct));
        }

        let resp = transport::send(method, url, &headers, body, self.timeout).await?;
        if !resp.is_success() {
            return Err(ActuatorError::Api {
                status: resp.status.as_u16(),
                body: resp.text(),
            });
        }
        Ok(resp)
    }
}

impl Orchestrator for KubernetesOrchestrator {
    async fn current_instances(&self) -> ActuatorResult<BTreeSet<InstanceId>> {
        let resp = self
            .request(Method::GET, &self.pods_url(), None, None)
            .await?;
        let pods: PodList = resp
            .json()
            .map_err(|e| ActuatorError::Decode(format!("pod list: {e}")))?;
        let names: BTreeSet<InstanceId> =
            pods.items.into_iter().map(|p| p.metadata.name).collect();

        debug!(
            namespace = %self.namespace,
            selector = %self.selector,
            instances = names.len(),
            "listed fleet instances"
        );
        Ok(names)
    }

    async fn apply_instance_count(&self, count: u32) -> ActuatorResult<()> {
        if count == 0 {
            return Err(ActuatorError::InvalidCount(count));
        }
        let patch = serde_json::json!({ "spec": { "replicas": count } });
        let body =
            serde_json::to_vec(&patch).map_err(|e| ActuatorError::Decode(e.to_string()))?;

        self.request(
            Method::PATCH,
            &self.scale_url(),
            Some("application/merge-patch+json"),
            Some(body),
        )
        .await?;

        info!(
            namespace = %self.namespace,
            deployment = %self.deployment,
            replicas = count,
            "deployment scaled"
        );
        Ok(())
    }
}

/// Percent-encode a query parameter value (RFC 3986 unreserved set kept).
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
