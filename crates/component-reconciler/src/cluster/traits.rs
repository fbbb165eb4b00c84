// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster client trait definitions.
//!
//! Defines the narrow view of a Kubernetes cluster the reconciler needs:
//! look up the readiness of a named object, delete an object, and report the
//! API host.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from cluster operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClusterError {
    /// The kubeconfig could not be parsed or used.
    #[error("Invalid kubeconfig: {0}")]
    Kubeconfig(String),

    /// The resource kind is not supported.
    #[error("Unsupported resource kind: {0}")]
    UnsupportedKind(String),

    /// The API server rejected or failed a request.
    #[error("Kubernetes API error: {0}")]
    Api(String),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Kubernetes resource kinds that can be watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// `v1/Pod`
    Pod,
    /// `apps/v1/Deployment`
    Deployment,
    /// `apps/v1/StatefulSet`
    StatefulSet,
    /// `apps/v1/DaemonSet`
    DaemonSet,
    /// `batch/v1/Job`
    Job,
}

impl ResourceKind {
    /// Lowercase kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Pod => "pod",
            ResourceKind::Deployment => "deployment",
            ResourceKind::StatefulSet => "statefulset",
            ResourceKind::DaemonSet => "daemonset",
            ResourceKind::Job => "job",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pod" | "pods" => Ok(ResourceKind::Pod),
            "deployment" | "deployments" => Ok(ResourceKind::Deployment),
            "statefulset" | "statefulsets" => Ok(ResourceKind::StatefulSet),
            "daemonset" | "daemonsets" => Ok(ResourceKind::DaemonSet),
            "job" | "jobs" => Ok(ResourceKind::Job),
            _ => Err(ClusterError::UnsupportedKind(s.to_string())),
        }
    }
}

/// Observed state of a single object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// The object exists and satisfies its readiness rule.
    Ready,
    /// The object exists but is not ready yet.
    NotReady,
    /// The object does not exist.
    Absent,
}

/// A Kubernetes cluster as seen by one job.
///
/// Clients are created per job from the request's kubeconfig and are never
/// shared between jobs.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Current state of the named object.
    async fn resource_state(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<ResourceState>;

    /// Delete the named object. Returns `false` when it did not exist.
    async fn delete_resource(&self, kind: ResourceKind, name: &str, namespace: &str)
    -> Result<bool>;

    /// URL of the cluster's API server.
    fn host(&self) -> String;
}

/// Creates cluster clients from kubeconfig content.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Build a client for the cluster described by `kubeconfig`.
    async fn connect(&self, kubeconfig: &str) -> Result<Arc<dyn ClusterClient>>;
}

/// Derive the cluster DNS domain from an API server URL by dropping a leading
/// `api.` label: `https://api.c1.example.org:443` becomes `c1.example.org`.
pub fn domain_from_host(host: &str) -> Option<String> {
    let url = Url::parse(host).ok()?;
    let hostname = url.host_str()?;
    Some(hostname.strip_prefix("api.").unwrap_or(hostname).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Pod".parse::<ResourceKind>().unwrap(), ResourceKind::Pod);
        assert_eq!(
            "deployments".parse::<ResourceKind>().unwrap(),
            ResourceKind::Deployment
        );
        assert_eq!(
            "StatefulSet".parse::<ResourceKind>().unwrap(),
            ResourceKind::StatefulSet
        );
        assert!(matches!(
            "configmap".parse::<ResourceKind>(),
            Err(ClusterError::UnsupportedKind(_))
        ));
    }

    #[test]
    fn test_domain_from_host() {
        assert_eq!(
            domain_from_host("https://api.c1.example.org:443").as_deref(),
            Some("c1.example.org")
        );
        assert_eq!(
            domain_from_host("https://kube.example.org").as_deref(),
            Some("kube.example.org")
        );
        assert_eq!(domain_from_host("not a url"), None);
    }
}
