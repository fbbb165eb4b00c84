// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! kube-rs backed cluster client.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::traits::*;

/// Cluster client talking to a real API server.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    host: String,
}

impl KubeClusterClient {
    /// Build a client from kubeconfig YAML.
    pub async fn from_kubeconfig(kubeconfig: &str) -> Result<Self> {
        let kubeconfig = Kubeconfig::from_yaml(kubeconfig)
            .map_err(|e| ClusterError::Kubeconfig(e.to_string()))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| ClusterError::Kubeconfig(e.to_string()))?;
        let host = config.cluster_url.to_string();
        let client =
            Client::try_from(config).map_err(|e| ClusterError::Kubeconfig(e.to_string()))?;

        Ok(Self { client, host })
    }

    async fn state_of<K>(
        &self,
        namespace: &str,
        name: &str,
        is_ready: fn(&K) -> bool,
    ) -> Result<ResourceState>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api.get_opt(name).await {
            Ok(Some(obj)) if is_ready(&obj) => Ok(ResourceState::Ready),
            Ok(Some(_)) => Ok(ResourceState::NotReady),
            Ok(None) => Ok(ResourceState::Absent),
            Err(e) => Err(ClusterError::Api(e.to_string())),
        }
    }

    async fn delete<K>(&self, namespace: &str, name: &str) -> Result<bool>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(ClusterError::Api(e.to_string())),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn resource_state(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<ResourceState> {
        match kind {
            ResourceKind::Pod => self.state_of::<Pod>(namespace, name, pod_ready).await,
            ResourceKind::Deployment => {
                self.state_of::<Deployment>(namespace, name, deployment_ready)
                    .await
            }
            ResourceKind::StatefulSet => {
                self.state_of::<StatefulSet>(namespace, name, statefulset_ready)
                    .await
            }
            ResourceKind::DaemonSet => {
                self.state_of::<DaemonSet>(namespace, name, daemonset_ready)
                    .await
            }
            ResourceKind::Job => self.state_of::<Job>(namespace, name, job_ready).await,
        }
    }

    async fn delete_resource(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: &str,
    ) -> Result<bool> {
        debug!(%kind, namespace, name, "Deleting resource");
        match kind {
            ResourceKind::Pod => self.delete::<Pod>(namespace, name).await,
            ResourceKind::Deployment => self.delete::<Deployment>(namespace, name).await,
            ResourceKind::StatefulSet => self.delete::<StatefulSet>(namespace, name).await,
            ResourceKind::DaemonSet => self.delete::<DaemonSet>(namespace, name).await,
            ResourceKind::Job => self.delete::<Job>(namespace, name).await,
        }
    }

    fn host(&self) -> String {
        self.host.clone()
    }
}

/// Connector producing [`KubeClusterClient`]s.
#[derive(Debug, Clone, Default)]
pub struct KubeConnector;

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, kubeconfig: &str) -> Result<Arc<dyn ClusterClient>> {
        Ok(Arc::new(KubeClusterClient::from_kubeconfig(kubeconfig).await?))
    }
}

/// Pod is running and its `Ready` condition is true.
pub fn pod_ready(pod: &Pod) -> bool {
    pod.status.as_ref().is_some_and(|status| {
        status.phase.as_deref() == Some("Running")
            && status.conditions.as_ref().is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == "Ready" && c.status == "True")
            })
    })
}

/// Latest generation observed and all desired replicas updated and available.
pub fn deployment_ready(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let generation = deployment.metadata.generation.unwrap_or(0);
    deployment.status.as_ref().is_some_and(|status| {
        status.observed_generation.unwrap_or(0) >= generation
            && status.updated_replicas.unwrap_or(0) >= desired
            && status.available_replicas.unwrap_or(0) >= desired
    })
}

/// All desired replicas ready and on the current revision.
pub fn statefulset_ready(sts: &StatefulSet) -> bool {
    let desired = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let generation = sts.metadata.generation.unwrap_or(0);
    sts.status.as_ref().is_some_and(|status| {
        status.observed_generation.unwrap_or(0) >= generation
            && status.ready_replicas.unwrap_or(0) >= desired
            && status.updated_replicas.unwrap_or(0) >= desired
    })
}

/// Every scheduled daemon pod is ready and updated.
pub fn daemonset_ready(ds: &DaemonSet) -> bool {
    ds.status.as_ref().is_some_and(|status| {
        status.number_ready >= status.desired_number_scheduled
            && status.updated_number_scheduled.unwrap_or(0) >= status.desired_number_scheduled
    })
}

/// The job reached its completion count.
pub fn job_ready(job: &Job) -> bool {
    let completions = job.spec.as_ref().and_then(|s| s.completions).unwrap_or(1);
    job.status
        .as_ref()
        .and_then(|s| s.succeeded)
        .is_some_and(|succeeded| succeeded >= completions)
}
