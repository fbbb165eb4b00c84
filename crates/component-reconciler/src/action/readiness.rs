// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Action that waits for a fixed set of resources.
//!
//! On `reconcile` every configured resource must become ready in the task
//! namespace. On `delete` every resource is deleted and must disappear.

use async_trait::async_trait;
use tracing::{debug, info};

use super::traits::*;
use crate::cluster::{ClusterError, ResourceKind};
use crate::model::OperationType;
use crate::progress::{DesiredState, ProgressError};

/// Waits for `(kind, name)` resources in the task namespace.
#[derive(Debug, Clone, Default)]
pub struct ReadinessAction {
    resources: Vec<(ResourceKind, String)>,
}

impl ReadinessAction {
    /// Action over the given resources.
    pub fn new(resources: Vec<(ResourceKind, String)>) -> Self {
        Self { resources }
    }

    /// Parse a comma-separated `kind/name` list, e.g.
    /// `deployment/istiod,daemonset/istio-cni`.
    pub fn parse(list: &str) -> Result<Self, ClusterError> {
        let mut resources = Vec::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (kind, name) = item.split_once('/').ok_or_else(|| {
                ClusterError::Other(format!("expected kind/name, got '{}'", item))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(ClusterError::Other(format!("missing name in '{}'", item)));
            }
            resources.push((kind.trim().parse()?, name.to_string()));
        }
        Ok(Self { resources })
    }

    /// Configured resources.
    pub fn resources(&self) -> &[(ResourceKind, String)] {
        &self.resources
    }
}

#[async_trait]
impl Action for ReadinessAction {
    async fn run(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        let namespace = &ctx.task.namespace;
        let mut tracker = ctx.progress_tracker();
        for (kind, name) in &self.resources {
            tracker.add_resource(*kind, namespace.clone(), name.clone());
        }

        let desired = match ctx.task.operation {
            OperationType::Reconcile => DesiredState::Ready,
            OperationType::Delete => {
                for (kind, name) in &self.resources {
                    let existed = ctx.cluster.delete_resource(*kind, name, namespace).await?;
                    debug!(%kind, name, existed, "Delete requested");
                }
                DesiredState::Terminated
            }
        };

        match tracker.watch(&ctx.cancel, desired).await {
            Ok(()) => {
                info!(
                    component = %ctx.task.component,
                    operation = %ctx.task.operation,
                    resources = self.resources.len(),
                    "Component resources settled"
                );
                Ok(())
            }
            Err(ProgressError::Cancelled) => Err(ActionError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resource_list() {
        let action = ReadinessAction::parse(" deployment/istiod , pods/web-0,").unwrap();
        assert_eq!(
            action.resources(),
            &[
                (ResourceKind::Deployment, "istiod".to_string()),
                (ResourceKind::Pod, "web-0".to_string()),
            ]
        );
        assert!(ReadinessAction::parse("").unwrap().resources().is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_entries() {
        assert!(ReadinessAction::parse("deployment").is_err());
        assert!(ReadinessAction::parse("deployment/").is_err());
        assert!(matches!(
            ReadinessAction::parse("configmap/x"),
            Err(ClusterError::UnsupportedKind(_))
        ));
    }
}
