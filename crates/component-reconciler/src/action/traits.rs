// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Action trait definitions.
//!
//! An [`Action`] carries out the install, upgrade or delete of one component
//! against the job's cluster. The worker pool runs it once per admitted job
//! and maps its outcome to the terminal status.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::archive_cache::{ArchiveCache, ArchiveError};
use crate::cluster::{ClusterClient, ClusterError, domain_from_host};
use crate::model::Task;
use crate::progress::{ProgressConfig, ProgressError, ProgressTracker};
use crate::status::Status;

/// Errors returned by actions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ActionError {
    /// Non-retryable domain failure. Reported as [`Status::Failed`].
    #[error("{0}")]
    Failed(String),

    /// Generic action error.
    #[error("{0}")]
    Error(String),

    /// Cluster access failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Readiness was not reached.
    #[error(transparent)]
    Progress(#[from] ProgressError),

    /// Component archive could not be fetched.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The job was cancelled.
    #[error("action cancelled")]
    Cancelled,

    /// The job deadline elapsed.
    #[error("action timed out")]
    Timeout,
}

impl ActionError {
    /// Terminal status this error maps to.
    pub fn status(&self) -> Status {
        match self {
            ActionError::Failed(_) => Status::Failed,
            _ => Status::Error,
        }
    }
}

/// Everything an action may use while running one job.
#[derive(Clone)]
pub struct ActionContext {
    /// Job identifier.
    pub job_id: String,
    /// Requested change.
    pub task: Task,
    /// Cancelled when the job deadline elapses or the pool shuts down.
    pub cancel: CancellationToken,
    /// Client for the job's cluster.
    pub cluster: Arc<dyn ClusterClient>,
    /// Polling settings for readiness watches.
    pub progress: ProgressConfig,
    /// Archive cache shared by the pool.
    pub archives: Arc<ArchiveCache>,
    /// When the job times out.
    pub deadline: Instant,
}

impl ActionContext {
    /// DNS domain of the job's cluster, derived from the API host.
    pub fn cluster_domain(&self) -> Option<String> {
        domain_from_host(&self.cluster.host())
    }

    /// A fresh tracker bound to this job's cluster.
    pub fn progress_tracker(&self) -> ProgressTracker {
        ProgressTracker::new(self.cluster.clone(), self.progress.clone())
    }
}

/// Component logic.
#[async_trait]
pub trait Action: Send + Sync {
    /// Carry out the task in `ctx`.
    ///
    /// Implementations should observe `ctx.cancel`; the worker aborts actions
    /// that keep running after the deadline.
    async fn run(&self, ctx: &ActionContext) -> Result<(), ActionError>;
}

/// Maps component names to their action.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `action` for `component`, replacing any previous one.
    pub fn register(&mut self, component: impl Into<String>, action: Arc<dyn Action>) {
        self.actions.insert(component.into(), action);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, component: impl Into<String>, action: Arc<dyn Action>) -> Self {
        self.register(component, action);
        self
    }

    /// Action for `component`.
    pub fn get(&self, component: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(component).cloned()
    }

    /// Registered component names, sorted.
    pub fn components(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::MockAction;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ActionError::Failed("x".into()).status(), Status::Failed);
        assert_eq!(ActionError::Error("x".into()).status(), Status::Error);
        assert_eq!(ActionError::Timeout.status(), Status::Error);
        assert_eq!(
            ActionError::Progress(ProgressError::Cancelled).status(),
            Status::Error
        );
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ActionRegistry::new()
            .with("istio", Arc::new(MockAction::new()))
            .with("cluster-essentials", Arc::new(MockAction::new()));

        assert!(registry.get("istio").is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.components(), vec!["cluster-essentials", "istio"]);
    }
}
