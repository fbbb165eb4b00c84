// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Poll loop over watched resources.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cluster::{ClusterClient, ClusterError, ResourceKind, ResourceState};

/// Polling configuration.
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Pause between two polls.
    pub interval: Duration,
    /// Upper bound of one watch.
    pub timeout: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

/// What the watched resources must reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    /// Every object exists and is ready.
    Ready,
    /// Every object is gone.
    Terminated,
}

impl DesiredState {
    fn satisfied_by(&self, state: ResourceState) -> bool {
        match self {
            DesiredState::Ready => state == ResourceState::Ready,
            DesiredState::Terminated => state == ResourceState::Absent,
        }
    }
}

/// Lifecycle of a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Not watched yet, or still polling.
    Waiting,
    /// All resources reached the desired state.
    Ready,
    /// The timeout elapsed first.
    TimedOut,
    /// The job was cancelled first.
    Cancelled,
}

/// Errors from a watch.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    /// Not every resource reached the desired state in time.
    #[error("timed out after {timeout:?} waiting for {pending:?}")]
    Timeout {
        /// Configured bound.
        timeout: Duration,
        /// Resources still pending when the wait ended.
        pending: Vec<String>,
    },

    /// The cancellation token fired.
    #[error("watch cancelled")]
    Cancelled,

    /// `watch` was called on a tracker that has already been watched.
    #[error("tracker has already been watched")]
    AlreadyWatched,

    /// The cluster cannot be queried at all.
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// One object under watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedResource {
    /// Object kind.
    pub kind: ResourceKind,
    /// Namespace of the object.
    pub namespace: String,
    /// Object name.
    pub name: String,
}

impl fmt::Display for WatchedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Watches a set of resources until they reach a desired state.
pub struct ProgressTracker {
    client: Arc<dyn ClusterClient>,
    config: ProgressConfig,
    resources: Vec<WatchedResource>,
    state: TrackerState,
    watched: bool,
}

impl ProgressTracker {
    /// Create a tracker with no resources.
    pub fn new(client: Arc<dyn ClusterClient>, config: ProgressConfig) -> Self {
        Self {
            client,
            config,
            resources: Vec::new(),
            state: TrackerState::Waiting,
            watched: false,
        }
    }

    /// Add an object to watch.
    pub fn add_resource(
        &mut self,
        kind: ResourceKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) {
        self.resources.push(WatchedResource {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        });
    }

    /// Objects under watch.
    pub fn resources(&self) -> &[WatchedResource] {
        &self.resources
    }

    /// Current state.
    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Poll until every resource satisfies `desired`.
    ///
    /// A tracker can be watched once. Transient API errors count as "not yet"
    /// and are retried on the next poll; kubeconfig and kind errors end the
    /// watch immediately.
    pub async fn watch(
        &mut self,
        cancel: &CancellationToken,
        desired: DesiredState,
    ) -> Result<(), ProgressError> {
        if self.watched {
            return Err(ProgressError::AlreadyWatched);
        }
        self.watched = true;

        let deadline = Instant::now() + self.config.timeout;
        debug!(
            resources = self.resources.len(),
            ?desired,
            timeout_secs = self.config.timeout.as_secs(),
            "Watching resources"
        );

        loop {
            let pending = self.pending(desired).await?;
            if pending.is_empty() {
                self.state = TrackerState::Ready;
                info!(
                    resources = self.resources.len(),
                    ?desired,
                    "Resources reached desired state"
                );
                return Ok(());
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.state = TrackerState::Cancelled;
                    return Err(ProgressError::Cancelled);
                }

                _ = tokio::time::sleep_until(deadline) => {
                    self.state = TrackerState::TimedOut;
                    warn!(?pending, "Timed out waiting for resources");
                    return Err(ProgressError::Timeout {
                        timeout: self.config.timeout,
                        pending,
                    });
                }

                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
    }

    async fn pending(&self, desired: DesiredState) -> Result<Vec<String>, ProgressError> {
        let mut pending = Vec::new();
        for resource in &self.resources {
            match self
                .client
                .resource_state(resource.kind, &resource.namespace, &resource.name)
                .await
            {
                Ok(state) if desired.satisfied_by(state) => {}
                Ok(_) => pending.push(resource.to_string()),
                Err(ClusterError::Api(e)) => {
                    warn!(resource = %resource, error = %e, "Resource lookup failed, retrying");
                    pending.push(resource.to_string());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(pending)
    }
}
