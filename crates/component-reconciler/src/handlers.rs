// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reconciler request handlers.
//!
//! Transport-agnostic logic behind the HTTP routes: validate, check the
//! component, gate on dependencies and submit to the worker pool.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dependencies::{Resolution, resolve};
use crate::model::ReconciliationRequest;
use crate::status::Status;
use crate::validation::validate;
use crate::worker_pool::{JobHandle, SubmitError, WorkerPool};

/// Shared state for reconciler handlers.
pub struct ReconcilerState {
    /// Component served by this reconciler.
    pub component: String,
    /// Components that must be ready first, in configuration order.
    pub dependencies: Vec<String>,
    /// Job executor.
    pub pool: WorkerPool,
    /// When the server started (for uptime calculation).
    pub start_time: Instant,
    /// Server version string.
    pub version: String,
}

impl ReconcilerState {
    /// Create handler state.
    pub fn new(component: impl Into<String>, dependencies: Vec<String>, pool: WorkerPool) -> Self {
        Self {
            component: component.into(),
            dependencies,
            pool,
            start_time: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Get the server uptime in milliseconds.
    pub fn uptime_ms(&self) -> i64 {
        self.start_time.elapsed().as_millis() as i64
    }
}

// ============================================================================
// Run
// ============================================================================

/// Result of a run request.
#[derive(Debug)]
pub enum RunOutcome {
    /// The job was admitted.
    Accepted(JobHandle),
    /// Required components are not ready.
    MissingDependencies(Resolution),
    /// The request is malformed or invalid.
    BadRequest(String),
    /// Every worker is busy.
    AtCapacity(String),
    /// The reconciler is shutting down.
    Unavailable(String),
}

/// Acknowledgment returned for an admitted job.
#[derive(Debug, Clone, Serialize)]
pub struct RunAcceptedResponse {
    /// Job identifier.
    #[serde(rename = "jobId")]
    pub job_id: String,
    /// Correlation id from the request.
    #[serde(rename = "correlationID")]
    pub correlation_id: String,
    /// Status at admission time.
    pub status: Status,
}

impl From<&JobHandle> for RunAcceptedResponse {
    fn from(handle: &JobHandle) -> Self {
        Self {
            job_id: handle.job_id.clone(),
            correlation_id: handle.correlation_id.clone(),
            status: handle.status(),
        }
    }
}

/// Payload of a dependency rejection.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyResponse {
    /// Required and missing components.
    pub dependencies: Resolution,
}

/// Generic error payload.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error description.
    pub error: String,
}

/// Handle a run request.
pub fn handle_run(state: &ReconcilerState, request: ReconciliationRequest) -> RunOutcome {
    let admitted = match validate(request) {
        Ok(admitted) => admitted,
        Err(e) => {
            debug!(error = %e, "Rejecting invalid request");
            return RunOutcome::BadRequest(e.to_string());
        }
    };

    if admitted.task.component != state.component {
        debug!(
            component = %admitted.task.component,
            served = %state.component,
            "Rejecting request for another component"
        );
        return RunOutcome::BadRequest(format!(
            "this reconciler serves component '{}', not '{}'",
            state.component, admitted.task.component
        ));
    }

    let resolution = resolve(&state.dependencies, &admitted.components_ready);
    if !resolution.is_satisfied() {
        info!(
            component = %admitted.task.component,
            correlation_id = %admitted.task.correlation_id,
            missing = ?resolution.missing,
            "Dependencies not ready"
        );
        return RunOutcome::MissingDependencies(resolution);
    }

    match state.pool.submit(admitted) {
        Ok(handle) => RunOutcome::Accepted(handle),
        Err(e @ SubmitError::AtCapacity { .. }) => {
            warn!(error = %e, "Rejecting request");
            RunOutcome::AtCapacity(e.to_string())
        }
        Err(e @ SubmitError::ShuttingDown) => RunOutcome::Unavailable(e.to_string()),
        Err(e) => RunOutcome::BadRequest(e.to_string()),
    }
}

// ============================================================================
// Health Check
// ============================================================================

/// Handle health check request.
pub fn handle_health_check(state: &ReconcilerState) -> HealthCheckResponse {
    HealthCheckResponse {
        healthy: state.pool.is_accepting(),
        version: state.version.clone(),
        uptime_ms: state.uptime_ms(),
        active_jobs: state.pool.active_jobs(),
        capacity: state.pool.capacity(),
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResponse {
    /// Whether the reconciler accepts jobs.
    pub healthy: bool,
    /// Server version.
    pub version: String,
    /// Server uptime in milliseconds.
    pub uptime_ms: i64,
    /// Jobs currently running.
    pub active_jobs: usize,
    /// Worker pool capacity.
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionRegistry, MockAction};
    use crate::cluster::MockConnector;
    use crate::worker_pool::WorkerPoolConfig;
    use std::sync::Arc;

    fn state(dependencies: &[&str]) -> ReconcilerState {
        let registry = ActionRegistry::new().with("component-1", Arc::new(MockAction::new()));
        let pool = WorkerPool::new(
            WorkerPoolConfig::default(),
            registry,
            Arc::new(MockConnector::default()),
        );
        ReconcilerState::new(
            "component-1",
            dependencies.iter().map(|d| d.to_string()).collect(),
            pool,
        )
    }

    fn request(ready: &[&str]) -> ReconciliationRequest {
        ReconciliationRequest {
            components_ready: ready.iter().map(|d| d.to_string()).collect(),
            component: "component-1".into(),
            namespace: "default".into(),
            version: "1.0.0".into(),
            kubeconfig: "apiVersion: v1".into(),
            correlation_id: "corr-1".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_dependencies() {
        let state = state(&["abc", "xyz"]);
        match handle_run(&state, request(&["abc", "def"])) {
            RunOutcome::MissingDependencies(res) => {
                assert_eq!(res.required, vec!["abc", "xyz"]);
                assert_eq!(res.missing, vec!["xyz"]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_validation_runs_before_dependency_check() {
        let state = state(&["abc"]);
        let mut req = request(&[]);
        req.version.clear();
        assert!(matches!(
            handle_run(&state, req),
            RunOutcome::BadRequest(msg) if msg == "version is required"
        ));
    }

    #[tokio::test]
    async fn test_accepted_and_unknown_component() {
        let state = state(&[]);
        match handle_run(&state, request(&[])) {
            RunOutcome::Accepted(handle) => {
                let ack = RunAcceptedResponse::from(&handle);
                assert_eq!(ack.correlation_id, "corr-1");
                assert!(!ack.job_id.is_empty());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let mut req = request(&[]);
        req.component = "other".into();
        assert!(matches!(
            handle_run(&state, req),
            RunOutcome::BadRequest(msg) if msg.contains("serves component 'component-1', not 'other'")
        ));
    }

    #[tokio::test]
    async fn test_foreign_component_rejected_before_dependency_check() {
        let state = state(&["abc"]);
        let mut req = request(&[]);
        req.component = "other".into();
        assert!(matches!(handle_run(&state, req), RunOutcome::BadRequest(_)));
        assert_eq!(state.pool.active_jobs(), 0);
    }

    #[tokio::test]
    async fn test_health_check() {
        let state = state(&[]);
        let health = handle_health_check(&state);
        assert!(health.healthy);
        assert_eq!(health.capacity, 50);
        assert_eq!(health.active_jobs, 0);
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }
}
