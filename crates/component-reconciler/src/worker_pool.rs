// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded pool executing one reconciliation job per admitted request.
//!
//! # Job lifecycle
//!
//! 1. `submit` assigns a job id and a deadline (`admission + worker_timeout`)
//!    and spawns the job task. Under [`QueuePolicy::Reject`] a worker slot is
//!    claimed immediately or the request fails with
//!    [`SubmitError::AtCapacity`]; under [`QueuePolicy::Block`] the job waits
//!    for a slot until its deadline.
//! 2. The job connects to its cluster, switches to `Running` and publishes
//!    that status without waiting for delivery.
//! 3. A heartbeat sender and the action run concurrently on the job's
//!    cancellation token.
//! 4. When the action returns (or panics, or the deadline elapses and the
//!    action is aborted) the heartbeat is stopped and joined, the terminal
//!    status is computed and exactly one terminal callback is delivered.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::action::{Action, ActionContext, ActionError, ActionRegistry};
use crate::archive_cache::ArchiveCache;
use crate::callback::{CallbackConfig, CallbackDispatcher, CallbackPublisher, PublisherTask};
use crate::cluster::ClusterConnector;
use crate::heartbeat::HeartbeatSender;
use crate::progress::ProgressConfig;
use crate::status::{CallbackMessage, Status};
use crate::validation::AdmittedRequest;

/// What `submit` does when every worker is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
    /// Fail immediately with [`SubmitError::AtCapacity`].
    #[default]
    Reject,
    /// Accept and wait for a free worker until the job deadline.
    Block,
}

impl fmt::Display for QueuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueuePolicy::Reject => f.write_str("reject"),
            QueuePolicy::Block => f.write_str("block"),
        }
    }
}

impl FromStr for QueuePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" => Ok(QueuePolicy::Reject),
            "block" => Ok(QueuePolicy::Block),
            other => Err(format!("unknown queue policy '{}'", other)),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum number of jobs running at once.
    pub capacity: usize,
    /// Deadline of a job, measured from admission.
    pub worker_timeout: Duration,
    /// Heartbeat tick while a job is running.
    pub heartbeat_interval: Duration,
    /// Readiness polling handed to actions.
    pub progress: ProgressConfig,
    /// Behaviour when every worker is busy.
    pub queue_policy: QueuePolicy,
    /// Callback retry settings.
    pub callback: CallbackConfig,
    /// Archives kept by the shared archive cache.
    pub archive_cache_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            worker_timeout: Duration::from_secs(600),
            heartbeat_interval: Duration::from_secs(30),
            progress: ProgressConfig::default(),
            queue_policy: QueuePolicy::Reject,
            callback: CallbackConfig::default(),
            archive_cache_capacity: 16,
        }
    }
}

/// Reasons `submit` refuses a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SubmitError {
    /// Every worker is busy and the policy is [`QueuePolicy::Reject`].
    #[error("worker pool at capacity ({capacity} jobs running)")]
    AtCapacity {
        /// Pool capacity.
        capacity: usize,
    },

    /// The pool no longer accepts jobs.
    #[error("worker pool is shutting down")]
    ShuttingDown,

    /// No action is registered for the requested component.
    #[error("no action registered for component '{0}'")]
    UnknownComponent(String),
}

/// Caller's view of a submitted job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    /// Job identifier.
    pub job_id: String,
    /// Correlation id copied from the request.
    pub correlation_id: String,
    status: watch::Receiver<Status>,
}

impl JobHandle {
    /// Current status.
    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    /// Wait until the job reaches a terminal status.
    pub async fn terminal_status(&mut self) -> Status {
        let waited = self.status.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        waited.unwrap_or_else(|_| *self.status.borrow())
    }

    /// Wait until the job task has ended, terminal callback included.
    pub async fn finished(&mut self) -> Status {
        while self.status.changed().await.is_ok() {}
        *self.status.borrow()
    }
}

struct PoolInner {
    config: WorkerPoolConfig,
    registry: ActionRegistry,
    connector: Arc<dyn ClusterConnector>,
    dispatcher: CallbackDispatcher,
    archives: Arc<ArchiveCache>,
    semaphore: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    accepting: AtomicBool,
    active: AtomicUsize,
}

/// Bounded job scheduler.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

/// Everything a job task owns.
struct Job {
    id: String,
    request: AdmittedRequest,
    action: Arc<dyn Action>,
    deadline: Instant,
    cancel: CancellationToken,
    status: watch::Sender<Status>,
}

struct ActiveSlot<'a> {
    active: &'a AtomicUsize,
    _permit: OwnedSemaphorePermit,
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkerPool {
    /// Create a pool.
    pub fn new(
        config: WorkerPoolConfig,
        registry: ActionRegistry,
        connector: Arc<dyn ClusterConnector>,
    ) -> Self {
        let dispatcher = CallbackDispatcher::new(config.callback.clone());
        let archives = Arc::new(ArchiveCache::new(config.archive_cache_capacity));
        let capacity = config.capacity.max(1);

        Self {
            inner: Arc::new(PoolInner {
                semaphore: Arc::new(Semaphore::new(capacity)),
                config: WorkerPoolConfig {
                    capacity,
                    ..config
                },
                registry,
                connector,
                dispatcher,
                archives,
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                accepting: AtomicBool::new(true),
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Maximum number of concurrently running jobs.
    pub fn capacity(&self) -> usize {
        self.inner.config.capacity
    }

    /// Jobs currently holding a worker.
    pub fn active_jobs(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Whether new jobs are accepted.
    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    /// Pool configuration.
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.inner.config
    }

    /// Archive cache shared by all jobs.
    pub fn archives(&self) -> Arc<ArchiveCache> {
        self.inner.archives.clone()
    }

    /// Admit a job.
    pub fn submit(&self, request: AdmittedRequest) -> Result<JobHandle, SubmitError> {
        let inner = &self.inner;
        if !self.is_accepting() {
            return Err(SubmitError::ShuttingDown);
        }

        let action = inner
            .registry
            .get(&request.task.component)
            .ok_or_else(|| SubmitError::UnknownComponent(request.task.component.clone()))?;

        let permit = match inner.config.queue_policy {
            QueuePolicy::Reject => match inner.semaphore.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(TryAcquireError::NoPermits) => {
                    return Err(SubmitError::AtCapacity {
                        capacity: inner.config.capacity,
                    });
                }
                Err(TryAcquireError::Closed) => return Err(SubmitError::ShuttingDown),
            },
            QueuePolicy::Block => None,
        };

        let job_id = Uuid::new_v4().to_string();
        let correlation_id = request.task.correlation_id.clone();
        let (status_tx, status_rx) = watch::channel(Status::NotStarted);

        let span = info_span!(
            "job",
            job_id = %job_id,
            correlation_id = %correlation_id,
            component = %request.task.component,
            operation = %request.task.operation,
        );

        let job = Job {
            id: job_id.clone(),
            request,
            action,
            deadline: Instant::now() + inner.config.worker_timeout,
            cancel: inner.shutdown.child_token(),
            status: status_tx,
        };

        info!(parent: &span, "Job admitted");
        inner
            .tracker
            .spawn(run_job(inner.clone(), job, permit).instrument(span));

        Ok(JobHandle {
            job_id,
            correlation_id,
            status: status_rx,
        })
    }

    /// Stop accepting jobs, wait up to `grace` for in-flight jobs, then cancel
    /// the rest and wait for their terminal callbacks.
    pub async fn shutdown(&self, grace: Duration) {
        let inner = &self.inner;
        inner.accepting.store(false, Ordering::SeqCst);
        inner.tracker.close();

        info!(
            in_flight = inner.tracker.len(),
            grace_secs = grace.as_secs(),
            "Worker pool shutting down"
        );

        if tokio::time::timeout(grace, inner.tracker.wait()).await.is_err() {
            warn!(
                remaining = inner.tracker.len(),
                "Grace period elapsed, cancelling remaining jobs"
            );
            inner.shutdown.cancel();
            inner.tracker.wait().await;
        }

        inner.semaphore.close();
        info!("Worker pool stopped");
    }
}

async fn run_job(inner: Arc<PoolInner>, job: Job, permit: Option<OwnedSemaphorePermit>) {
    let publisher = CallbackPublisher::spawn(
        inner.dispatcher.clone(),
        job.request.sink.clone(),
        &job.id,
    );

    let permit = match permit {
        Some(permit) => permit,
        None => match wait_for_worker(&inner, &job).await {
            Ok(permit) => permit,
            Err(reason) => {
                finish(&job, publisher, Status::Error, Some(reason)).await;
                return;
            }
        },
    };
    inner.active.fetch_add(1, Ordering::SeqCst);
    let slot = ActiveSlot {
        active: &inner.active,
        _permit: permit,
    };

    let connect = inner.connector.connect(&job.request.kubeconfig);
    let cluster = match tokio::time::timeout_at(job.deadline, connect).await {
        Ok(Ok(cluster)) => cluster,
        Ok(Err(e)) => {
            drop(slot);
            let reason = format!("failed to connect to cluster: {}", e);
            finish(&job, publisher, Status::Error, Some(reason)).await;
            return;
        }
        Err(_) => {
            drop(slot);
            let reason = "timed out connecting to cluster".to_string();
            finish(&job, publisher, Status::Error, Some(reason)).await;
            return;
        }
    };

    advance(&job.status, Status::Running);
    publisher.publish(CallbackMessage::status(Status::Running));
    info!("Job running");

    let heartbeat = HeartbeatSender::new(
        inner.config.heartbeat_interval,
        job.status.subscribe(),
        publisher.publisher(),
    )
    .spawn(job.cancel.child_token());

    let ctx = ActionContext {
        job_id: job.id.clone(),
        task: job.request.task.clone(),
        cancel: job.cancel.clone(),
        cluster,
        progress: inner.config.progress.clone(),
        archives: inner.archives.clone(),
        deadline: job.deadline,
    };
    let action = job.action.clone();
    let mut action_task =
        tokio::spawn(async move { action.run(&ctx).await }.instrument(Span::current()));

    let result = tokio::select! {
        joined = &mut action_task => match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                error!("Action panicked");
                Err(ActionError::Error("action panicked".to_string()))
            }
            Err(_) => Err(ActionError::Cancelled),
        },
        _ = tokio::time::sleep_until(job.deadline) => {
            warn!(
                timeout_secs = inner.config.worker_timeout.as_secs(),
                "Job deadline elapsed, aborting action"
            );
            job.cancel.cancel();
            action_task.abort();
            let _ = action_task.await;
            Err(ActionError::Timeout)
        }
    };

    let heartbeats = heartbeat.stop().await;
    drop(slot);
    debug!(heartbeats, "Heartbeat joined");

    let (status, reason) = match result {
        Ok(()) => (Status::Success, None),
        Err(ActionError::Timeout) => (
            Status::Error,
            Some(format!(
                "reconciliation timed out after {}s",
                inner.config.worker_timeout.as_secs()
            )),
        ),
        Err(e) => (e.status(), Some(e.to_string())),
    };
    finish(&job, publisher, status, reason).await;
}

async fn wait_for_worker(inner: &PoolInner, job: &Job) -> Result<OwnedSemaphorePermit, String> {
    tokio::select! {
        biased;

        _ = job.cancel.cancelled() => Err("worker pool shut down before the job started".to_string()),

        _ = tokio::time::sleep_until(job.deadline) => Err(format!(
            "timed out after {}s waiting for a free worker",
            inner.config.worker_timeout.as_secs()
        )),

        permit = inner.semaphore.clone().acquire_owned() => {
            permit.map_err(|_| "worker pool shut down before the job started".to_string())
        }
    }
}

/// Move the job to `next` if the lifecycle allows it.
fn advance(status: &watch::Sender<Status>, next: Status) -> bool {
    status.send_if_modified(|current| {
        if current.can_transition_to(next) {
            *current = next;
            true
        } else {
            warn!(from = %current, to = %next, "Ignoring illegal status transition");
            false
        }
    })
}

/// Publish the terminal status and wait for its delivery.
async fn finish(job: &Job, publisher: PublisherTask, status: Status, reason: Option<String>) {
    advance(&job.status, status);

    let message = CallbackMessage {
        status,
        error: reason.clone(),
    };
    match &reason {
        None => info!(%status, "Job finished"),
        Some(reason) => warn!(%status, error = %reason, "Job finished"),
    }

    match publisher.finish(message).await {
        None | Some(Ok(())) => {}
        Some(Err(e)) => error!(%status, error = %e, "Terminal callback not delivered"),
    }
}
