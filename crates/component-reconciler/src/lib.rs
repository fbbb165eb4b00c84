// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Component Reconciler - Kubernetes component reconciliation service
//!
//! This crate accepts reconciliation requests for one component, gates them
//! on the readiness of the components it depends on, runs the component's
//! action against the target cluster in a bounded worker pool, and reports
//! progress and the final outcome to the caller through callbacks.
//!
//! # Architecture
//!
//! ```text
//!   POST /v1/run
//!        │
//!        ▼
//! ┌──────────────┐  400   ┌──────────────┐  428
//! │  validation  │───────►│ dependencies │───────► missing components
//! └──────┬───────┘        └──────┬───────┘
//!        │                       │ satisfied
//!        ▼                       ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                      worker_pool                         │
//! │  ┌────────┐   ┌───────────┐   ┌──────────┐               │
//! │  │ action │──►│ progress  │──►│ cluster  │  (kube-rs)    │
//! │  └────────┘   └───────────┘   └──────────┘               │
//! │  ┌───────────┐                                           │
//! │  │ heartbeat │─┐                                         │
//! │  └───────────┘ ▼                                         │
//! │        ┌──────────────────┐                              │
//! │        │ callback         │──► POST <callbackURL>        │
//! │        │ (per-job queue)  │    {status, error}           │
//! │        └──────────────────┘                              │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # HTTP API
//!
//! | Route | Response |
//! |-------|----------|
//! | `POST /v1/run` | `200 {jobId, correlationID, status}` |
//! | | `400 {error}` malformed or invalid request |
//! | | `428 {dependencies: {required, missing}}` |
//! | | `429 {error}` pool at capacity (`reject` policy) |
//! | | `503 {error}` shutting down |
//! | `GET /health` | `200 {healthy, version, uptimeMs, activeJobs, capacity}` |
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `RECONCILER_COMPONENT` | Yes | - | Component served |
//! | `RECONCILER_PORT` | No | `8080` | HTTP port |
//! | `RECONCILER_DEPENDENCIES` | No | - | Comma-separated dependency list |
//! | `RECONCILER_WORKER_POOL_SIZE` | No | `50` | Concurrent jobs |
//! | `RECONCILER_WORKER_TIMEOUT_SECS` | No | `600` | Job deadline |
//! | `RECONCILER_QUEUE_POLICY` | No | `reject` | `reject` or `block` |
//! | `RECONCILER_HEARTBEAT_INTERVAL_SECS` | No | `30` | Heartbeat interval |
//! | `RECONCILER_PROGRESS_INTERVAL_SECS` | No | `1` | Readiness poll interval |
//! | `RECONCILER_PROGRESS_TIMEOUT_SECS` | No | `300` | Readiness wait bound |
//! | `RECONCILER_CALLBACK_MAX_RETRIES` | No | `5` | Callback retries |
//! | `RECONCILER_CALLBACK_RETRY_DELAY_SECS` | No | `30` | Delay between retries |
//! | `RECONCILER_CALLBACK_TIMEOUT_SECS` | No | `10` | Callback request timeout |
//! | `RECONCILER_SHUTDOWN_GRACE_SECS` | No | `30` | Drain time on shutdown |
//! | `RECONCILER_ARCHIVE_CACHE_CAPACITY` | No | `16` | Cached archives |
//! | `RECONCILER_WATCH_RESOURCES` | No | - | `kind/name` list to wait for |

#![deny(missing_docs)]

/// Pluggable component logic.
pub mod action;

/// Cache of downloaded component archives.
pub mod archive_cache;

/// Callback delivery with bounded retry.
pub mod callback;

/// Per-job Kubernetes cluster access.
pub mod cluster;

/// Server configuration loaded from environment variables.
pub mod config;

/// Dependency gating.
pub mod dependencies;

/// Error types for reconciler operations.
pub mod error;

/// Reconciler request handlers.
pub mod handlers;

/// Periodic heartbeats for running jobs.
pub mod heartbeat;

/// Request and task types.
pub mod model;

/// Resource readiness tracking.
pub mod progress;

/// Embeddable runtime.
pub mod runtime;

/// HTTP server.
pub mod server;

/// Job lifecycle states.
pub mod status;

/// Request validation.
pub mod validation;

/// Bounded job execution.
pub mod worker_pool;

pub use config::Config;
pub use error::Error;
