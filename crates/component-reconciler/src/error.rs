// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the component reconciler.

use thiserror::Error;

/// Reconciler errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The request failed validation.
    #[error("Invalid request: {0}")]
    Validation(#[from] crate::validation::ValidationError),

    /// The worker pool refused the job.
    #[error("Submit error: {0}")]
    Submit(#[from] crate::worker_pool::SubmitError),

    /// Cluster access failed.
    #[error("Cluster error: {0}")]
    Cluster(#[from] crate::cluster::ClusterError),

    /// Callback delivery failed.
    #[error("Callback error: {0}")]
    Callback(#[from] crate::callback::CallbackError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type using the reconciler [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
