// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the component reconciler.

use std::net::SocketAddr;
use std::time::Duration;

use crate::callback::CallbackConfig;
use crate::progress::ProgressConfig;
use crate::worker_pool::{QueuePolicy, WorkerPoolConfig};

/// Reconciler configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Component this reconciler serves.
    pub component: String,
    /// HTTP listen address.
    pub http_addr: SocketAddr,
    /// Components that must be ready before this one is reconciled.
    pub dependencies: Vec<String>,
    /// Worker pool settings.
    pub pool: WorkerPoolConfig,
    /// How long in-flight jobs may finish after a shutdown signal.
    pub shutdown_grace: Duration,
    /// `kind/name` list for the built-in readiness action.
    pub watch_resources: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let component = lookup("RECONCILER_COMPONENT")
            .filter(|c| !c.trim().is_empty())
            .ok_or(ConfigError::MissingEnvVar("RECONCILER_COMPONENT"))?;

        let port: u16 = lookup("RECONCILER_PORT")
            .unwrap_or_else(|| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;
        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let dependencies = lookup("RECONCILER_DEPENDENCIES")
            .map(|deps| {
                deps.split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let number = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
            }
        };
        let secs = |key: &'static str, default: u64| number(key, default).map(Duration::from_secs);

        let queue_policy = match lookup("RECONCILER_QUEUE_POLICY") {
            None => QueuePolicy::Reject,
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidQueuePolicy(raw))?,
        };

        let pool = WorkerPoolConfig {
            capacity: number("RECONCILER_WORKER_POOL_SIZE", 50)? as usize,
            worker_timeout: secs("RECONCILER_WORKER_TIMEOUT_SECS", 600)?,
            heartbeat_interval: secs("RECONCILER_HEARTBEAT_INTERVAL_SECS", 30)?,
            progress: ProgressConfig {
                interval: secs("RECONCILER_PROGRESS_INTERVAL_SECS", 1)?,
                timeout: secs("RECONCILER_PROGRESS_TIMEOUT_SECS", 300)?,
            },
            queue_policy,
            callback: CallbackConfig {
                max_retries: number("RECONCILER_CALLBACK_MAX_RETRIES", 5)? as u32,
                retry_delay: secs("RECONCILER_CALLBACK_RETRY_DELAY_SECS", 30)?,
                request_timeout: secs("RECONCILER_CALLBACK_TIMEOUT_SECS", 10)?,
            },
            archive_cache_capacity: number("RECONCILER_ARCHIVE_CACHE_CAPACITY", 16)? as usize,
        };

        if pool.capacity == 0 {
            return Err(ConfigError::InvalidNumber {
                key: "RECONCILER_WORKER_POOL_SIZE",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            component,
            http_addr,
            dependencies,
            pool,
            shutdown_grace: secs("RECONCILER_SHUTDOWN_GRACE_SECS", 30)?,
            watch_resources: lookup("RECONCILER_WATCH_RESOURCES").unwrap_or_default(),
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// The port number is invalid.
    #[error("Invalid port number")]
    InvalidPort,
    /// A numeric variable could not be parsed.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidNumber {
        /// Variable name.
        key: &'static str,
        /// Rejected value.
        value: String,
    },
    /// The queue policy is neither `reject` nor `block`.
    #[error("Invalid queue policy '{0}', expected 'reject' or 'block'")]
    InvalidQueuePolicy(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("RECONCILER_COMPONENT", "istio")]).unwrap();
        assert_eq!(config.component, "istio");
        assert_eq!(config.http_addr.port(), 8080);
        assert!(config.dependencies.is_empty());
        assert_eq!(config.pool.capacity, 50);
        assert_eq!(config.pool.worker_timeout, Duration::from_secs(600));
        assert_eq!(config.pool.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.pool.progress.interval, Duration::from_secs(1));
        assert_eq!(config.pool.callback.max_retries, 5);
        assert_eq!(config.pool.callback.retry_delay, Duration::from_secs(30));
        assert_eq!(config.pool.queue_policy, QueuePolicy::Reject);
        assert_eq!(config.shutdown_grace, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("RECONCILER_COMPONENT", "istio"),
            ("RECONCILER_PORT", "9090"),
            ("RECONCILER_DEPENDENCIES", "cluster-essentials, certificates,"),
            ("RECONCILER_WORKER_POOL_SIZE", "4"),
            ("RECONCILER_QUEUE_POLICY", "block"),
            ("RECONCILER_CALLBACK_MAX_RETRIES", "2"),
            ("RECONCILER_WATCH_RESOURCES", "deployment/istiod"),
        ])
        .unwrap();
        assert_eq!(config.http_addr.port(), 9090);
        assert_eq!(
            config.dependencies,
            vec!["cluster-essentials", "certificates"]
        );
        assert_eq!(config.pool.capacity, 4);
        assert_eq!(config.pool.queue_policy, QueuePolicy::Block);
        assert_eq!(config.pool.callback.max_retries, 2);
        assert_eq!(config.watch_resources, "deployment/istiod");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[]),
            Err(ConfigError::MissingEnvVar("RECONCILER_COMPONENT"))
        ));
        assert!(matches!(
            load(&[("RECONCILER_COMPONENT", "x"), ("RECONCILER_PORT", "http")]),
            Err(ConfigError::InvalidPort)
        ));
        assert!(matches!(
            load(&[
                ("RECONCILER_COMPONENT", "x"),
                ("RECONCILER_WORKER_TIMEOUT_SECS", "ten")
            ]),
            Err(ConfigError::InvalidNumber {
                key: "RECONCILER_WORKER_TIMEOUT_SECS",
                ..
            })
        ));
        assert!(matches!(
            load(&[("RECONCILER_COMPONENT", "x"), ("RECONCILER_QUEUE_POLICY", "drop")]),
            Err(ConfigError::InvalidQueuePolicy(_))
        ));
        assert!(load(&[
            ("RECONCILER_COMPONENT", "x"),
            ("RECONCILER_WORKER_POOL_SIZE", "0")
        ])
        .is_err());
    }
}
