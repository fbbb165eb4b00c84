// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for the component reconciler.
//!
//! [`ReconcilerRuntime`] wires a [`WorkerPool`] to the HTTP server so the
//! reconciler can run inside an existing tokio application.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use component_reconciler::action::{ActionRegistry, ReadinessAction};
//! use component_reconciler::cluster::kube::KubeConnector;
//! use component_reconciler::runtime::ReconcilerRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let action = ReadinessAction::parse("deployment/istiod")?;
//!     let runtime = ReconcilerRuntime::builder()
//!         .component("istio")
//!         .dependencies(vec!["cluster-essentials".into()])
//!         .registry(ActionRegistry::new().with("istio", Arc::new(action)))
//!         .connector(Arc::new(KubeConnector))
//!         .bind_addr("0.0.0.0:8080".parse()?)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... run your application ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::action::{ActionRegistry, ReadinessAction};
use crate::cluster::ClusterConnector;
use crate::config::Config;
use crate::handlers::ReconcilerState;
use crate::server::run_server_with_shutdown;
use crate::worker_pool::{WorkerPool, WorkerPoolConfig};

/// Builder for creating a [`ReconcilerRuntime`].
pub struct ReconcilerRuntimeBuilder {
    component: Option<String>,
    dependencies: Vec<String>,
    registry: ActionRegistry,
    connector: Option<Arc<dyn ClusterConnector>>,
    bind_addr: SocketAddr,
    pool: WorkerPoolConfig,
    shutdown_grace: Duration,
}

impl Default for ReconcilerRuntimeBuilder {
    fn default() -> Self {
        Self {
            component: None,
            dependencies: Vec::new(),
            registry: ActionRegistry::new(),
            connector: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            pool: WorkerPoolConfig::default(),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl ReconcilerRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pre-filled from a loaded [`Config`].
    pub fn from_config(config: Config) -> Self {
        Self {
            component: Some(config.component),
            dependencies: config.dependencies,
            bind_addr: config.http_addr,
            pool: config.pool,
            shutdown_grace: config.shutdown_grace,
            ..Self::default()
        }
    }

    /// Builder for a reconciler configured from the environment, serving its
    /// component with a [`ReadinessAction`] over the configured resources.
    pub fn from_env() -> crate::error::Result<Self> {
        Self::with_readiness_action(Config::from_env()?)
    }

    /// Builder for `config` with a [`ReadinessAction`] built from
    /// `config.watch_resources` registered for the component.
    pub fn with_readiness_action(config: Config) -> crate::error::Result<Self> {
        let action = ReadinessAction::parse(&config.watch_resources)?;
        info!(
            component = %config.component,
            resources = action.resources().len(),
            "Readiness action configured"
        );
        let registry = ActionRegistry::new().with(config.component.clone(), Arc::new(action));
        Ok(Self::from_config(config).registry(registry))
    }

    /// Set the component served (required).
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Set the dependency list.
    pub fn dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Set the action registry.
    pub fn registry(mut self, registry: ActionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the cluster connector (required).
    pub fn connector(mut self, connector: Arc<dyn ClusterConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set the HTTP bind address. Port `0` picks a free port.
    ///
    /// Default: `0.0.0.0:8080`
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the worker pool configuration.
    pub fn pool_config(mut self, config: WorkerPoolConfig) -> Self {
        self.pool = config;
        self
    }

    /// Set how long in-flight jobs may run after shutdown is requested.
    ///
    /// Default: 30 seconds
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<ReconcilerRuntimeConfig> {
        let component = self
            .component
            .ok_or_else(|| anyhow::anyhow!("component is required"))?;
        let connector = self
            .connector
            .ok_or_else(|| anyhow::anyhow!("connector is required"))?;
        if self.registry.get(&component).is_none() {
            anyhow::bail!("no action registered for component '{}'", component);
        }

        Ok(ReconcilerRuntimeConfig {
            component,
            dependencies: self.dependencies,
            registry: self.registry,
            connector,
            bind_addr: self.bind_addr,
            pool: self.pool,
            shutdown_grace: self.shutdown_grace,
        })
    }
}

/// Configuration for a [`ReconcilerRuntime`].
pub struct ReconcilerRuntimeConfig {
    component: String,
    dependencies: Vec<String>,
    registry: ActionRegistry,
    connector: Arc<dyn ClusterConnector>,
    bind_addr: SocketAddr,
    pool: WorkerPoolConfig,
    shutdown_grace: Duration,
}

impl ReconcilerRuntimeConfig {
    /// Start the runtime: bind the listener, create the pool and spawn the
    /// HTTP server.
    pub async fn start(self) -> Result<ReconcilerRuntime> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        let bind_addr = listener.local_addr()?;

        let pool = WorkerPool::new(self.pool, self.registry, self.connector);
        let state = Arc::new(ReconcilerState::new(
            self.component.clone(),
            self.dependencies,
            pool.clone(),
        ));

        let (server_shutdown_tx, server_shutdown_rx) = watch::channel(false);
        let server_handle = tokio::spawn(run_server_with_shutdown(
            listener,
            state.clone(),
            server_shutdown_rx,
        ));

        info!(
            bind_addr = %bind_addr,
            component = %self.component,
            capacity = pool.capacity(),
            queue_policy = %pool.config().queue_policy,
            "ReconcilerRuntime started"
        );

        Ok(ReconcilerRuntime {
            server_handle,
            server_shutdown_tx,
            state,
            pool,
            bind_addr,
            shutdown_grace: self.shutdown_grace,
        })
    }
}

/// A running reconciler.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct ReconcilerRuntime {
    server_handle: JoinHandle<Result<()>>,
    server_shutdown_tx: watch::Sender<bool>,
    state: Arc<ReconcilerState>,
    pool: WorkerPool,
    bind_addr: SocketAddr,
    shutdown_grace: Duration,
}

impl ReconcilerRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> ReconcilerRuntimeBuilder {
        ReconcilerRuntimeBuilder::new()
    }

    /// Address the HTTP server is bound to.
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Get a reference to the shared handler state.
    pub fn state(&self) -> &Arc<ReconcilerState> {
        &self.state
    }

    /// The worker pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Check if the HTTP server is still running.
    pub fn is_running(&self) -> bool {
        !self.server_handle.is_finished()
    }

    /// Gracefully shut down the runtime.
    ///
    /// Stops admitting jobs, drains the worker pool within the grace period,
    /// then stops the HTTP server.
    pub async fn shutdown(self) -> Result<()> {
        info!("ReconcilerRuntime shutting down...");

        self.pool.shutdown(self.shutdown_grace).await;

        let _ = self.server_shutdown_tx.send(true);
        match self.server_handle.await {
            Ok(Ok(())) => {
                info!("ReconcilerRuntime shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("ReconcilerRuntime server error during shutdown: {}", e);
                Err(e)
            }
            Err(e) => {
                error!("ReconcilerRuntime server task panicked: {}", e);
                Err(anyhow::anyhow!("server task panicked: {}", e))
            }
        }
    }
}
