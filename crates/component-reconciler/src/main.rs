// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Component Reconciler Server
//!
//! Serves `POST /v1/run` for one component and reconciles it against the
//! cluster described by each request's kubeconfig.

use std::sync::Arc;
use tracing::{info, warn};

use component_reconciler::cluster::kube::KubeConnector;
use component_reconciler::runtime::ReconcilerRuntimeBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "component_reconciler=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let builder = ReconcilerRuntimeBuilder::from_env()?;
    info!("Starting Component Reconciler");

    let runtime = builder
        .connector(Arc::new(KubeConnector))
        .build()?
        .start()
        .await?;

    info!(addr = %runtime.bind_addr(), "Reconciler ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("Component Reconciler shut down");

    Ok(())
}
