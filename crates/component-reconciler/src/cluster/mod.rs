// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster access - per-job Kubernetes clients.

pub mod kube;
pub mod mock;
mod traits;

pub use mock::{MockClusterClient, MockConnector};
pub use traits::*;
