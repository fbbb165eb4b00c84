// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource readiness tracking.
//!
//! A [`ProgressTracker`] polls a set of named Kubernetes objects until every
//! one of them reaches the desired state, the job is cancelled, or the
//! tracker's own timeout elapses.

mod tracker;

pub use tracker::*;
