// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Action module - pluggable component logic.

pub mod mock;
pub mod readiness;
mod traits;

pub use mock::{MockAction, MockOutcome};
pub use readiness::ReadinessAction;
pub use traits::*;
