// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dependency gating for incoming requests.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Outcome of checking a request's ready components against the configured
/// dependency list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// The configured dependency list, in configuration order.
    pub required: Vec<String>,
    /// Required components the caller did not report as ready, in
    /// configuration order.
    pub missing: Vec<String>,
}

impl Resolution {
    /// Whether every required component is ready.
    pub fn is_satisfied(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Compute `required − ready`, preserving the order of `required`.
pub fn resolve<R, S>(required: &[R], ready: &[S]) -> Resolution
where
    R: AsRef<str>,
    S: AsRef<str>,
{
    let ready: HashSet<&str> = ready.iter().map(AsRef::as_ref).collect();
    let required: Vec<String> = required.iter().map(|r| r.as_ref().to_string()).collect();
    let missing = required
        .iter()
        .filter(|dep| !ready.contains(dep.as_str()))
        .cloned()
        .collect();

    Resolution { required, missing }
}
