// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock action for testing.
//!
//! Simulates component work with a configurable delay and outcome, and
//! records how many runs happened and how many overlapped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::traits::*;

/// Outcome of a [`MockAction`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Return `Ok(())`.
    Succeed,
    /// Return [`ActionError::Failed`].
    Fail(String),
    /// Return [`ActionError::Error`].
    Error(String),
    /// Panic.
    Panic,
    /// Run until cancelled.
    NeverComplete,
}

/// Mock action for testing.
pub struct MockAction {
    /// Simulated execution time.
    pub delay: Duration,
    /// What every run returns.
    pub outcome: MockOutcome,
    runs: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Default for MockAction {
    fn default() -> Self {
        Self::new()
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockAction {
    /// Create a mock action that succeeds after 10ms.
    pub fn new() -> Self {
        Self::with_outcome(MockOutcome::Succeed)
    }

    /// Create a mock action with the given outcome.
    pub fn with_outcome(outcome: MockOutcome) -> Self {
        Self {
            delay: Duration::from_millis(10),
            outcome,
            runs: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Set the simulated execution time.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of runs started.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Runs in progress right now.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping runs seen.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Action for MockAction {
    async fn run(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        if self.outcome == MockOutcome::NeverComplete {
            ctx.cancel.cancelled().await;
            return Err(ActionError::Cancelled);
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(ActionError::Cancelled),
            _ = tokio::time::sleep(self.delay) => {}
        }

        match &self.outcome {
            MockOutcome::Succeed | MockOutcome::NeverComplete => Ok(()),
            MockOutcome::Fail(msg) => Err(ActionError::Failed(msg.clone())),
            MockOutcome::Error(msg) => Err(ActionError::Error(msg.clone())),
            MockOutcome::Panic => panic!("mock action panicked"),
        }
    }
}
