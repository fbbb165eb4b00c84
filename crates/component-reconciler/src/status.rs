// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Job lifecycle states and the callback message.
//!
//! # Status State Machine
//!
//! ```text
//!              ┌────────────┐
//!              │ NOTSTARTED │
//!              └─────┬──────┘
//!                    │ worker claims job
//!                    ▼
//!              ┌────────────┐
//!              │  RUNNING   │──── heartbeat (no transition)
//!              └─────┬──────┘
//!        ┌───────────┼────────────┐
//!   ok + ready    error/timeout   domain failure
//!        ▼           ▼            ▼
//!   ┌─────────┐ ┌─────────┐  ┌─────────┐
//!   │ SUCCESS │ │  ERROR  │  │ FAILED  │
//!   └─────────┘ └─────────┘  └─────────┘
//! ```
//!
//! A job that never gets a worker (deadline elapsed while queued, pool shut
//! down, cluster unreachable) may also go straight from `NotStarted` to
//! `Error`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a reconciliation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Admitted, waiting for a worker.
    NotStarted,
    /// A worker is executing the action.
    Running,
    /// The action reported a non-retryable domain failure.
    Failed,
    /// The action returned an error or the job timed out.
    Error,
    /// The action completed and readiness was confirmed.
    Success,
}

impl Status {
    /// Wire representation used in callbacks.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotStarted => "notstarted",
            Status::Running => "running",
            Status::Failed => "failed",
            Status::Error => "error",
            Status::Success => "success",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Failed | Status::Error | Status::Success)
    }

    /// The caller-side "final status" rule: only `Error` and `Success` end the
    /// conversation, every other status is informational.
    pub fn is_final(&self) -> bool {
        matches!(self, Status::Error | Status::Success)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: Status) -> bool {
        match (self, next) {
            (Status::NotStarted, Status::Running) => true,
            (Status::NotStarted, Status::Error) => true,
            (Status::Running, Status::Success | Status::Error | Status::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("status '{0}' not found")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "notstarted" => Ok(Status::NotStarted),
            "running" => Ok(Status::Running),
            "failed" => Ok(Status::Failed),
            "error" => Ok(Status::Error),
            "success" => Ok(Status::Success),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Payload posted to the caller on each published status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackMessage {
    /// Current job status.
    pub status: Status,
    /// Error description, set for failed jobs only.
    pub error: Option<String>,
}

impl CallbackMessage {
    /// Message without an error attached.
    pub fn status(status: Status) -> Self {
        Self {
            status,
            error: None,
        }
    }

    /// Message carrying an error description.
    pub fn with_error(status: Status, error: impl Into<String>) -> Self {
        Self {
            status,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_status_rule() {
        assert!(Status::Error.is_final());
        assert!(Status::Success.is_final());
        assert!(!Status::Failed.is_final());
        assert!(!Status::Running.is_final());
        assert!(!Status::NotStarted.is_final());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(Status::Failed.is_terminal());
        assert!(Status::Error.is_terminal());
        assert!(Status::Success.is_terminal());
        assert!(!Status::Running.is_terminal());
    }

    #[test]
    fn test_no_transition_after_terminal() {
        for terminal in [Status::Failed, Status::Error, Status::Success] {
            for next in [
                Status::NotStarted,
                Status::Running,
                Status::Failed,
                Status::Error,
                Status::Success,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(Status::NotStarted.can_transition_to(Status::Running));
        assert!(Status::Running.can_transition_to(Status::Failed));
        assert!(!Status::Running.can_transition_to(Status::NotStarted));
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Running".parse::<Status>().unwrap(), Status::Running);
        assert_eq!("NOTSTARTED".parse::<Status>().unwrap(), Status::NotStarted);
        assert_eq!("success".parse::<Status>().unwrap(), Status::Success);
        assert!("done".parse::<Status>().is_err());
    }

    #[test]
    fn test_callback_message_wire_format() {
        let msg = CallbackMessage::status(Status::Running);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({"status": "running", "error": null})
        );

        let msg = CallbackMessage::with_error(Status::Error, "boom");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({"status": "error", "error": "boom"})
        );
    }
}
