// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Periodic `running` callbacks for long jobs.
//!
//! The sender ticks at a fixed interval and, while the job status is
//! `Running`, publishes a non-terminal message through the job's publisher.
//! The worker stops and joins the sender before it publishes the terminal
//! message, so a heartbeat never follows it.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::callback::CallbackPublisher;
use crate::status::{CallbackMessage, Status};

/// Publishes heartbeats for one job.
pub struct HeartbeatSender {
    interval: Duration,
    status: watch::Receiver<Status>,
    publisher: CallbackPublisher,
}

/// A running heartbeat task.
pub struct HeartbeatHandle {
    token: CancellationToken,
    handle: JoinHandle<u64>,
}

impl HeartbeatSender {
    /// Create a sender that reads the job status from `status`.
    pub fn new(
        interval: Duration,
        status: watch::Receiver<Status>,
        publisher: CallbackPublisher,
    ) -> Self {
        Self {
            interval,
            status,
            publisher,
        }
    }

    /// Start ticking until `token` is cancelled.
    pub fn spawn(self, token: CancellationToken) -> HeartbeatHandle {
        let loop_token = token.clone();
        let handle = tokio::spawn(async move { self.run(loop_token).await });
        HeartbeatHandle { token, handle }
    }

    async fn run(self, token: CancellationToken) -> u64 {
        let mut sent = 0u64;
        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => break,

                _ = tokio::time::sleep(self.interval) => {
                    let status = *self.status.borrow();
                    if status != Status::Running {
                        trace!(%status, "Skipping heartbeat");
                        continue;
                    }
                    if self.publisher.publish(CallbackMessage::status(status)) {
                        sent += 1;
                    }
                }
            }
        }
        debug!(sent, "Heartbeat stopped");
        sent
    }
}

impl HeartbeatHandle {
    /// Stop the sender and wait for it. Returns the number of heartbeats
    /// queued.
    pub async fn stop(self) -> u64 {
        self.token.cancel();
        self.handle.await.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{CallbackConfig, CallbackDispatcher, CallbackSink};
    use crate::model::CallbackFn;
    use std::sync::{Arc, Mutex};

    fn publisher() -> (crate::callback::PublisherTask, Arc<Mutex<Vec<Status>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink = CallbackSink::Function(CallbackFn::new(move |msg| {
            sink_seen.lock().unwrap().push(msg.status);
            Ok(())
        }));
        let task = CallbackPublisher::spawn(
            CallbackDispatcher::new(CallbackConfig::default()),
            Some(sink),
            "job-hb",
        );
        (task, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_while_running() {
        let (task, seen) = publisher();
        let (_status_tx, status_rx) = watch::channel(Status::Running);

        let handle = HeartbeatSender::new(Duration::from_secs(10), status_rx, task.publisher())
            .spawn(CancellationToken::new());
        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(handle.stop().await, 3);

        task.finish(CallbackMessage::status(Status::Success)).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Status::Running, Status::Running, Status::Running, Status::Success]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_heartbeat_after_terminal_status() {
        let (task, seen) = publisher();
        let (status_tx, status_rx) = watch::channel(Status::Running);
        status_tx.send_replace(Status::Error);

        let handle = HeartbeatSender::new(Duration::from_secs(1), status_rx, task.publisher())
            .spawn(CancellationToken::new());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(handle.stop().await, 0);

        task.finish(CallbackMessage::status(Status::Error)).await;
        assert_eq!(*seen.lock().unwrap(), vec![Status::Error]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_sender() {
        let (task, _seen) = publisher();
        let (_status_tx, status_rx) = watch::channel(Status::Running);
        let parent = CancellationToken::new();

        let handle = HeartbeatSender::new(Duration::from_secs(1), status_rx, task.publisher())
            .spawn(parent.child_token());
        parent.cancel();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(handle.stop().await, 0);
    }
}
