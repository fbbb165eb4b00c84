// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Callback delivery.
//!
//! [`CallbackDispatcher`] sends one [`CallbackMessage`] to a [`CallbackSink`],
//! retrying HTTP deliveries a bounded number of times. [`CallbackPublisher`]
//! is the per-job single writer: every message for a job goes through one
//! queue and is delivered in the order it was published, so a heartbeat can
//! never be sent after the terminal message. Once the terminal message is
//! queued, heartbeats still waiting are skipped and the message in flight gets
//! no further retries. The first non-terminal message is always attempted.

use std::time::Duration;

use reqwest::Url;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::CallbackFn;
use crate::status::CallbackMessage;

/// Queue depth of a job's publisher. Heartbeats beyond this are dropped.
const PUBLISHER_QUEUE_DEPTH: usize = 8;

/// Where status updates for a job are delivered.
#[derive(Debug, Clone)]
pub enum CallbackSink {
    /// POST JSON to this URL.
    Http(Url),
    /// Call this function in-process.
    Function(CallbackFn),
}

/// Callback retry configuration.
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Timeout of a single HTTP attempt.
    pub request_timeout: Duration,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Errors from callback delivery.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CallbackError {
    /// Every HTTP attempt failed.
    #[error("callback to {url} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Target URL.
        url: String,
        /// Attempts made (first try plus retries).
        attempts: u32,
        /// Error of the final attempt.
        last_error: String,
    },

    /// The in-process callback returned an error.
    #[error("callback function failed: {0}")]
    Rejected(String),

    /// The publisher task stopped before the message was delivered.
    #[error("callback publisher closed")]
    PublisherClosed,
}

/// Sends callback messages with bounded retry.
#[derive(Debug, Clone)]
pub struct CallbackDispatcher {
    http: reqwest::Client,
    config: CallbackConfig,
}

impl CallbackDispatcher {
    /// Create a dispatcher with its own HTTP client.
    pub fn new(config: CallbackConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create a dispatcher reusing an HTTP client.
    pub fn with_client(http: reqwest::Client, config: CallbackConfig) -> Self {
        Self { http, config }
    }

    /// Retry configuration in use.
    pub fn config(&self) -> &CallbackConfig {
        &self.config
    }

    /// Deliver one message.
    ///
    /// HTTP sinks get `1 + max_retries` attempts spaced by `retry_delay`.
    /// Function sinks are called once.
    pub async fn send(
        &self,
        sink: &CallbackSink,
        message: &CallbackMessage,
    ) -> Result<(), CallbackError> {
        match sink {
            CallbackSink::Function(func) => func.call(message).map_err(CallbackError::Rejected),
            CallbackSink::Http(url) => self.send_http(url, message, None).await,
        }
    }

    /// Like [`send`](Self::send), but no retry is started once `stop` is
    /// cancelled. An attempt already in flight is completed.
    pub async fn send_until(
        &self,
        sink: &CallbackSink,
        message: &CallbackMessage,
        stop: &CancellationToken,
    ) -> Result<(), CallbackError> {
        match sink {
            CallbackSink::Function(func) => func.call(message).map_err(CallbackError::Rejected),
            CallbackSink::Http(url) => self.send_http(url, message, Some(stop)).await,
        }
    }

    async fn send_http(
        &self,
        url: &Url,
        message: &CallbackMessage,
        stop: Option<&CancellationToken>,
    ) -> Result<(), CallbackError> {
        let max_attempts = self.config.max_retries + 1;
        let mut attempts = 0;
        let mut last_error = String::new();

        loop {
            attempts += 1;
            let attempt = attempts;
            match self.post(url, message).await {
                Ok(()) => {
                    debug!(%url, status = %message.status, attempt, "Callback delivered");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        %url,
                        status = %message.status,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Callback attempt failed"
                    );
                    last_error = e;
                }
            }

            if attempt == max_attempts {
                break;
            }
            match stop {
                Some(stop) => {
                    tokio::select! {
                        biased;
                        _ = stop.cancelled() => break,
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                    }
                }
                None => tokio::time::sleep(self.config.retry_delay).await,
            }
        }

        Err(CallbackError::RetriesExhausted {
            url: url.to_string(),
            attempts,
            last_error,
        })
    }

    async fn post(&self, url: &Url, message: &CallbackMessage) -> Result<(), String> {
        let response = self
            .http
            .post(url.clone())
            .timeout(self.config.request_timeout)
            .json(message)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("unexpected HTTP status {}", status))
        }
    }
}

/// Per-job, ordered publisher of callback messages.
///
/// Created with [`CallbackPublisher::spawn`]. Without a sink every publish is
/// a no-op.
#[derive(Debug, Clone)]
pub struct CallbackPublisher {
    tx: Option<mpsc::Sender<CallbackMessage>>,
}

/// Handle used by the worker to publish the terminal message and wait for its
/// delivery.
#[derive(Debug)]
pub struct PublisherTask {
    publisher: CallbackPublisher,
    finishing: CancellationToken,
    handle: Option<JoinHandle<Option<Result<(), CallbackError>>>>,
}

impl CallbackPublisher {
    /// Spawn the delivery task for one job.
    pub fn spawn(
        dispatcher: CallbackDispatcher,
        sink: Option<CallbackSink>,
        job_id: &str,
    ) -> PublisherTask {
        let Some(sink) = sink else {
            debug!(job_id, "No callback sink, skipping callback delivery");
            return PublisherTask {
                publisher: CallbackPublisher { tx: None },
                finishing: CancellationToken::new(),
                handle: None,
            };
        };

        let (tx, mut rx) = mpsc::channel::<CallbackMessage>(PUBLISHER_QUEUE_DEPTH);
        let job_id = job_id.to_string();
        let finishing = CancellationToken::new();
        let superseded = finishing.clone();

        let handle = tokio::spawn(async move {
            let mut terminal_result = None;
            let mut progress_sent = false;
            while let Some(message) = rx.recv().await {
                let result = if message.status.is_terminal() {
                    dispatcher.send(&sink, &message).await
                } else if progress_sent && superseded.is_cancelled() {
                    debug!(
                        job_id = %job_id,
                        status = %message.status,
                        "Skipping superseded callback"
                    );
                    continue;
                } else {
                    progress_sent = true;
                    dispatcher.send_until(&sink, &message, &superseded).await
                };
                if let Err(e) = &result {
                    warn!(
                        job_id = %job_id,
                        status = %message.status,
                        error = %e,
                        "Dropping undeliverable callback"
                    );
                }
                if message.status.is_terminal() {
                    terminal_result = Some(result);
                }
            }
            terminal_result
        });

        PublisherTask {
            publisher: CallbackPublisher { tx: Some(tx) },
            finishing,
            handle: Some(handle),
        }
    }

    /// Queue a non-terminal message without waiting.
    ///
    /// Returns `false` when the message was dropped because the queue is full
    /// or the publisher is gone.
    pub fn publish(&self, message: CallbackMessage) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                debug!(status = %msg.status, "Callback queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

impl PublisherTask {
    /// A cloneable publisher for intermediate messages.
    pub fn publisher(&self) -> CallbackPublisher {
        self.publisher.clone()
    }

    /// Queue a non-terminal message without waiting.
    pub fn publish(&self, message: CallbackMessage) -> bool {
        self.publisher.publish(message)
    }

    /// Queue the terminal message, close the queue and wait for its delivery.
    ///
    /// Non-terminal messages still queued or being retried are abandoned.
    ///
    /// Returns `None` when the job has no sink.
    pub async fn finish(mut self, message: CallbackMessage) -> Option<Result<(), CallbackError>> {
        let tx = self.publisher.tx.take()?;
        let handle = self.handle.take()?;

        self.finishing.cancel();
        if tx.send(message).await.is_err() {
            return Some(Err(CallbackError::PublisherClosed));
        }
        drop(tx);

        match handle.await {
            Ok(Some(result)) => Some(result),
            Ok(None) => Some(Err(CallbackError::PublisherClosed)),
            Err(e) => {
                info!(error = %e, "Callback publisher task ended abnormally");
                Some(Err(CallbackError::PublisherClosed))
            }
        }
    }
}
