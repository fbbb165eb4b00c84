// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for component-reconciler tests.
//!
//! Provides request builders, a recording in-process callback sink, and fast
//! pool configurations.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use component_reconciler::action::{Action, ActionRegistry};
use component_reconciler::callback::CallbackConfig;
use component_reconciler::cluster::MockConnector;
use component_reconciler::model::{CallbackFn, ReconciliationRequest};
use component_reconciler::progress::ProgressConfig;
use component_reconciler::status::{CallbackMessage, Status};
use component_reconciler::validation::{AdmittedRequest, validate};
use component_reconciler::worker_pool::{QueuePolicy, WorkerPool, WorkerPoolConfig};

pub const COMPONENT: &str = "component-1";

/// A valid request for [`COMPONENT`].
pub fn request() -> ReconciliationRequest {
    ReconciliationRequest {
        components_ready: vec!["abc".into(), "xyz".into()],
        component: COMPONENT.into(),
        namespace: "inttest-comprecon".into(),
        version: "1.2.3".into(),
        profile: Some("unittest".into()),
        kubeconfig: "apiVersion: v1\nkind: Config".into(),
        correlation_id: "test-correlation-id".into(),
        ..Default::default()
    }
}

/// Pool settings with short timings.
pub fn fast_config() -> WorkerPoolConfig {
    WorkerPoolConfig {
        capacity: 2,
        worker_timeout: Duration::from_secs(5),
        heartbeat_interval: Duration::from_millis(50),
        progress: ProgressConfig {
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(2),
        },
        queue_policy: QueuePolicy::Reject,
        callback: CallbackConfig {
            max_retries: 2,
            retry_delay: Duration::from_millis(20),
            request_timeout: Duration::from_secs(1),
        },
        archive_cache_capacity: 4,
    }
}

/// A pool running `action` for [`COMPONENT`] against a mock cluster.
pub fn pool(action: Arc<dyn Action>, config: WorkerPoolConfig) -> WorkerPool {
    pool_with_connector(action, config, MockConnector::default())
}

/// A pool running `action` for [`COMPONENT`] with the given connector.
pub fn pool_with_connector(
    action: Arc<dyn Action>,
    config: WorkerPoolConfig,
    connector: MockConnector,
) -> WorkerPool {
    let registry = ActionRegistry::new().with(COMPONENT, action);
    WorkerPool::new(config, registry, Arc::new(connector))
}

/// In-process sink that records every message.
#[derive(Clone, Default)]
pub struct Recorder {
    messages: Arc<Mutex<Vec<CallbackMessage>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> CallbackFn {
        let messages = self.messages.clone();
        CallbackFn::new(move |msg| {
            messages.lock().unwrap().push(msg.clone());
            Ok(())
        })
    }

    pub fn messages(&self) -> Vec<CallbackMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<Status> {
        self.messages().iter().map(|m| m.status).collect()
    }

    pub fn terminal_count(&self) -> usize {
        self.messages()
            .iter()
            .filter(|m| m.status.is_terminal())
            .count()
    }

    pub fn last(&self) -> Option<CallbackMessage> {
        self.messages().last().cloned()
    }
}

/// A validated request whose callbacks go to `recorder`.
pub fn admitted(recorder: &Recorder) -> AdmittedRequest {
    let mut req = request();
    req.callback_func = Some(recorder.callback());
    validate(req).unwrap()
}
