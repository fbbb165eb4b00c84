// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock cluster for testing.
//!
//! Resource states are scripted per object: each lookup consumes the next
//! scripted state and the last one repeats forever. Unknown objects are
//! reported as absent.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::traits::*;

type ObjectKey = (ResourceKind, String, String);

fn key(kind: ResourceKind, namespace: &str, name: &str) -> ObjectKey {
    (kind, namespace.to_string(), name.to_string())
}

/// In-memory cluster.
pub struct MockClusterClient {
    states: Mutex<HashMap<ObjectKey, VecDeque<ResourceState>>>,
    deleted: Mutex<Vec<ObjectKey>>,
    lookups: AtomicUsize,
    host: String,
    /// If true, every lookup fails with an API error.
    pub fail_lookups: bool,
}

impl Default for MockClusterClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClusterClient {
    /// Create an empty mock cluster.
    pub fn new() -> Self {
        Self::with_host("https://api.mock.example.org")
    }

    /// Create an empty mock cluster reporting `host` as its API server.
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            deleted: Mutex::new(Vec::new()),
            lookups: AtomicUsize::new(0),
            host: host.into(),
            fail_lookups: false,
        }
    }

    /// Script the states returned for one object, in order.
    pub async fn script(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        states: impl IntoIterator<Item = ResourceState>,
    ) {
        self.states
            .lock()
            .await
            .insert(key(kind, namespace, name), states.into_iter().collect());
    }

    /// Objects deleted so far, as `(kind, namespace, name)`.
    pub async fn deleted(&self) -> Vec<(ResourceKind, String, String)> {
        self.deleted.lock().await.clone()
    }

    /// Number of state lookups served.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    async fn resource_state(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<ResourceState> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups {
            return Err(ClusterError::Api("mock lookup failure".to_string()));
        }

        let mut states = self.states.lock().await;
        let Some(queue) = states.get_mut(&key(kind, namespace, name)) else {
            return Ok(ResourceState::Absent);
        };
        let state = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        };
        Ok(state.unwrap_or(ResourceState::Absent))
    }

    async fn delete_resource(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: &str,
    ) -> Result<bool> {
        let object = key(kind, namespace, name);
        let existed = {
            let states = self.states.lock().await;
            states
                .get(&object)
                .and_then(|q| q.front())
                .is_some_and(|s| *s != ResourceState::Absent)
        };
        self.deleted.lock().await.push(object);
        Ok(existed)
    }

    fn host(&self) -> String {
        self.host.clone()
    }
}

/// Connector handing out one shared [`MockClusterClient`].
#[derive(Clone)]
pub struct MockConnector {
    client: Arc<MockClusterClient>,
    fail: bool,
}

impl MockConnector {
    /// Connector that always returns `client`.
    pub fn new(client: Arc<MockClusterClient>) -> Self {
        Self {
            client,
            fail: false,
        }
    }

    /// Connector that rejects every kubeconfig.
    pub fn failing() -> Self {
        Self {
            client: Arc::new(MockClusterClient::new()),
            fail: true,
        }
    }

    /// The client handed out by this connector.
    pub fn client(&self) -> Arc<MockClusterClient> {
        self.client.clone()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new(Arc::new(MockClusterClient::new()))
    }
}

#[async_trait]
impl ClusterConnector for MockConnector {
    async fn connect(&self, _kubeconfig: &str) -> Result<Arc<dyn ClusterClient>> {
        if self.fail {
            return Err(ClusterError::Kubeconfig("mock connector rejects all".to_string()));
        }
        Ok(self.client.clone())
    }
}
