// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reconciliation request and task types.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::status::CallbackMessage;

/// Kind of operation a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Install or upgrade the component.
    Reconcile,
    /// Remove the component.
    Delete,
}

impl OperationType {
    /// Parse a wire value (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "reconcile" => Some(OperationType::Reconcile),
            "delete" => Some(OperationType::Delete),
            _ => None,
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Reconcile => "reconcile",
            OperationType::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configuration entry as sent by the caller.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Configuration key.
    pub key: String,
    /// Raw JSON value; validated to be a scalar before admission.
    pub value: serde_json::Value,
    /// Whether the value must be kept out of logs.
    #[serde(default)]
    pub secret: bool,
}

impl fmt::Debug for ConfigEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ConfigEntry");
        s.field("key", &self.key);
        if self.secret {
            s.field("value", &"***");
        } else {
            s.field("value", &self.value);
        }
        s.field("secret", &self.secret).finish()
    }
}

/// Runtime metadata describing the target cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Runtime instance id.
    #[serde(rename = "instanceID", default)]
    pub instance_id: String,
    /// Global account the runtime belongs to.
    #[serde(rename = "globalAccountID", default)]
    pub global_account_id: String,
    /// Sub-account the runtime belongs to.
    #[serde(rename = "subAccountID", default)]
    pub sub_account_id: String,
    /// Name of the shoot cluster.
    #[serde(rename = "shootName", default)]
    pub shoot_name: String,
    /// Service plan of the runtime.
    #[serde(rename = "servicePlanName", default)]
    pub service_plan_name: String,
    /// Cloud region.
    #[serde(default)]
    pub region: String,
}

type CallbackClosure = dyn Fn(&CallbackMessage) -> std::result::Result<(), String> + Send + Sync;

/// In-process callback, used instead of an HTTP URL by embedders and tests.
#[derive(Clone)]
pub struct CallbackFn(Arc<CallbackClosure>);

impl CallbackFn {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&CallbackMessage) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the callback.
    pub fn call(&self, message: &CallbackMessage) -> std::result::Result<(), String> {
        (self.0)(message)
    }
}

impl fmt::Debug for CallbackFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallbackFn(..)")
    }
}

/// A reconciliation request as received on `POST /v1/run`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationRequest {
    /// Components the caller asserts are already ready.
    #[serde(rename = "componentsReady", default, deserialize_with = "null_as_default")]
    pub components_ready: Vec<String>,
    /// Component to reconcile.
    #[serde(default)]
    pub component: String,
    /// Target namespace.
    #[serde(default)]
    pub namespace: String,
    /// Target version.
    #[serde(default)]
    pub version: String,
    /// Optional installation profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Free-form configuration.
    #[serde(default, deserialize_with = "null_as_default")]
    pub configuration: Vec<ConfigEntry>,
    /// Credentials for the target cluster.
    #[serde(default)]
    pub kubeconfig: String,
    /// Requested operation; `reconcile` when absent.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Whether CRDs should be installed.
    #[serde(rename = "installCRD", default)]
    pub install_crd: bool,
    /// Caller-supplied correlation id.
    #[serde(rename = "correlationID", default)]
    pub correlation_id: String,
    /// HTTP callback sink.
    #[serde(rename = "callbackURL", default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    /// Runtime metadata.
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: TaskMetadata,
    /// In-process callback sink; takes precedence over `callback_url`.
    #[serde(skip)]
    pub callback_func: Option<CallbackFn>,
}

// Clients may send `null` for an empty list or object.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl fmt::Debug for ReconciliationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationRequest")
            .field("component", &self.component)
            .field("namespace", &self.namespace)
            .field("version", &self.version)
            .field("profile", &self.profile)
            .field("operation", &self.operation)
            .field("components_ready", &self.components_ready)
            .field("configuration", &self.configuration)
            .field("kubeconfig", &"***")
            .field("install_crd", &self.install_crd)
            .field("correlation_id", &self.correlation_id)
            .field("callback_url", &self.callback_url)
            .field("callback_func", &self.callback_func)
            .finish()
    }
}

/// A validated configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
}

/// Validated configuration, keyed by configuration key.
#[derive(Clone, Default)]
pub struct TaskConfiguration {
    values: BTreeMap<String, ConfigValue>,
    secrets: Vec<String>,
}

impl TaskConfiguration {
    /// Insert a value.
    pub fn insert(&mut self, key: impl Into<String>, value: ConfigValue, secret: bool) {
        let key = key.into();
        if secret {
            self.secrets.push(key.clone());
        }
        self.values.insert(key, value);
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the key was flagged as secret.
    pub fn is_secret(&self, key: &str) -> bool {
        self.secrets.iter().any(|s| s == key)
    }
}

impl fmt::Debug for TaskConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.values {
            if self.is_secret(key) {
                map.entry(key, &"***");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

/// Everything an action needs to know about the requested change.
#[derive(Debug, Clone)]
pub struct Task {
    /// Component name.
    pub component: String,
    /// Target namespace.
    pub namespace: String,
    /// Target version.
    pub version: String,
    /// Installation profile.
    pub profile: Option<String>,
    /// Operation kind.
    pub operation: OperationType,
    /// Whether CRDs should be installed.
    pub install_crd: bool,
    /// Correlation id for logs and callbacks.
    pub correlation_id: String,
    /// Runtime metadata.
    pub metadata: TaskMetadata,
    /// Validated configuration.
    pub configuration: TaskConfiguration,
}

impl Task {
    /// String configuration value, `None` when absent or not a string.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        match self.configuration.get(key) {
            Some(ConfigValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Boolean configuration value, `None` when absent or not a bool.
    pub fn config_bool(&self, key: &str) -> Option<bool> {
        match self.configuration.get(key) {
            Some(ConfigValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_lists_read_as_empty() {
        let raw = serde_json::json!({
            "componentsReady": null,
            "component": "component-1",
            "namespace": "inttest-comprecon",
            "version": "1.2.3",
            "profile": "",
            "configuration": null,
            "kubeconfig": "xyz",
            "metadata": null
        });

        let req: ReconciliationRequest = serde_json::from_value(raw).unwrap();
        assert!(req.components_ready.is_empty());
        assert!(req.configuration.is_empty());
        assert_eq!(req.metadata, TaskMetadata::default());
    }

    #[test]
    fn test_deserialize_wire_names() {
        let raw = serde_json::json!({
            "componentsReady": ["abc", "xyz"],
            "component": "component-1",
            "namespace": "inttest-comprecon",
            "version": "1.2.3",
            "profile": "unittest",
            "configuration": [{"key": "initContainer", "value": true}],
            "kubeconfig": "xyz",
            "installCRD": true,
            "correlationID": "test-correlation-id",
            "callbackURL": "http://localhost:11111/callback",
            "type": "delete",
            "metadata": {"shootName": "shoot-1", "instanceID": "inst-1"}
        });

        let req: ReconciliationRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(req.components_ready, vec!["abc", "xyz"]);
        assert_eq!(req.profile.as_deref(), Some("unittest"));
        assert!(req.install_crd);
        assert_eq!(req.correlation_id, "test-correlation-id");
        assert_eq!(req.operation.as_deref(), Some("delete"));
        assert_eq!(req.configuration[0].value, serde_json::json!(true));
        assert!(!req.configuration[0].secret);
        assert_eq!(req.metadata.shoot_name, "shoot-1");
        assert_eq!(req.metadata.instance_id, "inst-1");
        assert!(req.callback_func.is_none());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let req = ReconciliationRequest {
            kubeconfig: "super-secret-kubeconfig".to_string(),
            configuration: vec![ConfigEntry {
                key: "password".to_string(),
                value: serde_json::json!("hunter2"),
                secret: true,
            }],
            ..Default::default()
        };
        let out = format!("{:?}", req);
        assert!(!out.contains("super-secret-kubeconfig"));
        assert!(!out.contains("hunter2"));

        let mut cfg = TaskConfiguration::default();
        cfg.insert("password", ConfigValue::String("hunter2".into()), true);
        cfg.insert("replicas", ConfigValue::Int(3), false);
        let out = format!("{:?}", cfg);
        assert!(!out.contains("hunter2"));
        assert!(out.contains("Int(3)"));
    }

    #[test]
    fn test_operation_parse() {
        assert_eq!(OperationType::parse("Reconcile"), Some(OperationType::Reconcile));
        assert_eq!(OperationType::parse("delete"), Some(OperationType::Delete));
        assert_eq!(OperationType::parse("restart"), None);
    }
}
