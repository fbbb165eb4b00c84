// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request validation.
//!
//! Turns a raw [`ReconciliationRequest`] into an [`AdmittedRequest`] or a
//! [`ValidationError`]. Checks run in a fixed order: required fields, the
//! operation kind, configuration value types, and finally the callback URL.

use std::fmt;

use reqwest::Url;
use thiserror::Error;

use crate::callback::CallbackSink;
use crate::model::{ConfigValue, OperationType, ReconciliationRequest, Task, TaskConfiguration};

/// Reasons a request is rejected with `400 Bad Request`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// A mandatory field is missing or blank.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// The operation is not one of the supported kinds.
    #[error("unsupported operation type '{0}'")]
    UnsupportedOperation(String),

    /// A configuration entry has an empty key.
    #[error("configuration entry {0} has an empty key")]
    EmptyConfigKey(usize),

    /// A configuration value is not a string, bool, int or float.
    #[error("configuration value for '{key}' must be a string, bool or number (got {kind})")]
    InvalidConfigValue {
        /// Offending key.
        key: String,
        /// JSON kind of the rejected value.
        kind: &'static str,
    },

    /// The callback URL cannot be used.
    #[error("invalid callback URL '{url}': {reason}")]
    InvalidCallbackUrl {
        /// URL as given.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// A request that passed validation.
#[derive(Clone)]
pub struct AdmittedRequest {
    /// Data handed to the action.
    pub task: Task,
    /// Credentials for the target cluster.
    pub kubeconfig: String,
    /// Components the caller reported as ready.
    pub components_ready: Vec<String>,
    /// Where status updates go, if anywhere.
    pub sink: Option<CallbackSink>,
}

impl fmt::Debug for AdmittedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmittedRequest")
            .field("task", &self.task)
            .field("kubeconfig", &"***")
            .field("components_ready", &self.components_ready)
            .field("sink", &self.sink)
            .finish()
    }
}

/// Validate a raw request.
pub fn validate(request: ReconciliationRequest) -> Result<AdmittedRequest, ValidationError> {
    require("component", &request.component)?;
    require("namespace", &request.namespace)?;
    require("version", &request.version)?;
    require("kubeconfig", &request.kubeconfig)?;
    let profile = request.profile.filter(|p| !p.trim().is_empty());

    let operation = match request.operation.as_deref() {
        None | Some("") => OperationType::Reconcile,
        Some(op) => OperationType::parse(op)
            .ok_or_else(|| ValidationError::UnsupportedOperation(op.to_string()))?,
    };

    let mut configuration = TaskConfiguration::default();
    for (idx, entry) in request.configuration.iter().enumerate() {
        if entry.key.trim().is_empty() {
            return Err(ValidationError::EmptyConfigKey(idx));
        }
        let value = config_value(&entry.key, &entry.value)?;
        configuration.insert(entry.key.clone(), value, entry.secret);
    }

    let sink = match (request.callback_func, request.callback_url) {
        (Some(func), _) => Some(CallbackSink::Function(func)),
        (None, Some(url)) if !url.is_empty() => Some(CallbackSink::Http(parse_callback_url(&url)?)),
        (None, _) => None,
    };

    Ok(AdmittedRequest {
        task: Task {
            component: request.component,
            namespace: request.namespace,
            version: request.version,
            profile,
            operation,
            install_crd: request.install_crd,
            correlation_id: request.correlation_id,
            metadata: request.metadata,
            configuration,
        },
        kubeconfig: request.kubeconfig,
        components_ready: request.components_ready,
        sink,
    })
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

fn config_value(key: &str, value: &serde_json::Value) -> Result<ConfigValue, ValidationError> {
    use serde_json::Value;

    let invalid = |kind| ValidationError::InvalidConfigValue {
        key: key.to_string(),
        kind,
    };

    match value {
        Value::Bool(b) => Ok(ConfigValue::Bool(*b)),
        Value::String(s) => Ok(ConfigValue::String(s.clone())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(ConfigValue::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(ConfigValue::Float(f))
            } else {
                Err(invalid("number out of range"))
            }
        }
        Value::Null => Err(invalid("null")),
        Value::Array(_) => Err(invalid("array")),
        Value::Object(_) => Err(invalid("object")),
    }
}

fn parse_callback_url(raw: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(raw).map_err(|e| ValidationError::InvalidCallbackUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ValidationError::InvalidCallbackUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}
