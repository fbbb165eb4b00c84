// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP entry point tests.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use component_reconciler::action::{ActionRegistry, MockAction, ReadinessAction};
use component_reconciler::cluster::{
    MockClusterClient, MockConnector, ResourceKind, ResourceState,
};
use component_reconciler::handlers::ReconcilerState;
use component_reconciler::progress::ProgressConfig;
use component_reconciler::runtime::ReconcilerRuntime;
use component_reconciler::server::router;
use component_reconciler::worker_pool::WorkerPoolConfig;

fn state(dependencies: &[&str], config: WorkerPoolConfig) -> Arc<ReconcilerState> {
    let pool = pool(
        Arc::new(MockAction::new().delayed(Duration::from_millis(200))),
        config,
    );
    Arc::new(ReconcilerState::new(
        COMPONENT,
        dependencies.iter().map(|d| d.to_string()).collect(),
        pool,
    ))
}

async fn post_run(state: Arc<ReconcilerState>, body: String) -> (StatusCode, Value) {
    let response = router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/run")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn body(req: &component_reconciler::model::ReconciliationRequest) -> String {
    serde_json::to_string(req).unwrap()
}

#[tokio::test]
async fn test_missing_dependencies_returns_428() {
    let state = state(&["abc", "xyz"], fast_config());
    let mut req = request();
    req.components_ready = vec!["abc".into(), "def".into()];

    let (status, json) = post_run(state, body(&req)).await;

    assert_eq!(status, StatusCode::PRECONDITION_REQUIRED);
    assert_eq!(
        json,
        json!({"dependencies": {"required": ["abc", "xyz"], "missing": ["xyz"]}})
    );
}

fn nil_slice_payload(ready: &[&str]) -> String {
    json!({
        "componentsReady": ready,
        "component": COMPONENT,
        "namespace": "inttest-comprecon",
        "version": "1.2.3",
        "profile": "",
        "configuration": null,
        "kubeconfig": "apiVersion: v1\nkind: Config",
        "installCRD": false,
        "correlationID": "test-correlation-id",
        "callbackURL": "",
        "metadata": {
            "globalAccountID": "",
            "subAccountID": "",
            "instanceID": "",
            "shootName": "",
            "servicePlanName": "",
            "region": ""
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_null_configuration_still_reaches_dependency_check() {
    let state = state(&["abc", "xyz"], fast_config());
    let (status, json) = post_run(state, nil_slice_payload(&["abc", "def"])).await;

    assert_eq!(status, StatusCode::PRECONDITION_REQUIRED);
    assert_eq!(
        json,
        json!({"dependencies": {"required": ["abc", "xyz"], "missing": ["xyz"]}})
    );
}

#[tokio::test]
async fn test_null_configuration_and_empty_profile_are_accepted() {
    let state = state(&["abc", "xyz"], fast_config());
    let (status, json) = post_run(state, nil_slice_payload(&["abc", "xyz"])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["correlationID"], "test-correlation-id");
}

#[tokio::test]
async fn test_missing_kubeconfig_returns_400() {
    let state = state(&[], fast_config());
    let mut req = request();
    req.kubeconfig.clear();

    let (status, json) = post_run(state.clone(), body(&req)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({"error": "kubeconfig is required"}));
    assert_eq!(state.pool.active_jobs(), 0);
}

#[tokio::test]
async fn test_malformed_json_returns_400() {
    let state = state(&[], fast_config());
    let (status, json) = post_run(state, "{\"component\": ".to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_accepted_request_returns_ack() {
    let state = state(&["abc"], fast_config());
    let (status, json) = post_run(state, body(&request())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["correlationID"], "test-correlation-id");
    assert!(json["jobId"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(matches!(
        json["status"].as_str(),
        Some("notstarted") | Some("running")
    ));
}

#[tokio::test]
async fn test_at_capacity_returns_429() {
    let config = WorkerPoolConfig {
        capacity: 1,
        ..fast_config()
    };
    let state = state(&[], config);

    let (first, _) = post_run(state.clone(), body(&request())).await;
    let (second, json) = post_run(state, body(&request())).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert!(json["error"].as_str().unwrap().contains("capacity"));
}

#[tokio::test]
async fn test_shutting_down_returns_503() {
    let state = state(&[], fast_config());
    state.pool.shutdown(Duration::from_millis(10)).await;

    let (status, _) = post_run(state, body(&request())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_health_endpoint() {
    let state = state(&[], fast_config());
    let response = router(state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["healthy"], true);
    assert_eq!(json["capacity"], 2);
    assert_eq!(json["activeJobs"], 0);
}

async fn wait_for_terminal_callback(server: &MockServer) -> Value {
    for _ in 0..200 {
        let bodies: Vec<Value> = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect();
        if let Some(last) = bodies.last()
            && matches!(last["status"].as_str(), Some("success" | "error" | "failed"))
        {
            return last.clone();
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("no terminal callback received");
}

async fn start_runtime(cluster: Arc<MockClusterClient>, progress_timeout: Duration) -> ReconcilerRuntime {
    let action = ReadinessAction::parse("pod/component-1-0").unwrap();
    ReconcilerRuntime::builder()
        .component(COMPONENT)
        .registry(ActionRegistry::new().with(COMPONENT, Arc::new(action)))
        .connector(Arc::new(MockConnector::new(cluster)))
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .pool_config(WorkerPoolConfig {
            progress: ProgressConfig {
                interval: Duration::from_millis(10),
                timeout: progress_timeout,
            },
            ..fast_config()
        })
        .shutdown_grace(Duration::from_secs(1))
        .build()
        .unwrap()
        .start()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_install_reaches_success_once_pod_is_ready() {
    let callbacks = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&callbacks)
        .await;

    let cluster = Arc::new(MockClusterClient::new());
    cluster
        .script(
            ResourceKind::Pod,
            "inttest-comprecon",
            "component-1-0",
            [
                ResourceState::Absent,
                ResourceState::NotReady,
                ResourceState::Ready,
            ],
        )
        .await;
    let runtime = start_runtime(cluster.clone(), Duration::from_secs(2)).await;

    let mut req = request();
    req.callback_url = Some(format!("{}/callback", callbacks.uri()));
    let response = reqwest::Client::new()
        .post(format!("http://{}/v1/run", runtime.bind_addr()))
        .json(&req)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let last = wait_for_terminal_callback(&callbacks).await;
    assert_eq!(last, json!({"status": "success", "error": null}));
    assert!(cluster.lookups() >= 3);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_readiness_timeout_reports_error() {
    let callbacks = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&callbacks)
        .await;

    // The pod never becomes ready.
    let cluster = Arc::new(MockClusterClient::new());
    cluster
        .script(
            ResourceKind::Pod,
            "inttest-comprecon",
            "component-1-0",
            [ResourceState::NotReady],
        )
        .await;
    let runtime = start_runtime(cluster, Duration::from_millis(200)).await;

    let mut req = request();
    req.callback_url = Some(format!("{}/callback", callbacks.uri()));
    let response = reqwest::Client::new()
        .post(format!("http://{}/v1/run", runtime.bind_addr()))
        .json(&req)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let last = wait_for_terminal_callback(&callbacks).await;
    assert_eq!(last["status"], "error");
    assert!(last["error"].as_str().unwrap().contains("timed out"));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_delete_removes_resources() {
    let cluster = Arc::new(MockClusterClient::new());
    cluster
        .script(
            ResourceKind::Pod,
            "inttest-comprecon",
            "component-1-0",
            [ResourceState::Ready, ResourceState::Absent],
        )
        .await;
    let action = ReadinessAction::parse("pod/component-1-0").unwrap();
    let pool = component_reconciler::worker_pool::WorkerPool::new(
        fast_config(),
        ActionRegistry::new().with(COMPONENT, Arc::new(action)),
        Arc::new(MockConnector::new(cluster.clone())),
    );
    let recorder = Recorder::new();
    let mut req = request();
    req.operation = Some("delete".into());
    req.callback_func = Some(recorder.callback());

    let mut handle = pool
        .submit(component_reconciler::validation::validate(req).unwrap())
        .unwrap();

    assert_eq!(
        handle.finished().await,
        component_reconciler::status::Status::Success
    );
    assert_eq!(
        cluster.deleted().await,
        vec![(
            ResourceKind::Pod,
            "inttest-comprecon".to_string(),
            "component-1-0".to_string()
        )]
    );
}
