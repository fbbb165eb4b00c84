// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP server for the reconciler.
//!
//! Routes:
//! - `POST /v1/run` - submit a reconciliation request
//! - `GET /health` - liveness and pool usage

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::handlers::{
    DependencyResponse, ErrorResponse, HealthCheckResponse, ReconcilerState, RunAcceptedResponse,
    RunOutcome, handle_health_check, handle_run,
};
use crate::model::ReconciliationRequest;

/// Build the reconciler router.
pub fn router(state: Arc<ReconcilerState>) -> Router {
    Router::new()
        .route("/v1/run", post(run))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for RunOutcome {
    fn into_response(self) -> Response {
        match self {
            RunOutcome::Accepted(handle) => {
                (StatusCode::OK, Json(RunAcceptedResponse::from(&handle))).into_response()
            }
            RunOutcome::MissingDependencies(dependencies) => (
                StatusCode::PRECONDITION_REQUIRED,
                Json(DependencyResponse { dependencies }),
            )
                .into_response(),
            RunOutcome::BadRequest(error) => error_response(StatusCode::BAD_REQUEST, error),
            RunOutcome::AtCapacity(error) => error_response(StatusCode::TOO_MANY_REQUESTS, error),
            RunOutcome::Unavailable(error) => {
                error_response(StatusCode::SERVICE_UNAVAILABLE, error)
            }
        }
    }
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

async fn run(
    State(state): State<Arc<ReconcilerState>>,
    payload: Result<Json<ReconciliationRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(request)) => handle_run(&state, request).into_response(),
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Malformed run request");
            error_response(StatusCode::BAD_REQUEST, rejection.body_text())
        }
    }
}

async fn health(State(state): State<Arc<ReconcilerState>>) -> Json<HealthCheckResponse> {
    Json(handle_health_check(&state))
}

/// Serve `router(state)` on `listener` until `shutdown_rx` turns `true`.
pub async fn run_server_with_shutdown(
    listener: TcpListener,
    state: Arc<ReconcilerState>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
