//! Liveness and readiness endpoints.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::dependency::Handles;

/// Upper bound for a single dependency probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
struct DependencyStatus {
    name: String,
    ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct Readiness {
    ready: bool,
    dependencies: Vec<DependencyStatus>,
}

/// Default application routes: `/healthz` and `/readyz`.
pub fn routes(handles: Handles) -> Router {
    Router::new()
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .with_state(handles)
}

async fn liveness() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn readiness(State(handles): State<Handles>) -> impl IntoResponse {
    let mut dependencies = Vec::with_capacity(handles.len());

    for handle in handles.iter() {
        let error = match tokio::time::timeout(PROBE_TIMEOUT, handle.ping()).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("no answer within {:?}", PROBE_TIMEOUT)),
        };
        if let Some(error) = &error {
            tracing::warn!(dependency = handle.name(), error = %error, "Readiness probe failed");
        }
        dependencies.push(DependencyStatus {
            name: handle.name().to_string(),
            ready: error.is_none(),
            error,
        });
    }

    let ready = dependencies.iter().all(|d| d.ready);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(Readiness { ready, dependencies }))
}
