/*
 *  Copyright 2025-2026 Courier Contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! HTTP gateway routes.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use courier::{NotificationRequest, Submitter};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub submitter: Submitter,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Debug, Serialize)]
struct Accepted {
    id: Uuid,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/notifications", post(create_notification))
        .route("/notification", post(create_notification))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

/// `POST /notifications`, also served as `POST /notification`.
///
/// The body is decoded by hand so that every malformed request is a 400,
/// whatever its content type.
async fn create_notification(State(state): State<AppState>, body: Bytes) -> Response {
    let request: NotificationRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected notification request: {}", e);
            return error_response(StatusCode::BAD_REQUEST, format!("invalid request body: {e}"));
        }
    };

    match state.submitter.submit(request).await {
        Ok(id) => (StatusCode::CREATED, Json(Accepted { id })).into_response(),
        Err(e) if e.is_client_error() => {
            warn!("Rejected notification request: {}", e);
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            error!("Failed to submit notification: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
