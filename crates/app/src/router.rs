use std::{any::Any, sync::Arc};

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::error;

use crate::dispatch::{RelayDispatcher, RunLoopState};
use crate::reply::StatusReply;
use crate::{telemetry, webhook};

/// GitHub caps webhook payloads at 25 MB.
const WEBHOOK_BODY_LIMIT: usize = 25 * 1024 * 1024;

/// Everything a request handler may touch, built once in `main`.
#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    webhook_secret: Arc<str>,
    dispatcher: RelayDispatcher,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        webhook_secret: Arc<str>,
        dispatcher: RelayDispatcher,
    ) -> Self {
        Self {
            metrics,
            webhook_secret,
            dispatcher,
        }
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    pub fn dispatcher(&self) -> &RelayDispatcher {
        &self.dispatcher
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route(
            "/webhook",
            post(webhook::handle).layer(DefaultBodyLimit::max(WEBHOOK_BODY_LIMIT)),
        )
        .layer(CatchPanicLayer::custom(panic_reply))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let run_loop = state.dispatcher().state();
    let status = match run_loop {
        RunLoopState::Ready => StatusCode::OK,
        RunLoopState::Connecting | RunLoopState::Stopped => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = json!({
        "run_loop": run_loop.as_str(),
        "queue_depth": state.dispatcher().queue_depth(),
        "scheduled_total": state.dispatcher().scheduled_total(),
    });
    (status, Json(body))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = telemetry::render_metrics(state.metrics());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(body))
        .unwrap()
}

fn panic_reply(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    error!(stage = "ingress", panic = %detail, "request handler panicked");
    StatusReply::error().into_response()
}
