//! Thin `axum` transport over the Metrics API Surface and health probes.
//! Contains no business logic beyond argument extraction and status-code
//! mapping; everything else belongs to [`super::MetricsSurface`].

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::error::Error;
use crate::health;
use crate::scraper::ScraperManager;
use crate::store::Store;

use super::MetricsSurface;

#[derive(Clone)]
pub struct AppState {
    pub surface: Arc<MetricsSurface>,
    pub store: Arc<Store>,
    pub scraper: Arc<ScraperManager>,
    pub resolution: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/apis/metrics.k8s.io/v1beta1/nodes", get(list_nodes))
        .route("/apis/metrics.k8s.io/v1beta1/nodes/:name", get(get_node))
        .route("/apis/metrics.k8s.io/v1beta1/namespaces/:ns/pods", get(list_namespaced_pods))
        .route("/apis/metrics.k8s.io/v1beta1/pods", get(list_all_pods))
        .route("/apis/metrics.k8s.io/v1beta1/namespaces/:ns/pods/:name", get(get_pod))
        .route("/healthz/metric-storage-ready", get(readiness))
        .route("/healthz/metric-collection-timely", get(liveness))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SelectorQuery {
    #[serde(rename = "labelSelector")]
    label_selector: Option<String>,
}

async fn list_nodes(State(state): State<AppState>, Query(q): Query<SelectorQuery>) -> Response {
    Json(state.surface.list_node_metrics(q.label_selector.as_deref())).into_response()
}

async fn get_node(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.surface.get_node_metrics(&name) {
        Ok(item) => Json(item).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_namespaced_pods(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Query(q): Query<SelectorQuery>,
) -> Response {
    Json(state.surface.list_pod_metrics(Some(&namespace), q.label_selector.as_deref())).into_response()
}

async fn list_all_pods(State(state): State<AppState>, Query(q): Query<SelectorQuery>) -> Response {
    Json(state.surface.list_pod_metrics(None, q.label_selector.as_deref())).into_response()
}

async fn get_pod(State(state): State<AppState>, Path((namespace, name)): Path<(String, String)>) -> Response {
    match state.surface.get_pod_metrics(&namespace, &name) {
        Ok(item) => Json(item).into_response(),
        Err(e) => error_response(e),
    }
}

async fn readiness(State(state): State<AppState>) -> Response {
    if state.store.ready() {
        (StatusCode::OK, "metric storage ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "metric storage not ready yet").into_response()
    }
}

async fn liveness(State(state): State<AppState>) -> Response {
    if health::collection_is_timely(state.scraper.last_tick_age(), state.resolution) {
        (StatusCode::OK, "metric collection timely").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "metric collection stalled").into_response()
    }
}

/// Maps the not-found / not-ready-yet error kinds onto the aggregated
/// API's standard envelope; everything else is an operator-facing bug.
fn error_response(err: Error) -> Response {
    match err {
        Error::EntityUnknown { kind, name } => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "reason": "NotFound", "message": format!("{kind} {name} not found") })),
        )
            .into_response(),
        Error::NotReadyYet { kind, name } => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "reason": "NotReady", "message": format!("{kind} {name} has no samples yet") })),
        )
            .into_response(),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "reason": "InternalError", "message": other.to_string() })),
        )
            .into_response(),
    }
}
