//! Liveness and readiness probes.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use storage::ResponseStore;

#[derive(Clone)]
pub(crate) struct HealthState {
    pub store: Option<Arc<dyn ResponseStore>>,
    pub has_providers: bool,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

/// `GET /healthz`: the process is alive.
pub(crate) async fn healthz() -> Response {
    Json(Health { status: "ok" }).into_response()
}

/// `GET /readyz`: ready only when storage answers and an inference backend
/// is configured.
pub(crate) async fn readyz(State(state): State<HealthState>) -> Response {
    if !state.has_providers {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(Health { status: "no providers" })).into_response();
    }

    if let Some(store) = &state.store
        && let Err(err) = store.health_check().await
    {
        log::warn!("readiness probe failed against storage: {err}");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(Health { status: "storage unavailable" })).into_response();
    }

    Json(Health { status: "ready" }).into_response()
}
