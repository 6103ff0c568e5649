//! The `/v1/responses` surface.

use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use context::RequestContext;
use engine::Engine;
use protocol::CreateResponseRequest;
use serde::{Deserialize, Serialize};
use storage::{ListFilter, ResponseStore};
use tokio_util::sync::CancellationToken;

use crate::{error::ApiError, sse};

#[derive(Clone)]
pub(crate) struct AppState {
    pub engine: Engine,
    pub store: Option<Arc<dyn ResponseStore>>,
}

impl AppState {
    fn store(&self) -> Result<&Arc<dyn ResponseStore>, ApiError> {
        self.store
            .as_ref()
            .ok_or_else(|| ApiError(protocol::Error::invalid_request("store", "storage is not configured")))
    }
}

/// `POST /v1/responses`: run the loop, streaming over SSE when requested.
/// The body is parsed by hand so malformed payloads surface as the wire
/// error shape instead of the framework default.
pub(crate) async fn create_response(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: CreateResponseRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError(protocol::Error::new(protocol::ErrorKind::InvalidRequest, format!("invalid request body: {e}"))))?;

    log::debug!(
        "create response for model {} ({} input items, stream={})",
        request.model,
        request.input.len(),
        request.stream()
    );

    let cancel = CancellationToken::new();

    if request.stream() {
        let stream = state.engine.stream(request, &ctx, cancel).await?;
        Ok(sse::into_sse(stream).into_response())
    } else {
        let response = state.engine.run(request, &ctx, cancel).await?;
        Ok(Json(response).into_response())
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListPage<T: Serialize> {
    object: &'static str,
    data: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_id: Option<String>,
    has_more: bool,
}

/// `GET /v1/responses`: cursor-paginated listing, newest first.
pub(crate) async fn list_responses(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let filter = ListFilter {
        model: query.model,
        limit: query.limit.unwrap_or(0),
        after: query.after,
    };

    let page = state.store()?.list_responses(&ctx, &filter).await?;

    let body = ListPage {
        object: "list",
        first_id: page.first_id().map(str::to_string),
        last_id: page.last_id().map(str::to_string),
        has_more: page.has_more,
        data: page.data,
    };

    Ok(Json(body).into_response())
}

/// `GET /v1/responses/{id}`.
pub(crate) async fn get_response(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let record = state.store()?.get_response(&ctx, &id).await?;
    Ok(Json(record.response).into_response())
}

#[derive(Debug, Serialize)]
struct Deleted {
    id: String,
    object: &'static str,
    deleted: bool,
}

/// `DELETE /v1/responses/{id}`: soft delete.
pub(crate) async fn delete_response(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    state.store()?.delete_response(&ctx, &id).await?;

    Ok(Json(Deleted {
        id,
        object: "response.deleted",
        deleted: true,
    })
    .into_response())
}

/// `GET /v1/responses/{id}/input_items`.
pub(crate) async fn list_input_items(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let record = state.store()?.get_response(&ctx, &id).await?;

    let body = ListPage {
        object: "list",
        first_id: record.input.first().map(|item| item.id.clone()),
        last_id: record.input.last().map(|item| item.id.clone()),
        has_more: false,
        data: record.input,
    };

    Ok(Json(body).into_response())
}

/// `GET /v1/models`: aggregated across providers.
pub(crate) async fn list_models(State(state): State<AppState>) -> Response {
    let models = state.engine.list_models().await;

    Json(ListPage {
        object: "list",
        first_id: None,
        last_id: None,
        has_more: false,
        data: models,
    })
    .into_response()
}
