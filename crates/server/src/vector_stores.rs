//! The vector-store management surface.
//!
//! Surface only: stores are registered and listed here, while embedding and
//! search live in an external backend. Kept in memory.

use std::{collections::HashMap, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ApiError;

#[derive(Clone, Default)]
pub(crate) struct VectorStores {
    inner: Arc<RwLock<HashMap<String, VectorStore>>>,
}

#[derive(Debug, Clone, Serialize)]
struct VectorStore {
    id: String,
    object: &'static str,
    name: String,
    created_at: u64,
}

#[derive(Debug, Deserialize)]
struct CreateVectorStore {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct VectorStoreList {
    object: &'static str,
    data: Vec<VectorStore>,
    has_more: bool,
}

#[derive(Debug, Serialize)]
struct Deleted {
    id: String,
    object: &'static str,
    deleted: bool,
}

pub(crate) fn router() -> Router {
    Router::new()
        .route("/v1/vector_stores", post(create).get(list))
        .route("/v1/vector_stores/{id}", get(fetch).delete(delete))
        .with_state(VectorStores::default())
}

async fn create(State(stores): State<VectorStores>, Json(request): Json<CreateVectorStore>) -> Response {
    let id = format!("vs_{}", uuid::Uuid::new_v4().simple());

    let store = VectorStore {
        id: id.clone(),
        object: "vector_store",
        name: request.name.unwrap_or_else(|| "untitled".to_string()),
        created_at: std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    };

    stores.inner.write().await.insert(id, store.clone());

    Json(store).into_response()
}

async fn list(State(stores): State<VectorStores>) -> Response {
    let mut data: Vec<VectorStore> = stores.inner.read().await.values().cloned().collect();
    data.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Json(VectorStoreList {
        object: "list",
        data,
        has_more: false,
    })
    .into_response()
}

async fn fetch(State(stores): State<VectorStores>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let stores = stores.inner.read().await;

    let store = stores
        .get(&id)
        .ok_or_else(|| ApiError(protocol::Error::not_found("vector store not found")))?;

    Ok(Json(store.clone()).into_response())
}

async fn delete(State(stores): State<VectorStores>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let removed = stores.inner.write().await.remove(&id);

    if removed.is_none() {
        return Err(ApiError(protocol::Error::not_found("vector store not found")));
    }

    Ok(Json(Deleted {
        id,
        object: "vector_store.deleted",
        deleted: true,
    })
    .into_response())
}
