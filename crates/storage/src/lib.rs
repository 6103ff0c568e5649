//! Response persistence.
//!
//! A [`ResponseStore`] owns persisted responses after `save_response`
//! returns: it reconstructs `previous_response_id` chains, soft-deletes
//! without breaking chain links, and scopes every read and write by the
//! tenant carried on the request context. Cross-tenant references surface as
//! [`StoreError::NotFound`], never as a forbidden error, so existence cannot
//! leak across tenants.

mod memory;
mod postgres;

use async_trait::async_trait;
use context::RequestContext;
use protocol::{Item, Response};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Storage-layer failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The response does not exist for this tenant.
    #[error("response not found")]
    NotFound,
    /// An attempt was made to mutate a terminal response.
    #[error("response {0} is terminal and cannot be modified")]
    Conflict(String),
    /// The backend itself failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for protocol::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => protocol::Error::not_found("response not found"),
            StoreError::Conflict(id) => {
                protocol::Error::server_error(format!("response {id} is terminal and cannot be modified"))
                    .with_code("conflict")
            }
            StoreError::Backend(message) => protocol::Error::server_error(message),
        }
    }
}

/// A persisted response together with the input items that produced it.
/// `build_context` replays ancestors as input followed by output.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    pub response: Response,
    pub input: Vec<Item>,
}

impl ResponseRecord {
    pub fn new(response: Response, input: Vec<Item>) -> Self {
        Self { response, input }
    }
}

/// Filter and cursor for `list_responses`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Only responses produced by this model.
    pub model: Option<String>,
    /// Page size; zero falls back to the default of 20.
    pub limit: usize,
    /// Cursor: return responses created strictly after this id, in listing
    /// order (newest first).
    pub after: Option<String>,
}

impl ListFilter {
    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 { 20 } else { self.limit }
    }
}

/// One page of a response listing, newest first.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub data: Vec<Response>,
    pub has_more: bool,
}

impl Page {
    pub fn first_id(&self) -> Option<&str> {
        self.data.first().map(|r| r.id.as_str())
    }

    pub fn last_id(&self) -> Option<&str> {
        self.data.last().map(|r| r.id.as_str())
    }
}

/// The persistence contract consumed by the engine and the transport.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Atomically persist a response and its input. Idempotent on the
    /// response id; re-saving a terminal response with different content
    /// fails with [`StoreError::Conflict`].
    async fn save_response(&self, ctx: &RequestContext, record: ResponseRecord) -> Result<(), StoreError>;

    /// Fetch a response by id, tenant-scoped. Soft-deleted responses are
    /// not returned.
    async fn get_response(&self, ctx: &RequestContext, id: &str) -> Result<ResponseRecord, StoreError>;

    /// Soft-delete: the row is marked and hidden from reads but keeps its
    /// `previous_response_id` edge for chain traversal.
    async fn delete_response(&self, ctx: &RequestContext, id: &str) -> Result<(), StoreError>;

    /// Recursively follow `previous_response_id` from `previous_response_id`
    /// and return each ancestor's input then output in chronological order,
    /// clipped at the configured depth. Soft-deleted ancestors contribute no
    /// items but their chain edge is still followed.
    async fn build_context(&self, ctx: &RequestContext, previous_response_id: &str)
    -> Result<Vec<Item>, StoreError>;

    /// Cursor-paginated listing ordered by creation time, newest first.
    async fn list_responses(&self, ctx: &RequestContext, filter: &ListFilter) -> Result<Page, StoreError>;

    /// Readiness probe for the backing store.
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Whether a record with `record_tenant` is visible to a request scoped to
/// `ctx_tenant`. An unauthenticated deployment (no tenant) sees everything.
pub(crate) fn tenant_visible(ctx_tenant: Option<&str>, record_tenant: Option<&str>) -> bool {
    match ctx_tenant {
        None => true,
        Some(tenant) => record_tenant == Some(tenant),
    }
}
