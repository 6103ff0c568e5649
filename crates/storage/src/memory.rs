//! In-memory store for tests and stateless deployments.
//!
//! A single RW-lock over a map: reads take the read lock, mutation and LRU
//! eviction happen under the write lock. Recency is stamped with an atomic
//! counter so reads stay on the read lock.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use config::MemoryStorageConfig;
use context::RequestContext;
use protocol::{Item, MAX_CHAIN_DEPTH};
use tokio::sync::RwLock;

use crate::{ListFilter, Page, ResponseRecord, ResponseStore, StoreError, tenant_visible};

struct StoredRecord {
    record: ResponseRecord,
    deleted_at: Option<u64>,
    /// Creation order tiebreaker for same-second listings.
    seq: u64,
    last_access: AtomicU64,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, StoredRecord>,
}

/// Map-backed [`ResponseStore`] with optional LRU eviction.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    max_responses: Option<usize>,
    max_chain_depth: usize,
    clock: AtomicU64,
}

impl MemoryStore {
    pub fn new(config: &MemoryStorageConfig) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_responses: config.max_responses,
            max_chain_depth: MAX_CHAIN_DEPTH,
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn evict_locked(&self, inner: &mut Inner) {
        let Some(max) = self.max_responses else {
            return;
        };

        while inner.records.len() > max {
            let Some(oldest) = inner
                .records
                .iter()
                .min_by_key(|(_, stored)| stored.last_access.load(Ordering::Relaxed))
                .map(|(id, _)| id.clone())
            else {
                return;
            };

            log::debug!("evicting response {oldest} from the in-memory store");
            inner.records.remove(&oldest);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(&MemoryStorageConfig::default())
    }
}

#[async_trait]
impl ResponseStore for MemoryStore {
    async fn save_response(&self, ctx: &RequestContext, record: ResponseRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.records.get(&record.response.id) {
            if !tenant_visible(ctx.tenant(), existing.record.response.tenant.as_deref()) {
                return Err(StoreError::NotFound);
            }

            // Idempotent on id: an identical re-save is a no-op, anything
            // else against a terminal row is a conflict.
            if existing.record.response.is_terminal() {
                if existing.record == record {
                    return Ok(());
                }

                return Err(StoreError::Conflict(record.response.id.clone()));
            }
        }

        let now = self.tick();
        let id = record.response.id.clone();
        let seq = inner.records.get(&id).map(|stored| stored.seq).unwrap_or(now);

        inner.records.insert(
            id,
            StoredRecord {
                record,
                deleted_at: None,
                seq,
                last_access: AtomicU64::new(now),
            },
        );

        self.evict_locked(&mut inner);
        Ok(())
    }

    async fn get_response(&self, ctx: &RequestContext, id: &str) -> Result<ResponseRecord, StoreError> {
        let inner = self.inner.read().await;

        let stored = inner.records.get(id).ok_or(StoreError::NotFound)?;

        if !tenant_visible(ctx.tenant(), stored.record.response.tenant.as_deref()) || stored.deleted_at.is_some() {
            return Err(StoreError::NotFound);
        }

        stored.last_access.store(self.tick(), Ordering::Relaxed);
        Ok(stored.record.clone())
    }

    async fn delete_response(&self, ctx: &RequestContext, id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        let stored = inner.records.get_mut(id).ok_or(StoreError::NotFound)?;

        if !tenant_visible(ctx.tenant(), stored.record.response.tenant.as_deref()) || stored.deleted_at.is_some() {
            return Err(StoreError::NotFound);
        }

        stored.deleted_at = Some(self.tick());
        Ok(())
    }

    async fn build_context(
        &self,
        ctx: &RequestContext,
        previous_response_id: &str,
    ) -> Result<Vec<Item>, StoreError> {
        let inner = self.inner.read().await;

        // Walk towards the root, newest first, bounded by the depth limit.
        let mut lineage = Vec::new();
        let mut cursor = Some(previous_response_id.to_string());

        while let Some(id) = cursor {
            if lineage.len() >= self.max_chain_depth {
                break;
            }

            let Some(stored) = inner.records.get(&id) else {
                if lineage.is_empty() {
                    return Err(StoreError::NotFound);
                }

                break;
            };

            if !tenant_visible(ctx.tenant(), stored.record.response.tenant.as_deref()) {
                if lineage.is_empty() {
                    return Err(StoreError::NotFound);
                }

                break;
            }

            cursor = stored.record.response.previous_response_id.clone();
            lineage.push(stored);
        }

        let mut items = Vec::new();

        for stored in lineage.into_iter().rev() {
            if stored.deleted_at.is_some() {
                continue;
            }

            items.extend(stored.record.input.iter().cloned());
            items.extend(stored.record.response.output.iter().cloned());
        }

        Ok(items)
    }

    async fn list_responses(&self, ctx: &RequestContext, filter: &ListFilter) -> Result<Page, StoreError> {
        let inner = self.inner.read().await;

        let mut visible: Vec<&StoredRecord> = inner
            .records
            .values()
            .filter(|stored| stored.deleted_at.is_none())
            .filter(|stored| tenant_visible(ctx.tenant(), stored.record.response.tenant.as_deref()))
            .filter(|stored| {
                filter
                    .model
                    .as_ref()
                    .is_none_or(|model| &stored.record.response.model == model)
            })
            .collect();

        // Newest first.
        visible.sort_by(|a, b| {
            (b.record.response.created_at, b.seq).cmp(&(a.record.response.created_at, a.seq))
        });

        let start = match &filter.after {
            Some(after) => match visible.iter().position(|stored| &stored.record.response.id == after) {
                Some(pos) => pos + 1,
                None => return Err(StoreError::NotFound),
            },
            None => 0,
        };

        let limit = filter.effective_limit();
        let page: Vec<_> = visible
            .iter()
            .skip(start)
            .take(limit)
            .map(|stored| stored.record.response.clone())
            .collect();
        let has_more = visible.len() > start + page.len();

        Ok(Page { data: page, has_more })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use protocol::{CreateResponseRequest, Response, ResponseStatus};

    use super::*;

    fn ctx(tenant: Option<&str>) -> RequestContext {
        RequestContext {
            request_id: "req".to_string(),
            identity: tenant.map(|t| context::Identity {
                subject: "tester".to_string(),
                tenant: Some(t.to_string()),
                ..Default::default()
            }),
        }
    }

    fn completed_record(model: &str, tenant: Option<&str>, previous: Option<&str>) -> ResponseRecord {
        let request = CreateResponseRequest::user_text(model, "hi");
        let mut response = Response::from_request(&request, tenant.map(str::to_string));
        response.previous_response_id = previous.map(str::to_string);
        response.transition(ResponseStatus::InProgress).unwrap();
        response.output.push(Item::assistant_text("hello"));
        response.transition(ResponseStatus::Completed).unwrap();

        ResponseRecord::new(response, vec![Item::user_text("hi")])
    }

    #[tokio::test]
    async fn save_and_get_round_trip() {
        let store = MemoryStore::default();
        let record = completed_record("m", None, None);
        let id = record.response.id.clone();

        store.save_response(&ctx(None), record.clone()).await.unwrap();
        let fetched = store.get_response(&ctx(None), &id).await.unwrap();

        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn idempotent_save_conflicts_on_mutation() {
        let store = MemoryStore::default();
        let record = completed_record("m", None, None);

        store.save_response(&ctx(None), record.clone()).await.unwrap();
        // Identical re-save is fine.
        store.save_response(&ctx(None), record.clone()).await.unwrap();

        let mut mutated = record.clone();
        mutated.response.output.push(Item::assistant_text("more"));

        let err = store.save_response(&ctx(None), mutated).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn cross_tenant_reads_are_not_found() {
        let store = MemoryStore::default();
        let record = completed_record("m", Some("tenant-a"), None);
        let id = record.response.id.clone();

        store.save_response(&ctx(Some("tenant-a")), record).await.unwrap();

        let err = store.get_response(&ctx(Some("tenant-b")), &id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));

        // Unscoped deployment sees everything.
        store.get_response(&ctx(None), &id).await.unwrap();
    }

    #[tokio::test]
    async fn soft_delete_hides_but_preserves_chain() {
        let store = MemoryStore::default();

        let first = completed_record("m", None, None);
        let first_id = first.response.id.clone();
        store.save_response(&ctx(None), first).await.unwrap();

        let second = completed_record("m", None, Some(&first_id));
        let second_id = second.response.id.clone();
        store.save_response(&ctx(None), second).await.unwrap();

        store.delete_response(&ctx(None), &first_id).await.unwrap();

        let err = store.get_response(&ctx(None), &first_id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));

        // The deleted ancestor contributes nothing but traversal continues.
        let items = store.build_context(&ctx(None), &second_id).await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn build_context_flattens_input_then_output() {
        let store = MemoryStore::default();

        let first = completed_record("m", None, None);
        let first_id = first.response.id.clone();
        store.save_response(&ctx(None), first).await.unwrap();

        let second = completed_record("m", None, Some(&first_id));
        let second_id = second.response.id.clone();
        store.save_response(&ctx(None), second).await.unwrap();

        let items = store.build_context(&ctx(None), &second_id).await.unwrap();

        // [u1, a1, u2, a2] in chronological order.
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].as_message().unwrap().role, protocol::Role::User);
        assert_eq!(items[1].as_message().unwrap().role, protocol::Role::Assistant);
        assert_eq!(items[2].as_message().unwrap().role, protocol::Role::User);
        assert_eq!(items[3].as_message().unwrap().role, protocol::Role::Assistant);
    }

    #[tokio::test]
    async fn build_context_unknown_head_is_not_found() {
        let store = MemoryStore::default();
        let err = store
            .build_context(&ctx(None), "resp_AAAAAAAAAAAAAAAAAAAAAAAA")
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn list_paginates_newest_first() {
        let store = MemoryStore::default();
        let mut ids = Vec::new();

        for _ in 0..5 {
            let record = completed_record("m", None, None);
            ids.push(record.response.id.clone());
            store.save_response(&ctx(None), record).await.unwrap();
        }

        let first_page = store
            .list_responses(
                &ctx(None),
                &ListFilter {
                    limit: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(first_page.data.len(), 2);
        assert!(first_page.has_more);

        let second_page = store
            .list_responses(
                &ctx(None),
                &ListFilter {
                    limit: 10,
                    after: first_page.last_id().map(str::to_string),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(second_page.data.len(), 3);
        assert!(!second_page.has_more);
    }

    #[tokio::test]
    async fn list_filters_by_model() {
        let store = MemoryStore::default();
        store
            .save_response(&ctx(None), completed_record("alpha", None, None))
            .await
            .unwrap();
        store
            .save_response(&ctx(None), completed_record("beta", None, None))
            .await
            .unwrap();

        let page = store
            .list_responses(
                &ctx(None),
                &ListFilter {
                    model: Some("alpha".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].model, "alpha");
    }

    #[tokio::test]
    async fn lru_eviction_respects_capacity() {
        let store = MemoryStore::new(&MemoryStorageConfig { max_responses: Some(2) });
        let mut ids = Vec::new();

        for _ in 0..3 {
            let record = completed_record("m", None, None);
            ids.push(record.response.id.clone());
            store.save_response(&ctx(None), record).await.unwrap();
        }

        // The first insert is the least recently used.
        let err = store.get_response(&ctx(None), &ids[0]).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));

        store.get_response(&ctx(None), &ids[1]).await.unwrap();
        store.get_response(&ctx(None), &ids[2]).await.unwrap();
    }
}
