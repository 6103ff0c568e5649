//! Durable Postgres store.
//!
//! Responses and their input items live in JSONB columns; chain walking uses
//! a bounded recursive CTE over the `previous_response_id` column. The
//! response document carries a GIN index for administrative queries over
//! output and extension blobs.

use async_trait::async_trait;
use config::PostgresStorageConfig;
use context::RequestContext;
use protocol::{Item, MAX_CHAIN_DEPTH, Response};
use secrecy::ExposeSecret;
use sqlx::{PgPool, Row, postgres::PgPoolOptions};

use crate::{ListFilter, Page, ResponseRecord, ResponseStore, StoreError};

const MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS responses (
    id TEXT PRIMARY KEY,
    tenant TEXT,
    model TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at BIGINT NOT NULL,
    seq BIGSERIAL,
    previous_response_id TEXT,
    deleted_at BIGINT,
    response JSONB NOT NULL,
    input JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS responses_tenant_created_idx
    ON responses (tenant, created_at DESC, seq DESC);
CREATE INDEX IF NOT EXISTS responses_previous_idx
    ON responses (previous_response_id);
CREATE INDEX IF NOT EXISTS responses_document_gin_idx
    ON responses USING GIN (response);
"#;

/// Postgres-backed [`ResponseStore`].
pub struct PostgresStore {
    pool: PgPool,
    max_chain_depth: i64,
}

impl PostgresStore {
    /// Connect, bound the pool, and apply the schema migration.
    pub async fn connect(config: &PostgresStorageConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(config.url.expose_secret())
            .await
            .map_err(backend)?;

        for statement in MIGRATION.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&pool).await.map_err(backend)?;
        }

        Ok(Self {
            pool,
            max_chain_depth: MAX_CHAIN_DEPTH as i64,
        })
    }

    fn decode_record(response: serde_json::Value, input: serde_json::Value) -> Result<ResponseRecord, StoreError> {
        let mut response: Response = serde_json::from_value(response)
            .map_err(|e| StoreError::Backend(format!("corrupt response document: {e}")))?;
        let input: Vec<Item> = serde_json::from_value(input)
            .map_err(|e| StoreError::Backend(format!("corrupt input document: {e}")))?;

        // `tenant` is #[serde(skip)], restored from the column by callers.
        response.tenant = None;

        Ok(ResponseRecord::new(response, input))
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl ResponseStore for PostgresStore {
    async fn save_response(&self, ctx: &RequestContext, record: ResponseRecord) -> Result<(), StoreError> {
        let response_doc = serde_json::to_value(&record.response)
            .map_err(|e| StoreError::Backend(format!("failed to encode response: {e}")))?;
        let input_doc = serde_json::to_value(&record.input)
            .map_err(|e| StoreError::Backend(format!("failed to encode input: {e}")))?;

        let mut tx = self.pool.begin().await.map_err(backend)?;

        let existing = sqlx::query("SELECT tenant, status, response, input FROM responses WHERE id = $1 FOR UPDATE")
            .bind(&record.response.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?;

        if let Some(row) = existing {
            let tenant: Option<String> = row.try_get("tenant").map_err(backend)?;

            if !crate::tenant_visible(ctx.tenant(), tenant.as_deref()) {
                return Err(StoreError::NotFound);
            }

            let status: String = row.try_get("status").map_err(backend)?;
            let terminal = !matches!(status.as_str(), "queued" | "in_progress");

            if terminal {
                let stored_response: serde_json::Value = row.try_get("response").map_err(backend)?;
                let stored_input: serde_json::Value = row.try_get("input").map_err(backend)?;

                if stored_response == response_doc && stored_input == input_doc {
                    // Idempotent re-save of an identical terminal row.
                    return Ok(());
                }

                return Err(StoreError::Conflict(record.response.id.clone()));
            }
        }

        let status = serde_json::to_value(record.response.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "in_progress".to_string());

        sqlx::query(
            r#"
            INSERT INTO responses (id, tenant, model, status, created_at, previous_response_id, response, input)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status,
                response = EXCLUDED.response,
                input = EXCLUDED.input
            "#,
        )
        .bind(&record.response.id)
        .bind(record.response.tenant.as_deref())
        .bind(&record.response.model)
        .bind(&status)
        .bind(record.response.created_at as i64)
        .bind(record.response.previous_response_id.as_deref())
        .bind(&response_doc)
        .bind(&input_doc)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)
    }

    async fn get_response(&self, ctx: &RequestContext, id: &str) -> Result<ResponseRecord, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT tenant, response, input FROM responses
            WHERE id = $1
              AND deleted_at IS NULL
              AND ($2::text IS NULL OR tenant = $2)
            "#,
        )
        .bind(id)
        .bind(ctx.tenant())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound)?;

        let tenant: Option<String> = row.try_get("tenant").map_err(backend)?;
        let mut record = Self::decode_record(
            row.try_get("response").map_err(backend)?,
            row.try_get("input").map_err(backend)?,
        )?;
        record.response.tenant = tenant;

        Ok(record)
    }

    async fn delete_response(&self, ctx: &RequestContext, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE responses
            SET deleted_at = EXTRACT(EPOCH FROM NOW())::bigint
            WHERE id = $1
              AND deleted_at IS NULL
              AND ($2::text IS NULL OR tenant = $2)
            "#,
        )
        .bind(id)
        .bind(ctx.tenant())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn build_context(
        &self,
        ctx: &RequestContext,
        previous_response_id: &str,
    ) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query(
            r#"
            WITH RECURSIVE chain AS (
                SELECT id, previous_response_id, deleted_at, response, input, 0 AS depth
                FROM responses
                WHERE id = $1 AND ($2::text IS NULL OR tenant = $2)
                UNION ALL
                SELECT r.id, r.previous_response_id, r.deleted_at, r.response, r.input, c.depth + 1
                FROM responses r
                JOIN chain c ON r.id = c.previous_response_id
                WHERE c.depth + 1 < $3 AND ($2::text IS NULL OR r.tenant = $2)
            )
            SELECT deleted_at, response, input FROM chain ORDER BY depth DESC
            "#,
        )
        .bind(previous_response_id)
        .bind(ctx.tenant())
        .bind(self.max_chain_depth)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        if rows.is_empty() {
            return Err(StoreError::NotFound);
        }

        let mut items = Vec::new();

        for row in rows {
            let deleted_at: Option<i64> = row.try_get("deleted_at").map_err(backend)?;

            if deleted_at.is_some() {
                continue;
            }

            let record = Self::decode_record(
                row.try_get("response").map_err(backend)?,
                row.try_get("input").map_err(backend)?,
            )?;

            items.extend(record.input);
            items.extend(record.response.output);
        }

        Ok(items)
    }

    async fn list_responses(&self, ctx: &RequestContext, filter: &ListFilter) -> Result<Page, StoreError> {
        let limit = filter.effective_limit() as i64;

        // The cursor row anchors pagination by (created_at, seq).
        let rows = sqlx::query(
            r#"
            SELECT tenant, response, input FROM responses
            WHERE deleted_at IS NULL
              AND ($1::text IS NULL OR tenant = $1)
              AND ($2::text IS NULL OR model = $2)
              AND ($3::text IS NULL OR (created_at, seq) < (
                    SELECT created_at, seq FROM responses WHERE id = $3
              ))
            ORDER BY created_at DESC, seq DESC
            LIMIT $4 + 1
            "#,
        )
        .bind(ctx.tenant())
        .bind(filter.model.as_deref())
        .bind(filter.after.as_deref())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let has_more = rows.len() as i64 > limit;
        let mut data = Vec::with_capacity(rows.len().min(limit as usize));

        for row in rows.into_iter().take(limit as usize) {
            let tenant: Option<String> = row.try_get("tenant").map_err(backend)?;
            let mut record = Self::decode_record(
                row.try_get("response").map_err(backend)?,
                row.try_get("input").map_err(backend)?,
            )?;
            record.response.tenant = tenant;
            data.push(record.response);
        }

        Ok(Page { data, has_more })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(backend)?;
        Ok(())
    }
}
