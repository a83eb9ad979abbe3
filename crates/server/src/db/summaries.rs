use std::future::Future;

use deadpool_postgres::Pool;
use tokio_postgres::Row;
use tokio_postgres::error::SqlState;
use uuid::Uuid;

use discharge_core::{CacheKey, Page, StoreError, Summary, SummaryStatus};

const SUMMARY_COLUMNS: &str = "id, hadm_id, cache_key, status, summary_text, error_detail, \
     model, original_length, processing_time, created_at";

/// The narrow store interface the generation coordinator depends on.
///
/// The Postgres repository implements it for production; tests drive the
/// coordinator against an in-memory implementation instead.
pub trait SummaryStore: Send + Sync + 'static {
    /// Latest `completed` summary for the key, if any.
    fn find_completed(
        &self,
        key: &CacheKey,
    ) -> impl Future<Output = Result<Option<Summary>, StoreError>> + Send;

    /// Append one summary row. Fails with `StoreError::Duplicate` on id
    /// collision; rows are never updated in place.
    fn insert(&self, summary: &Summary) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Repository for generated summaries.
#[derive(Clone)]
pub struct SummaryRepository {
    pool: Pool,
}

impl SummaryRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Database(format!("pool error: {}", e)))
    }

    /// Get a summary by its id
    pub async fn get(&self, id: Uuid) -> Result<Option<Summary>, StoreError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!("SELECT {SUMMARY_COLUMNS} FROM ai_summaries WHERE id = $1"),
                &[&id],
            )
            .await
            .map_err(db_err)?;
        row.map(row_to_summary).transpose()
    }

    /// Latest completed summary for a cache key, or none.
    pub async fn find_completed(&self, key: &CacheKey) -> Result<Option<Summary>, StoreError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {SUMMARY_COLUMNS} FROM ai_summaries \
                     WHERE cache_key = $1 AND status = 'completed' \
                     ORDER BY created_at DESC, id DESC LIMIT 1"
                ),
                &[&key.as_str()],
            )
            .await
            .map_err(db_err)?;
        row.map(row_to_summary).transpose()
    }

    /// Global recency listing, newest first.
    pub async fn list_recent(&self, page: u32, page_size: u32) -> Result<Page<Summary>, StoreError> {
        self.list_page(None, page, page_size).await
    }

    /// Summaries for one admission, newest first.
    pub async fn list_by_patient(
        &self,
        hadm_id: i64,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Summary>, StoreError> {
        self.list_page(Some(hadm_id), page, page_size).await
    }

    async fn list_page(
        &self,
        hadm_id: Option<i64>,
        page: u32,
        page_size: u32,
    ) -> Result<Page<Summary>, StoreError> {
        let page = page.max(1);
        let client = self.client().await?;

        let where_clause = match hadm_id {
            Some(_) => " WHERE hadm_id = $1",
            None => "",
        };
        let offset = i64::from(page - 1) * i64::from(page_size);
        let limit = i64::from(page_size);

        // The id tiebreak keeps the ordering total, so pages stay disjoint
        // even when rows share a timestamp.
        let list_sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM ai_summaries{where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT {limit} OFFSET {offset}"
        );
        let count_sql = format!("SELECT COUNT(*) FROM ai_summaries{where_clause}");

        let (count_row, rows) = match hadm_id {
            Some(hadm_id) => (
                client
                    .query_one(&count_sql, &[&hadm_id])
                    .await
                    .map_err(db_err)?,
                client.query(&list_sql, &[&hadm_id]).await.map_err(db_err)?,
            ),
            None => (
                client.query_one(&count_sql, &[]).await.map_err(db_err)?,
                client.query(&list_sql, &[]).await.map_err(db_err)?,
            ),
        };

        let total: i64 = count_row.get(0);
        let items = rows
            .into_iter()
            .map(row_to_summary)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total: total as u64,
            page,
            page_size,
        })
    }

    /// Append one summary row
    pub async fn insert(&self, summary: &Summary) -> Result<(), StoreError> {
        let client = self.client().await?;
        let result = client
            .execute(
                &format!(
                    "INSERT INTO ai_summaries ({SUMMARY_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
                ),
                &[
                    &summary.id,
                    &summary.hadm_id,
                    &summary.cache_key.as_str(),
                    &summary.status.as_str(),
                    &summary.text,
                    &summary.error_detail,
                    &summary.model,
                    &summary.original_length,
                    &summary.processing_time,
                    &summary.created_at,
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if err.code() == Some(&SqlState::UNIQUE_VIOLATION) => Err(
                StoreError::Duplicate(format!("summary {} already exists", summary.id)),
            ),
            Err(err) => Err(db_err(err)),
        }
    }

    /// Delete a summary by id; returns whether a row was removed.
    pub async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let client = self.client().await?;
        let removed = client
            .execute("DELETE FROM ai_summaries WHERE id = $1", &[&id])
            .await
            .map_err(db_err)?;
        Ok(removed > 0)
    }

    /// Delete every summary for an admission; returns the removed count.
    pub async fn delete_by_patient(&self, hadm_id: i64) -> Result<u64, StoreError> {
        let client = self.client().await?;
        client
            .execute("DELETE FROM ai_summaries WHERE hadm_id = $1", &[&hadm_id])
            .await
            .map_err(db_err)
    }
}

impl SummaryStore for SummaryRepository {
    async fn find_completed(&self, key: &CacheKey) -> Result<Option<Summary>, StoreError> {
        SummaryRepository::find_completed(self, key).await
    }

    async fn insert(&self, summary: &Summary) -> Result<(), StoreError> {
        SummaryRepository::insert(self, summary).await
    }
}

fn db_err(err: tokio_postgres::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

fn row_to_summary(row: Row) -> Result<Summary, StoreError> {
    let status: String = row.get("status");
    let status = SummaryStatus::parse(&status)
        .ok_or_else(|| StoreError::Database(format!("unknown summary status '{}'", status)))?;
    let cache_key: String = row.get("cache_key");

    Ok(Summary {
        id: row.get("id"),
        hadm_id: row.get("hadm_id"),
        cache_key: CacheKey::from(cache_key),
        status,
        text: row.get("summary_text"),
        error_detail: row.get("error_detail"),
        model: row.get("model"),
        original_length: row.get("original_length"),
        processing_time: row.get("processing_time"),
        created_at: row.get("created_at"),
    })
}
