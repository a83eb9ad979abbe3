mod patients;
mod summaries;

pub use patients::{PatientFilter, PatientRepository};
pub use summaries::{SummaryRepository, SummaryStore};

use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::NoTls;

use crate::error::AppError;

/// Create a connection pool from a database URL
pub async fn create_pool(database_url: &str) -> Result<Pool, deadpool_postgres::CreatePoolError> {
    let mut cfg = Config::new();
    cfg.url = Some(database_url.to_string());
    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
}

/// Create the service tables and indexes if they do not exist yet.
///
/// `ai_summaries` is append-only: rows are inserted by the generation
/// coordinator and only ever removed by the delete endpoints.
pub async fn init_schema(pool: &Pool) -> Result<(), AppError> {
    let client = pool.get().await?;
    client
        .batch_execute(
            r#"
            CREATE TABLE IF NOT EXISTS discharge_records (
                hadm_id              BIGINT PRIMARY KEY,
                subject_id           BIGINT NOT NULL,
                gender               TEXT NOT NULL,
                age                  INT,
                admission_type       TEXT NOT NULL,
                diagnosis            TEXT NOT NULL,
                hospital_expire_flag BOOLEAN NOT NULL DEFAULT FALSE,
                ed_los_hours         DOUBLE PRECISION,
                total_los_hours      DOUBLE PRECISION,
                charttime            TIMESTAMPTZ,
                category             TEXT NOT NULL,
                description          TEXT NOT NULL,
                text                 TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ai_summaries (
                id               UUID PRIMARY KEY,
                hadm_id          BIGINT NOT NULL,
                cache_key        TEXT NOT NULL,
                status           TEXT NOT NULL,
                summary_text     TEXT,
                error_detail     TEXT,
                model            TEXT NOT NULL,
                original_length  BIGINT NOT NULL,
                processing_time  DOUBLE PRECISION NOT NULL,
                created_at       TIMESTAMPTZ NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_ai_summaries_hadm_id
                ON ai_summaries (hadm_id, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_ai_summaries_cache_key
                ON ai_summaries (cache_key, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_ai_summaries_created_at
                ON ai_summaries (created_at DESC);
            "#,
        )
        .await?;
    Ok(())
}
