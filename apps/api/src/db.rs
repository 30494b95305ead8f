use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::models::job::OptimizationJobRow;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Read access to the job rows the optimization backend writes.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Returns the job if it exists and belongs to the user.
    async fn fetch_job(
        &self,
        job_id: &str,
        user_id: &str,
    ) -> Result<Option<OptimizationJobRow>, sqlx::Error>;
}

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn fetch_job(
        &self,
        job_id: &str,
        user_id: &str,
    ) -> Result<Option<OptimizationJobRow>, sqlx::Error> {
        sqlx::query_as::<_, OptimizationJobRow>(
            r#"
            SELECT id::text                    AS id,
                   status,
                   resume_id::text             AS resume_id,
                   user_id::text               AS user_id,
                   enhanced_resume_id::text    AS enhanced_resume_id,
                   job_description,
                   to_jsonb(modifications)      AS modifications,
                   to_jsonb(match_details)      AS match_details,
                   to_jsonb(keywords_extracted) AS keywords_extracted,
                   match_count::int4           AS match_count,
                   error_message,
                   created_at
            FROM optimization_jobs
            WHERE id::text = $1 AND user_id::text = $2
            "#,
        )
        .bind(job_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }
}
