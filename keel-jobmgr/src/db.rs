use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            job_type VARCHAR(20) NOT NULL,
            instance_count BIGINT NOT NULL,
            config JSONB NOT NULL,
            config_version BIGINT NOT NULL DEFAULT 0,
            system_labels JSONB NOT NULL DEFAULT '{}',
            state VARCHAR(50) NOT NULL,
            goal_state VARCHAR(50) NOT NULL,
            state_version BIGINT NOT NULL DEFAULT 0,
            desired_state_version BIGINT NOT NULL DEFAULT 0,
            revision BIGINT NOT NULL DEFAULT 0,
            creation_time TIMESTAMPTZ NOT NULL,
            update_time TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create tasks table, one row per persisted instance
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            job_id UUID NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            instance_id BIGINT NOT NULL,
            state VARCHAR(50) NOT NULL,
            goal_state VARCHAR(50) NOT NULL,
            config_version BIGINT NOT NULL DEFAULT 0,
            desired_config_version BIGINT NOT NULL DEFAULT 0,
            worker_task_id VARCHAR(255),
            message TEXT NOT NULL DEFAULT '',
            reason TEXT NOT NULL DEFAULT '',
            update_time TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (job_id, instance_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Recovery scans non-terminal jobs on startup
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_state ON tasks(job_id, state)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
