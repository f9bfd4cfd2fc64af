//! Job Repository
//!
//! Handles all database operations related to jobs.

use chrono::{DateTime, Utc};
use keel_core::domain::job::{ConfigAddOn, JobConfig, JobId, JobRuntime, JobState};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::StoreError;

/// Insert a newly submitted job
pub async fn create(
    pool: &PgPool,
    id: JobId,
    config: &JobConfig,
    add_on: &ConfigAddOn,
    runtime: &JobRuntime,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO jobs (id, name, job_type, instance_count, config, config_version,
                          system_labels, state, goal_state, state_version,
                          desired_state_version, revision, creation_time, update_time)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(id.0)
    .bind(&config.name)
    .bind(config.job_type.as_str())
    .bind(i64::from(config.instance_count))
    .bind(Json(config))
    .bind(config.config_version as i64)
    .bind(Json(&add_on.system_labels))
    .bind(runtime.state.as_str())
    .bind(runtime.goal_state.as_str())
    .bind(runtime.state_version as i64)
    .bind(runtime.desired_state_version as i64)
    .bind(runtime.revision as i64)
    .bind(runtime.creation_time)
    .bind(runtime.update_time)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find a job's configuration by ID
pub async fn find_config(pool: &PgPool, id: JobId) -> Result<Option<JobConfig>, StoreError> {
    let row: Option<Json<JobConfig>> =
        sqlx::query_scalar("SELECT config FROM jobs WHERE id = $1")
            .bind(id.0)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|Json(config)| config))
}

/// Find a job's runtime by ID
pub async fn find_runtime(pool: &PgPool, id: JobId) -> Result<Option<JobRuntime>, StoreError> {
    let row = sqlx::query_as::<_, JobRuntimeRow>(
        r#"
        SELECT state, goal_state, state_version, desired_state_version, revision,
               creation_time, update_time
        FROM jobs
        WHERE id = $1
        "#,
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await?;

    row.map(JobRuntime::try_from).transpose()
}

/// Find the IDs of all jobs that are not in a terminal state
pub async fn find_active_ids(pool: &PgPool) -> Result<Vec<JobId>, sqlx::Error> {
    let ids: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT id FROM jobs
        WHERE state NOT IN ($1, $2, $3)
        ORDER BY creation_time ASC
        "#,
    )
    .bind(JobState::Succeeded.as_str())
    .bind(JobState::Failed.as_str())
    .bind(JobState::Killed.as_str())
    .fetch_all(pool)
    .await?;

    Ok(ids.into_iter().map(JobId).collect())
}

/// Replace a job's configuration; returns false if the job does not exist
pub async fn update_config(
    pool: &PgPool,
    id: JobId,
    config: &JobConfig,
    add_on: &ConfigAddOn,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET name = $1, job_type = $2, instance_count = $3, config = $4,
            config_version = $5, system_labels = $6
        WHERE id = $7
        "#,
    )
    .bind(&config.name)
    .bind(config.job_type.as_str())
    .bind(i64::from(config.instance_count))
    .bind(Json(config))
    .bind(config.config_version as i64)
    .bind(Json(&add_on.system_labels))
    .bind(id.0)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Replace a job's runtime; returns false if the job does not exist
pub async fn update_runtime(
    pool: &PgPool,
    id: JobId,
    runtime: &JobRuntime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET state = $1, goal_state = $2, state_version = $3, desired_state_version = $4,
            revision = $5, update_time = $6
        WHERE id = $7
        "#,
    )
    .bind(runtime.state.as_str())
    .bind(runtime.goal_state.as_str())
    .bind(runtime.state_version as i64)
    .bind(runtime.desired_state_version as i64)
    .bind(runtime.revision as i64)
    .bind(runtime.update_time)
    .bind(id.0)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRuntimeRow {
    state: String,
    goal_state: String,
    state_version: i64,
    desired_state_version: i64,
    revision: i64,
    creation_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

impl TryFrom<JobRuntimeRow> for JobRuntime {
    type Error = StoreError;

    fn try_from(row: JobRuntimeRow) -> Result<Self, Self::Error> {
        let decode = |e: keel_core::domain::job::UnknownStateError| {
            StoreError::Decode(format!("job runtime: {}", e))
        };

        Ok(JobRuntime {
            state: row.state.parse().map_err(decode)?,
            goal_state: row.goal_state.parse().map_err(decode)?,
            state_version: row.state_version as u64,
            desired_state_version: row.desired_state_version as u64,
            revision: row.revision as u64,
            creation_time: row.creation_time,
            update_time: row.update_time,
        })
    }
}
