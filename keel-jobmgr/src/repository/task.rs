//! Task Repository
//!
//! Handles all database operations related to task runtimes.

use chrono::Utc;
use keel_core::domain::diff::{FieldValue, RuntimeDiff};
use keel_core::domain::job::JobId;
use keel_core::domain::task::{TaskId, TaskInfo, TaskRuntime, WorkerTaskId};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::BTreeMap;

use super::StoreError;

/// Insert the runtime of a newly persisted instance
pub async fn create(pool: &PgPool, task_id: TaskId, runtime: &TaskRuntime) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO tasks (job_id, instance_id, state, goal_state, config_version,
                           desired_config_version, worker_task_id, message, reason, update_time)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(task_id.job_id.0)
    .bind(i64::from(task_id.instance_id))
    .bind(runtime.state.as_str())
    .bind(runtime.goal_state.as_str())
    .bind(runtime.config_version as i64)
    .bind(runtime.desired_config_version as i64)
    .bind(runtime.worker_task_id.as_ref().map(WorkerTaskId::as_str))
    .bind(&runtime.message)
    .bind(&runtime.reason)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Find a single task by job and instance
pub async fn find_by_id(pool: &PgPool, task_id: TaskId) -> Result<Option<TaskInfo>, StoreError> {
    let row = sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT instance_id, state, goal_state, config_version, desired_config_version,
               worker_task_id, message, reason
        FROM tasks
        WHERE job_id = $1 AND instance_id = $2
        "#,
    )
    .bind(task_id.job_id.0)
    .bind(i64::from(task_id.instance_id))
    .fetch_optional(pool)
    .await?;

    row.map(|r| {
        Ok(TaskInfo {
            job_id: task_id.job_id,
            instance_id: task_id.instance_id,
            runtime: r.into_runtime()?,
        })
    })
    .transpose()
}

/// Find every persisted instance of a job
pub async fn find_by_job(
    pool: &PgPool,
    job_id: JobId,
) -> Result<BTreeMap<u32, TaskRuntime>, StoreError> {
    let rows = sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT instance_id, state, goal_state, config_version, desired_config_version,
               worker_task_id, message, reason
        FROM tasks
        WHERE job_id = $1
        ORDER BY instance_id ASC
        "#,
    )
    .bind(job_id.0)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| Ok((r.instance_id as u32, r.into_runtime()?)))
        .collect()
}

/// Replace a task runtime; returns false if the task does not exist
pub async fn update_runtime(
    pool: &PgPool,
    task_id: TaskId,
    runtime: &TaskRuntime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET state = $1, goal_state = $2, config_version = $3, desired_config_version = $4,
            worker_task_id = $5, message = $6, reason = $7, update_time = $8
        WHERE job_id = $9 AND instance_id = $10
        "#,
    )
    .bind(runtime.state.as_str())
    .bind(runtime.goal_state.as_str())
    .bind(runtime.config_version as i64)
    .bind(runtime.desired_config_version as i64)
    .bind(runtime.worker_task_id.as_ref().map(WorkerTaskId::as_str))
    .bind(&runtime.message)
    .bind(&runtime.reason)
    .bind(Utc::now())
    .bind(task_id.job_id.0)
    .bind(i64::from(task_id.instance_id))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Write only the columns named by `diff`; returns false if the task does not exist
pub async fn patch_runtime(
    pool: &PgPool,
    task_id: TaskId,
    diff: &RuntimeDiff,
) -> Result<bool, sqlx::Error> {
    let mut query = QueryBuilder::<Postgres>::new("UPDATE tasks SET update_time = ");
    query.push_bind(Utc::now());

    for value in diff.values() {
        match value {
            FieldValue::State(state) => {
                query.push(", state = ").push_bind(state.as_str());
            }
            FieldValue::GoalState(state) => {
                query.push(", goal_state = ").push_bind(state.as_str());
            }
            FieldValue::ConfigVersion(version) => {
                query.push(", config_version = ").push_bind(*version as i64);
            }
            FieldValue::DesiredConfigVersion(version) => {
                query
                    .push(", desired_config_version = ")
                    .push_bind(*version as i64);
            }
            FieldValue::WorkerTaskId(id) => {
                query
                    .push(", worker_task_id = ")
                    .push_bind(id.as_ref().map(|id| id.as_str().to_string()));
            }
            FieldValue::Message(message) => {
                query.push(", message = ").push_bind(message.as_str());
            }
            FieldValue::Reason(reason) => {
                query.push(", reason = ").push_bind(reason.as_str());
            }
        }
    }

    query
        .push(" WHERE job_id = ")
        .push_bind(task_id.job_id.0)
        .push(" AND instance_id = ")
        .push_bind(i64::from(task_id.instance_id));

    let result = query.build().execute(pool).await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct TaskRow {
    instance_id: i64,
    state: String,
    goal_state: String,
    config_version: i64,
    desired_config_version: i64,
    worker_task_id: Option<String>,
    message: String,
    reason: String,
}

impl TaskRow {
    fn into_runtime(self) -> Result<TaskRuntime, StoreError> {
        let instance_id = self.instance_id;
        let decode = |e: keel_core::domain::job::UnknownStateError| {
            StoreError::Decode(format!("task runtime of instance {}: {}", instance_id, e))
        };

        Ok(TaskRuntime {
            state: self.state.parse().map_err(decode)?,
            goal_state: self.goal_state.parse().map_err(decode)?,
            config_version: self.config_version as u64,
            desired_config_version: self.desired_config_version as u64,
            worker_task_id: self.worker_task_id.map(WorkerTaskId),
            message: self.message,
            reason: self.reason,
        })
    }
}
