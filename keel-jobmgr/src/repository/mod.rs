//! Repository Module
//!
//! Persistent store for jobs and task runtimes. The store is the durability
//! boundary: the cache only ever reflects writes the store has accepted.
//!
//! Access goes through the [`JobStore`] and [`TaskStore`] traits so the
//! reconciliation core can run against PostgreSQL in production and an
//! in-memory store in tests.

pub mod job;
pub mod task;

use async_trait::async_trait;
use keel_core::domain::diff::RuntimeDiff;
use keel_core::domain::job::{ConfigAddOn, JobConfig, JobId, JobRuntime};
use keel_core::domain::task::{TaskId, TaskInfo, TaskRuntime};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// Re-export for convenience
pub use job as job_repository;
pub use task as task_repository;

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} not found in store")]
    JobNotFound(JobId),

    #[error("task {0} not found in store")]
    TaskNotFound(TaskId),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Decode(String),

    #[error("store call did not complete within {0:?}")]
    Timeout(Duration),
}

/// Job records: configuration and runtime
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(
        &self,
        id: JobId,
        config: &JobConfig,
        add_on: &ConfigAddOn,
        runtime: &JobRuntime,
    ) -> Result<(), StoreError>;

    async fn get_job_config(&self, id: JobId) -> Result<JobConfig, StoreError>;

    async fn get_job_runtime(&self, id: JobId) -> Result<JobRuntime, StoreError>;

    async fn update_job_config(
        &self,
        id: JobId,
        config: &JobConfig,
        add_on: &ConfigAddOn,
    ) -> Result<(), StoreError>;

    async fn update_job_runtime(&self, id: JobId, runtime: &JobRuntime) -> Result<(), StoreError>;

    /// Jobs whose state is not terminal, used by the startup recovery scan
    async fn get_active_job_ids(&self) -> Result<Vec<JobId>, StoreError>;
}

/// Task runtimes, one record per persisted instance
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task_runtime(
        &self,
        task_id: TaskId,
        runtime: &TaskRuntime,
    ) -> Result<(), StoreError>;

    async fn get_task_by_id(&self, task_id: TaskId) -> Result<TaskInfo, StoreError>;

    async fn get_task_runtimes_for_job(
        &self,
        job_id: JobId,
    ) -> Result<BTreeMap<u32, TaskRuntime>, StoreError>;

    async fn update_task_runtime(
        &self,
        task_id: TaskId,
        runtime: &TaskRuntime,
    ) -> Result<(), StoreError>;

    /// Overwrites only the fields named by `diff`
    async fn patch_task_runtime(&self, task_id: TaskId, diff: &RuntimeDiff)
    -> Result<(), StoreError>;
}

/// The store collaborators together with the deadline applied to every call
pub struct Stores {
    job_store: Arc<dyn JobStore>,
    task_store: Arc<dyn TaskStore>,
    timeout: Duration,
}

impl Stores {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        task_store: Arc<dyn TaskStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            job_store,
            task_store,
            timeout,
        }
    }

    pub fn jobs(&self) -> &dyn JobStore {
        self.job_store.as_ref()
    }

    pub fn tasks(&self) -> &dyn TaskStore {
        self.task_store.as_ref()
    }

    /// Awaits a store call, failing with [`StoreError::Timeout`] past the deadline.
    ///
    /// The call's future is dropped on expiry, which cancels it.
    pub async fn call<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or(Err(StoreError::Timeout(self.timeout)))
    }
}

/// PostgreSQL implementation of both store traits
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(
        &self,
        id: JobId,
        config: &JobConfig,
        add_on: &ConfigAddOn,
        runtime: &JobRuntime,
    ) -> Result<(), StoreError> {
        job_repository::create(&self.pool, id, config, add_on, runtime).await
    }

    async fn get_job_config(&self, id: JobId) -> Result<JobConfig, StoreError> {
        job_repository::find_config(&self.pool, id)
            .await?
            .ok_or(StoreError::JobNotFound(id))
    }

    async fn get_job_runtime(&self, id: JobId) -> Result<JobRuntime, StoreError> {
        job_repository::find_runtime(&self.pool, id)
            .await?
            .ok_or(StoreError::JobNotFound(id))
    }

    async fn update_job_config(
        &self,
        id: JobId,
        config: &JobConfig,
        add_on: &ConfigAddOn,
    ) -> Result<(), StoreError> {
        if !job_repository::update_config(&self.pool, id, config, add_on).await? {
            return Err(StoreError::JobNotFound(id));
        }
        Ok(())
    }

    async fn update_job_runtime(&self, id: JobId, runtime: &JobRuntime) -> Result<(), StoreError> {
        if !job_repository::update_runtime(&self.pool, id, runtime).await? {
            return Err(StoreError::JobNotFound(id));
        }
        Ok(())
    }

    async fn get_active_job_ids(&self) -> Result<Vec<JobId>, StoreError> {
        Ok(job_repository::find_active_ids(&self.pool).await?)
    }
}

#[async_trait]
impl TaskStore for PgStore {
    async fn create_task_runtime(
        &self,
        task_id: TaskId,
        runtime: &TaskRuntime,
    ) -> Result<(), StoreError> {
        Ok(task_repository::create(&self.pool, task_id, runtime).await?)
    }

    async fn get_task_by_id(&self, task_id: TaskId) -> Result<TaskInfo, StoreError> {
        task_repository::find_by_id(&self.pool, task_id)
            .await?
            .ok_or(StoreError::TaskNotFound(task_id))
    }

    async fn get_task_runtimes_for_job(
        &self,
        job_id: JobId,
    ) -> Result<BTreeMap<u32, TaskRuntime>, StoreError> {
        task_repository::find_by_job(&self.pool, job_id).await
    }

    async fn update_task_runtime(
        &self,
        task_id: TaskId,
        runtime: &TaskRuntime,
    ) -> Result<(), StoreError> {
        if !task_repository::update_runtime(&self.pool, task_id, runtime).await? {
            return Err(StoreError::TaskNotFound(task_id));
        }
        Ok(())
    }

    async fn patch_task_runtime(
        &self,
        task_id: TaskId,
        diff: &RuntimeDiff,
    ) -> Result<(), StoreError> {
        if !task_repository::patch_runtime(&self.pool, task_id, diff).await? {
            return Err(StoreError::TaskNotFound(task_id));
        }
        Ok(())
    }
}
