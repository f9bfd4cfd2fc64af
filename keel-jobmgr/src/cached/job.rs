//! Cached job record and its write-through mutations

use chrono::{DateTime, Utc};
use keel_core::domain::diff::RuntimeDiff;
use keel_core::domain::job::{ConfigAddOn, JobConfig, JobId, JobInfo, JobRuntime, JobType};
use keel_core::domain::task::{TaskId, TaskRuntime};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::{CacheError, CachedTask, UpdateMode};
use crate::repository::Stores;

/// In-memory state of one job, guarded by the job's lock
pub(super) struct JobRecord {
    pub(super) config: Option<JobConfig>,
    pub(super) runtime: Option<JobRuntime>,
    pub(super) tasks: BTreeMap<u32, TaskRecord>,
}

/// In-memory state of one task instance
pub(super) struct TaskRecord {
    /// None until first read, or after a store-only write
    pub(super) runtime: Option<TaskRuntime>,
    pub(super) last_runtime_update: DateTime<Utc>,
    pub(super) last_action: Option<(&'static str, DateTime<Utc>)>,
}

impl TaskRecord {
    fn new(runtime: Option<TaskRuntime>) -> Self {
        Self {
            runtime,
            last_runtime_update: Utc::now(),
            last_action: None,
        }
    }

    fn set_runtime(&mut self, runtime: Option<TaskRuntime>) {
        self.runtime = runtime;
        self.last_runtime_update = Utc::now();
    }
}

/// A job resident in the cache
///
/// All reads and writes of the job and of its tasks go through one lock.
/// Store writes happen while the lock is held, and the cached copy only
/// changes after the store accepted the write.
pub struct CachedJob {
    id: JobId,
    stores: Arc<Stores>,
    record: Mutex<JobRecord>,
}

impl CachedJob {
    pub(super) fn new(id: JobId, stores: Arc<Stores>) -> Self {
        Self {
            id,
            stores,
            record: Mutex::new(JobRecord {
                config: None,
                runtime: None,
                tasks: BTreeMap::new(),
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub(super) fn stores(&self) -> &Stores {
        &self.stores
    }

    pub(super) async fn lock(&self) -> MutexGuard<'_, JobRecord> {
        self.record.lock().await
    }

    /// Returns the job runtime, loading it from the store when not resident
    pub async fn get_runtime(&self) -> Result<JobRuntime, CacheError> {
        let mut record = self.record.lock().await;
        self.load_runtime(&mut record).await
    }

    /// Returns the job config, loading it from the store when not resident
    pub async fn get_config(&self) -> Result<JobConfig, CacheError> {
        let mut record = self.record.lock().await;
        self.load_config(&mut record).await
    }

    /// Job type from the cached config; BATCH when the config is not resident
    pub async fn get_job_type(&self) -> JobType {
        let record = self.record.lock().await;
        record
            .config
            .as_ref()
            .map(|config| config.job_type)
            .unwrap_or_default()
    }

    /// True while fewer instances are resident than the config declares.
    ///
    /// A job whose config cannot be loaded is reported as partially created.
    pub async fn is_partially_created(&self) -> bool {
        let mut record = self.record.lock().await;
        match self.load_config(&mut record).await {
            Ok(config) => (record.tasks.len() as u64) < u64::from(config.instance_count),
            Err(e) => {
                debug!("Job {} config unavailable, treating as partially created: {}", self.id, e);
                true
            }
        }
    }

    /// Handles for every resident instance, keyed by instance id
    pub async fn get_all_tasks(self: &Arc<Self>) -> BTreeMap<u32, CachedTask> {
        let record = self.record.lock().await;
        record
            .tasks
            .keys()
            .map(|&instance_id| (instance_id, CachedTask::new(Arc::clone(self), instance_id)))
            .collect()
    }

    pub async fn get_task(self: &Arc<Self>, instance_id: u32) -> Option<CachedTask> {
        let record = self.record.lock().await;
        record
            .tasks
            .contains_key(&instance_id)
            .then(|| CachedTask::new(Arc::clone(self), instance_id))
    }

    /// Persists a newly submitted job, then caches it
    pub async fn create(
        &self,
        config: JobConfig,
        runtime: JobRuntime,
        add_on: &ConfigAddOn,
    ) -> Result<(), CacheError> {
        let mut record = self.record.lock().await;

        self.stores
            .call(self.stores.jobs().create_job(self.id, &config, add_on, &runtime))
            .await?;

        record.config = Some(config);
        record.runtime = Some(runtime);
        Ok(())
    }

    /// Applies the present parts of `info`.
    ///
    /// When the store is written, the runtime's `state_version` is never
    /// lowered, `revision` is bumped by one and `creation_time` is kept.
    /// `CacheOnly` installs the given records as they are.
    pub async fn update(
        &self,
        info: JobInfo,
        add_on: &ConfigAddOn,
        mode: UpdateMode,
    ) -> Result<(), CacheError> {
        let mut record = self.record.lock().await;

        if !mode.writes_store() {
            if let Some(runtime) = info.runtime {
                record.runtime = Some(runtime);
            }
            if let Some(config) = info.config {
                record.config = Some(config);
            }
            return Ok(());
        }

        if let Some(runtime) = info.runtime {
            let current = self.load_runtime(&mut record).await?;
            let runtime = JobRuntime {
                state_version: current.state_version.max(runtime.state_version),
                revision: current.revision + 1,
                creation_time: current.creation_time,
                update_time: Utc::now(),
                ..runtime
            };

            self.stores
                .call(self.stores.jobs().update_job_runtime(self.id, &runtime))
                .await?;

            record.runtime = match mode {
                UpdateMode::CacheAndStore => Some(runtime),
                _ => None,
            };
        }

        if let Some(config) = info.config {
            self.stores
                .call(self.stores.jobs().update_job_config(self.id, &config, add_on))
                .await?;

            record.config = match mode {
                UpdateMode::CacheAndStore => Some(config),
                _ => None,
            };
        }

        Ok(())
    }

    /// Persists the runtimes of newly created instances, then caches them
    pub async fn create_tasks(
        &self,
        runtimes: BTreeMap<u32, TaskRuntime>,
    ) -> Result<(), CacheError> {
        let mut record = self.record.lock().await;

        for (instance_id, runtime) in runtimes {
            let task_id = TaskId::new(self.id, instance_id);
            self.stores
                .call(self.stores.tasks().create_task_runtime(task_id, &runtime))
                .await?;

            record
                .tasks
                .insert(instance_id, TaskRecord::new(Some(runtime)));
        }

        Ok(())
    }

    /// Applies one diff per resident instance, store first then cache.
    ///
    /// The first failure aborts the call. Instances patched before it keep
    /// their new values in both store and cache.
    pub async fn patch_tasks(&self, diffs: BTreeMap<u32, RuntimeDiff>) -> Result<(), CacheError> {
        let mut record = self.record.lock().await;

        for (instance_id, diff) in diffs {
            let task_id = TaskId::new(self.id, instance_id);
            let task = record
                .tasks
                .get_mut(&instance_id)
                .ok_or(CacheError::TaskNotFound(task_id))?;

            self.stores
                .call(self.stores.tasks().patch_task_runtime(task_id, &diff))
                .await?;

            if let Some(runtime) = task.runtime.as_mut() {
                diff.apply(runtime);
            }
            task.last_runtime_update = Utc::now();
        }

        Ok(())
    }

    /// Replaces whole task runtimes.
    ///
    /// `CacheOnly` may add instances that are not resident yet, which is how
    /// recovery loads tasks read from the store.
    pub async fn update_tasks(
        &self,
        runtimes: BTreeMap<u32, TaskRuntime>,
        mode: UpdateMode,
    ) -> Result<(), CacheError> {
        let mut record = self.record.lock().await;

        for (instance_id, runtime) in runtimes {
            if mode.writes_store() {
                let task_id = TaskId::new(self.id, instance_id);
                self.stores
                    .call(self.stores.tasks().update_task_runtime(task_id, &runtime))
                    .await?;
            }

            let cached = match mode {
                UpdateMode::StoreOnly => None,
                _ => Some(runtime),
            };

            record
                .tasks
                .entry(instance_id)
                .or_insert_with(|| TaskRecord::new(None))
                .set_runtime(cached);
        }

        Ok(())
    }

    async fn load_runtime(&self, record: &mut JobRecord) -> Result<JobRuntime, CacheError> {
        if let Some(runtime) = &record.runtime {
            return Ok(runtime.clone());
        }

        let runtime = self
            .stores
            .call(self.stores.jobs().get_job_runtime(self.id))
            .await?;
        record.runtime = Some(runtime.clone());
        Ok(runtime)
    }

    async fn load_config(&self, record: &mut JobRecord) -> Result<JobConfig, CacheError> {
        if let Some(config) = &record.config {
            return Ok(config.clone());
        }

        let config = self
            .stores
            .call(self.stores.jobs().get_job_config(self.id))
            .await?;
        record.config = Some(config.clone());
        Ok(config)
    }
}
