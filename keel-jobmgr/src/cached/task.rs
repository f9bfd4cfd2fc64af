//! Handle to a cached task instance

use chrono::{DateTime, Utc};
use keel_core::domain::job::JobId;
use keel_core::domain::task::{TaskId, TaskRuntime, TaskStateVector};
use std::sync::Arc;

use super::{CacheError, CachedJob};

/// A task instance of a resident job
///
/// Holds no state of its own: every access takes the owning job's lock.
#[derive(Clone)]
pub struct CachedTask {
    job: Arc<CachedJob>,
    instance_id: u32,
}

impl CachedTask {
    pub(super) fn new(job: Arc<CachedJob>, instance_id: u32) -> Self {
        Self { job, instance_id }
    }

    pub fn id(&self) -> TaskId {
        TaskId::new(self.job.id(), self.instance_id)
    }

    pub fn job_id(&self) -> JobId {
        self.job.id()
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    /// Returns the runtime, loading it from the store when not resident
    pub async fn get_runtime(&self) -> Result<TaskRuntime, CacheError> {
        let task_id = self.id();
        let mut record = self.job.lock().await;
        let task = record
            .tasks
            .get_mut(&self.instance_id)
            .ok_or(CacheError::TaskNotFound(task_id))?;

        if let Some(runtime) = &task.runtime {
            return Ok(runtime.clone());
        }

        let stores = self.job.stores();
        let info = stores.call(stores.tasks().get_task_by_id(task_id)).await?;
        task.runtime = Some(info.runtime.clone());
        Ok(info.runtime)
    }

    /// Actual state and config version; unknown when the runtime is not resident
    pub async fn current_state(&self) -> TaskStateVector {
        let record = self.job.lock().await;
        match record
            .tasks
            .get(&self.instance_id)
            .and_then(|task| task.runtime.as_ref())
        {
            Some(runtime) => TaskStateVector {
                state: runtime.state,
                config_version: runtime.config_version,
            },
            None => TaskStateVector::unknown(),
        }
    }

    /// Goal state and desired config version; unknown when not resident
    pub async fn goal_state(&self) -> TaskStateVector {
        let record = self.job.lock().await;
        match record
            .tasks
            .get(&self.instance_id)
            .and_then(|task| task.runtime.as_ref())
        {
            Some(runtime) => TaskStateVector {
                state: runtime.goal_state,
                config_version: runtime.desired_config_version,
            },
            None => TaskStateVector::unknown(),
        }
    }

    /// When the cached runtime last changed; None if the task was evicted
    pub async fn last_runtime_update_time(&self) -> Option<DateTime<Utc>> {
        let record = self.job.lock().await;
        record
            .tasks
            .get(&self.instance_id)
            .map(|task| task.last_runtime_update)
    }

    pub async fn last_action(&self) -> Option<(&'static str, DateTime<Utc>)> {
        let record = self.job.lock().await;
        record
            .tasks
            .get(&self.instance_id)
            .and_then(|task| task.last_action)
    }

    pub async fn set_last_action(&self, action: &'static str) {
        let mut record = self.job.lock().await;
        if let Some(task) = record.tasks.get_mut(&self.instance_id) {
            task.last_action = Some((action, Utc::now()));
        }
    }

    #[cfg(test)]
    pub async fn set_last_runtime_update_time(&self, at: DateTime<Utc>) {
        let mut record = self.job.lock().await;
        if let Some(task) = record.tasks.get_mut(&self.instance_id) {
            task.last_runtime_update = at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cached::{JobFactory, UpdateMode};
    use crate::repository::Stores;
    use crate::testing::MemoryStore;
    use keel_core::domain::task::TaskState;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn factory(store: &Arc<MemoryStore>) -> JobFactory {
        let stores = Stores::new(store.clone(), store.clone(), Duration::from_secs(1));
        JobFactory::new(Arc::new(stores))
    }

    #[tokio::test]
    async fn test_runtime_loaded_lazily_from_store() {
        let store = Arc::new(MemoryStore::new());
        let job_id = JobId::new();
        let task_id = TaskId::new(job_id, 0);
        let runtime = TaskRuntime::initialized(task_id, TaskState::Running, 3);
        store.insert_task(task_id, runtime.clone());

        let job = factory(&store).add_job(job_id);
        job.update_tasks(BTreeMap::from([(0, runtime.clone())]), UpdateMode::StoreOnly)
            .await
            .unwrap();
        let task = job.get_task(0).await.unwrap();

        assert_eq!(task.current_state().await, TaskStateVector::unknown());
        assert_eq!(task.get_runtime().await.unwrap(), runtime);
        assert_eq!(
            task.current_state().await,
            TaskStateVector {
                state: TaskState::Initialized,
                config_version: 3,
            }
        );
        assert_eq!(task.goal_state().await.state, TaskState::Running);
    }

    #[tokio::test]
    async fn test_last_action_is_recorded() {
        let store = Arc::new(MemoryStore::new());
        let job_id = JobId::new();
        let job = factory(&store).add_job(job_id);
        let runtime = TaskRuntime::initialized(TaskId::new(job_id, 0), TaskState::Running, 1);
        job.update_tasks(BTreeMap::from([(0, runtime)]), UpdateMode::CacheOnly)
            .await
            .unwrap();
        let task = job.get_task(0).await.unwrap();

        assert!(task.last_action().await.is_none());
        task.set_last_action("TaskStop").await;

        let (name, _) = task.last_action().await.unwrap();
        assert_eq!(name, "TaskStop");
    }
}
