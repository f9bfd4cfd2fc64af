//! In-memory collaborators for unit tests

use async_trait::async_trait;
use keel_client::ClientError;
use keel_core::domain::diff::RuntimeDiff;
use keel_core::domain::job::{ConfigAddOn, JobConfig, JobId, JobInfo, JobRuntime, JobState, JobType};
use keel_core::domain::task::{TaskId, TaskInfo, TaskRuntime, TaskState};
use keel_core::dto::resmgr::{
    KillTaskError, KillTasksRequest, KillTasksResponse, MarkTasksLaunchedRequest,
    MarkTasksLaunchedResponse,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::cached::UpdateMode;
use crate::config::Config;
use crate::goalstate::Driver;
use crate::repository::{JobStore, StoreError, TaskStore};
use crate::resmgr::ResourceManager;

// =============================================================================
// Store
// =============================================================================

#[derive(Default)]
struct StoreState {
    configs: HashMap<JobId, (JobConfig, ConfigAddOn)>,
    runtimes: HashMap<JobId, JobRuntime>,
    tasks: BTreeMap<TaskId, TaskRuntime>,
    calls: HashMap<&'static str, usize>,
    failing: HashSet<&'static str>,
    failing_tasks: HashSet<(&'static str, TaskId)>,
    delays: HashMap<&'static str, Duration>,
}

/// Job and task store kept in maps, with call counters and failure injection
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a job without counting a call
    pub fn insert_job(&self, id: JobId, config: JobConfig, runtime: JobRuntime) {
        let mut state = self.state.lock();
        state.configs.insert(id, (config, ConfigAddOn::default()));
        state.runtimes.insert(id, runtime);
    }

    /// Seeds a task without counting a call
    pub fn insert_task(&self, task_id: TaskId, runtime: TaskRuntime) {
        self.state.lock().tasks.insert(task_id, runtime);
    }

    pub fn job_runtime(&self, id: JobId) -> Option<JobRuntime> {
        self.state.lock().runtimes.get(&id).cloned()
    }

    pub fn task_runtime(&self, task_id: TaskId) -> Option<TaskRuntime> {
        self.state.lock().tasks.get(&task_id).cloned()
    }

    /// Number of times `op` was called, failed calls included
    pub fn call_count(&self, op: &str) -> usize {
        self.state.lock().calls.get(op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    pub fn reset_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Makes every later call of `op` fail
    pub fn fail(&self, op: &'static str) {
        self.state.lock().failing.insert(op);
    }

    /// Makes later calls of `op` for one task fail
    pub fn fail_task(&self, op: &'static str, task_id: TaskId) {
        self.state.lock().failing_tasks.insert((op, task_id));
    }

    /// Makes every later call of `op` sleep for `delay` before touching the maps
    pub fn delay(&self, op: &'static str, delay: Duration) {
        self.state.lock().delays.insert(op, delay);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing.clear();
        state.failing_tasks.clear();
    }

    async fn enter(&self, op: &'static str, task_id: Option<TaskId>) -> Result<(), StoreError> {
        let delay = {
            let mut state = self.state.lock();
            *state.calls.entry(op).or_default() += 1;

            let injected = state.failing.contains(op)
                || task_id.is_some_and(|id| state.failing_tasks.contains(&(op, id)));
            if injected {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            state.delays.get(op).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(
        &self,
        id: JobId,
        config: &JobConfig,
        add_on: &ConfigAddOn,
        runtime: &JobRuntime,
    ) -> Result<(), StoreError> {
        self.enter("create_job", None).await?;
        let mut state = self.state.lock();
        state.configs.insert(id, (config.clone(), add_on.clone()));
        state.runtimes.insert(id, runtime.clone());
        Ok(())
    }

    async fn get_job_config(&self, id: JobId) -> Result<JobConfig, StoreError> {
        self.enter("get_job_config", None).await?;
        self.state
            .lock()
            .configs
            .get(&id)
            .map(|(config, _)| config.clone())
            .ok_or(StoreError::JobNotFound(id))
    }

    async fn get_job_runtime(&self, id: JobId) -> Result<JobRuntime, StoreError> {
        self.enter("get_job_runtime", None).await?;
        self.job_runtime(id).ok_or(StoreError::JobNotFound(id))
    }

    async fn update_job_config(
        &self,
        id: JobId,
        config: &JobConfig,
        add_on: &ConfigAddOn,
    ) -> Result<(), StoreError> {
        self.enter("update_job_config", None).await?;
        let mut state = self.state.lock();
        match state.configs.get_mut(&id) {
            Some(entry) => {
                *entry = (config.clone(), add_on.clone());
                Ok(())
            }
            None => Err(StoreError::JobNotFound(id)),
        }
    }

    async fn update_job_runtime(&self, id: JobId, runtime: &JobRuntime) -> Result<(), StoreError> {
        self.enter("update_job_runtime", None).await?;
        let mut state = self.state.lock();
        match state.runtimes.get_mut(&id) {
            Some(entry) => {
                *entry = runtime.clone();
                Ok(())
            }
            None => Err(StoreError::JobNotFound(id)),
        }
    }

    async fn get_active_job_ids(&self) -> Result<Vec<JobId>, StoreError> {
        self.enter("get_active_job_ids", None).await?;
        let state = self.state.lock();
        let mut ids: Vec<JobId> = state
            .runtimes
            .iter()
            .filter(|(_, runtime)| !runtime.state.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_task_runtime(
        &self,
        task_id: TaskId,
        runtime: &TaskRuntime,
    ) -> Result<(), StoreError> {
        self.enter("create_task_runtime", Some(task_id)).await?;
        self.insert_task(task_id, runtime.clone());
        Ok(())
    }

    async fn get_task_by_id(&self, task_id: TaskId) -> Result<TaskInfo, StoreError> {
        self.enter("get_task_by_id", Some(task_id)).await?;
        self.task_runtime(task_id)
            .map(|runtime| TaskInfo {
                job_id: task_id.job_id,
                instance_id: task_id.instance_id,
                runtime,
            })
            .ok_or(StoreError::TaskNotFound(task_id))
    }

    async fn get_task_runtimes_for_job(
        &self,
        job_id: JobId,
    ) -> Result<BTreeMap<u32, TaskRuntime>, StoreError> {
        self.enter("get_task_runtimes_for_job", None).await?;
        let state = self.state.lock();
        Ok(state
            .tasks
            .iter()
            .filter(|(id, _)| id.job_id == job_id)
            .map(|(id, runtime)| (id.instance_id, runtime.clone()))
            .collect())
    }

    async fn update_task_runtime(
        &self,
        task_id: TaskId,
        runtime: &TaskRuntime,
    ) -> Result<(), StoreError> {
        self.enter("update_task_runtime", Some(task_id)).await?;
        let mut state = self.state.lock();
        match state.tasks.get_mut(&task_id) {
            Some(entry) => {
                *entry = runtime.clone();
                Ok(())
            }
            None => Err(StoreError::TaskNotFound(task_id)),
        }
    }

    async fn patch_task_runtime(
        &self,
        task_id: TaskId,
        diff: &RuntimeDiff,
    ) -> Result<(), StoreError> {
        self.enter("patch_task_runtime", Some(task_id)).await?;
        let mut state = self.state.lock();
        match state.tasks.get_mut(&task_id) {
            Some(entry) => {
                diff.apply(entry);
                Ok(())
            }
            None => Err(StoreError::TaskNotFound(task_id)),
        }
    }
}

// =============================================================================
// Resource manager
// =============================================================================

#[derive(Default)]
struct ResourceManagerState {
    launched: Vec<MarkTasksLaunchedRequest>,
    killed: Vec<KillTasksRequest>,
    failure: Option<(u16, &'static str)>,
    kill_errors: Vec<KillTaskError>,
}

/// Records every request; can be made to fail
#[derive(Default)]
pub struct FakeResourceManager {
    state: Mutex<ResourceManagerState>,
}

impl FakeResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later request fail with a 503
    pub fn set_unavailable(&self) {
        self.fail_with(503, "resource manager unavailable");
    }

    /// Makes every later request fail with `status`
    pub fn fail_with(&self, status: u16, message: &'static str) {
        self.state.lock().failure = Some((status, message));
    }

    /// Per-task errors returned by later kill requests
    pub fn reject_kill(&self, task_id: TaskId, message: &str) {
        self.state.lock().kill_errors.push(KillTaskError {
            task_id,
            message: message.to_string(),
        });
    }

    pub fn mark_launched_calls(&self) -> Vec<MarkTasksLaunchedRequest> {
        self.state.lock().launched.clone()
    }

    pub fn kill_calls(&self) -> Vec<KillTasksRequest> {
        self.state.lock().killed.clone()
    }
}

#[async_trait]
impl ResourceManager for FakeResourceManager {
    async fn mark_tasks_launched(
        &self,
        req: MarkTasksLaunchedRequest,
    ) -> keel_client::Result<MarkTasksLaunchedResponse> {
        let mut state = self.state.lock();
        state.launched.push(req);
        if let Some((status, message)) = state.failure {
            return Err(ClientError::api_error(status, message));
        }
        Ok(MarkTasksLaunchedResponse {})
    }

    async fn kill_tasks(&self, req: KillTasksRequest) -> keel_client::Result<KillTasksResponse> {
        let mut state = self.state.lock();
        state.killed.push(req);
        if let Some((status, message)) = state.failure {
            return Err(ClientError::api_error(status, message));
        }
        Ok(KillTasksResponse {
            errors: state.kill_errors.clone(),
        })
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.launch_timeout = Duration::from_secs(60);
    config.job_worker_threads = 2;
    config.task_worker_threads = 4;
    config.job_requeue_delay = Duration::from_secs(10);
    config.task_requeue_delay = Duration::from_secs(30);
    config.store_timeout = Duration::from_secs(1);
    config
}

pub fn job_config(instance_count: u32, job_type: JobType) -> JobConfig {
    JobConfig {
        name: "test-job".to_string(),
        job_type,
        instance_count,
        config_version: 1,
        ..Default::default()
    }
}

/// Runtime of an instance in `state` aiming at `goal`
pub fn task_runtime(task_id: TaskId, state: TaskState, goal: TaskState) -> TaskRuntime {
    let mut runtime = TaskRuntime::initialized(task_id, goal, 1);
    runtime.state = state;
    runtime
}

/// A driver wired to in-memory collaborators; not started
pub struct Harness {
    pub driver: Arc<Driver>,
    pub store: Arc<MemoryStore>,
    pub resmgr: Arc<FakeResourceManager>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let resmgr = Arc::new(FakeResourceManager::new());
        let driver = Driver::new(config, store.clone(), store.clone(), resmgr.clone());
        Self {
            driver,
            store,
            resmgr,
        }
    }

    /// Persists a job and one task per entry of `tasks` (state, goal), then
    /// loads all of it into the cache
    pub async fn seed_job(
        &self,
        config: JobConfig,
        runtime: JobRuntime,
        tasks: &[(TaskState, TaskState)],
    ) -> JobId {
        let id = JobId::new();
        self.store.insert_job(id, config.clone(), runtime.clone());

        let runtimes: BTreeMap<u32, TaskRuntime> = tasks
            .iter()
            .enumerate()
            .map(|(i, &(state, goal))| {
                let instance_id = i as u32;
                let task_id = TaskId::new(id, instance_id);
                let runtime = task_runtime(task_id, state, goal);
                self.store.insert_task(task_id, runtime.clone());
                (instance_id, runtime)
            })
            .collect();

        let job = self.driver.job_factory().add_job(id);
        job.update(
            JobInfo {
                runtime: Some(runtime),
                config: Some(config),
            },
            &ConfigAddOn::default(),
            UpdateMode::CacheOnly,
        )
        .await
        .unwrap();
        job.update_tasks(runtimes, UpdateMode::CacheOnly)
            .await
            .unwrap();

        self.store.reset_calls();
        id
    }

    /// A batch job in `state` aiming at `goal` with the given tasks
    pub async fn seed_batch_job(
        &self,
        state: JobState,
        goal: JobState,
        tasks: &[(TaskState, TaskState)],
    ) -> JobId {
        let mut runtime = JobRuntime::initialized(goal);
        runtime.state = state;
        self.seed_job(job_config(tasks.len() as u32, JobType::Batch), runtime, tasks)
            .await
    }
}
