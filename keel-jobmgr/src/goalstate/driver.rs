//! Goal state driver
//!
//! Owns both engines and every collaborator an action may reach. Actions get
//! to the store, the cache and the resource manager only through here.

use keel_core::domain::job::{ConfigAddOn, JobId, JobInfo};
use keel_core::domain::task::TaskId;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::engine::Engine;
use super::entity::{JobEntity, TaskEntity};
use super::follow_up::FollowUps;
use crate::cached::{CacheError, JobFactory, UpdateMode};
use crate::config::Config;
use crate::repository::{JobStore, StoreError, Stores, TaskStore};
use crate::resmgr::ResourceManager;

pub struct Driver {
    job_engine: Arc<Engine<JobEntity>>,
    task_engine: Arc<Engine<TaskEntity>>,
    stores: Arc<Stores>,
    job_factory: JobFactory,
    resmgr: Arc<dyn ResourceManager>,
    config: Config,
}

impl Driver {
    /// Creates a driver; invalid config values are replaced with defaults
    pub fn new(
        config: Config,
        job_store: Arc<dyn JobStore>,
        task_store: Arc<dyn TaskStore>,
        resmgr: Arc<dyn ResourceManager>,
    ) -> Arc<Self> {
        let config = config.normalize();
        let stores = Arc::new(Stores::new(job_store, task_store, config.store_timeout));

        Arc::new(Self {
            job_engine: Arc::new(Engine::new("job", config.job_worker_threads)),
            task_engine: Arc::new(Engine::new("task", config.task_worker_threads)),
            job_factory: JobFactory::new(Arc::clone(&stores)),
            stores,
            resmgr,
            config,
        })
    }

    pub fn start(&self) {
        self.job_engine.start();
        self.task_engine.start();
    }

    pub async fn stop(&self) {
        self.job_engine.stop().await;
        self.task_engine.stop().await;
    }

    pub fn enqueue_job(self: &Arc<Self>, id: JobId, delay: Duration) {
        debug!("Enqueueing job {} in {:?}", id, delay);
        self.job_engine
            .enqueue(JobEntity::new(id, Arc::clone(self)), Instant::now() + delay);
    }

    pub fn enqueue_task(self: &Arc<Self>, id: TaskId, delay: Duration) {
        debug!("Enqueueing task {} in {:?}", id, delay);
        self.task_engine
            .enqueue(TaskEntity::new(id, Arc::clone(self)), Instant::now() + delay);
    }

    /// Enqueues everything an action asked for
    pub fn apply(self: &Arc<Self>, follow_ups: FollowUps) {
        for (id, delay) in follow_ups.jobs {
            self.enqueue_job(id, delay);
        }
        for (id, delay) in follow_ups.tasks {
            self.enqueue_task(id, delay);
        }
    }

    pub fn delete_job(&self, id: JobId) {
        self.job_engine.delete(&id);
    }

    pub fn delete_task(&self, id: TaskId) {
        self.task_engine.delete(&id);
    }

    pub fn is_job_scheduled(&self, id: JobId) -> bool {
        self.job_engine.is_scheduled(&id)
    }

    pub fn is_task_scheduled(&self, id: TaskId) -> bool {
        self.task_engine.is_scheduled(&id)
    }

    pub fn job_queue_length(&self) -> usize {
        self.job_engine.queue_length()
    }

    pub fn task_queue_length(&self) -> usize {
        self.task_engine.queue_length()
    }

    /// Job actions run since start, and how many of them failed
    pub fn job_action_counts(&self) -> (u64, u64) {
        (self.job_engine.runs(), self.job_engine.failures())
    }

    /// Task actions run since start, and how many of them failed
    pub fn task_action_counts(&self) -> (u64, u64) {
        (self.task_engine.runs(), self.task_engine.failures())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn job_factory(&self) -> &JobFactory {
        &self.job_factory
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn resmgr(&self) -> &dyn ResourceManager {
        self.resmgr.as_ref()
    }

    /// Loads every non-terminal job and its tasks into the cache and
    /// enqueues them. Returns the number of jobs recovered.
    ///
    /// A job that fails to load is logged and skipped.
    pub async fn recover(self: &Arc<Self>) -> Result<usize, StoreError> {
        let ids = self
            .stores
            .call(self.stores.jobs().get_active_job_ids())
            .await?;
        info!("Recovering {} active job(s)", ids.len());

        let mut recovered = 0;
        for id in ids {
            match self.recover_job(id).await {
                Ok(instances) => {
                    self.enqueue_job(id, Duration::ZERO);
                    for instance_id in instances {
                        self.enqueue_task(TaskId::new(id, instance_id), Duration::ZERO);
                    }
                    recovered += 1;
                }
                Err(e) => warn!("Skipping job {} during recovery: {}", id, e),
            }
        }

        info!("Recovered {} job(s)", recovered);
        Ok(recovered)
    }

    async fn recover_job(&self, id: JobId) -> Result<Vec<u32>, CacheError> {
        let config = self.stores.call(self.stores.jobs().get_job_config(id)).await?;
        let runtime = self.stores.call(self.stores.jobs().get_job_runtime(id)).await?;
        let tasks = self
            .stores
            .call(self.stores.tasks().get_task_runtimes_for_job(id))
            .await?;

        let job = self.job_factory.add_job(id);
        job.update(
            JobInfo {
                runtime: Some(runtime),
                config: Some(config),
            },
            &ConfigAddOn::default(),
            UpdateMode::CacheOnly,
        )
        .await?;

        let instances = tasks.keys().copied().collect();
        job.update_tasks(tasks, UpdateMode::CacheOnly).await?;
        Ok(instances)
    }
}
