//! Job and task entities
//!
//! Identity plus a driver handle. Running an entity picks the action for its
//! current state, executes it and hands the follow-ups to the driver.

use async_trait::async_trait;
use keel_core::domain::job::JobId;
use keel_core::domain::task::TaskId;
use std::sync::Arc;
use tracing::debug;

use super::actions;
use super::driver::Driver;
use super::engine::Entity;
use super::ActionError;

#[derive(Clone)]
pub struct JobEntity {
    id: JobId,
    driver: Arc<Driver>,
}

impl JobEntity {
    pub fn new(id: JobId, driver: Arc<Driver>) -> Self {
        Self { id, driver }
    }
}

#[async_trait]
impl Entity for JobEntity {
    type Id = JobId;

    fn id(&self) -> JobId {
        self.id
    }

    async fn run(&self) -> Result<(), ActionError> {
        let action = actions::select_job_action(&self.driver, self.id).await?;
        debug!(job_id = %self.id, action = action.name(), "Running job action");

        let follow_ups = action.execute(&self.driver, self.id).await?;
        self.driver.apply(follow_ups);
        Ok(())
    }
}

#[derive(Clone)]
pub struct TaskEntity {
    id: TaskId,
    driver: Arc<Driver>,
}

impl TaskEntity {
    pub fn new(id: TaskId, driver: Arc<Driver>) -> Self {
        Self { id, driver }
    }
}

#[async_trait]
impl Entity for TaskEntity {
    type Id = TaskId;

    fn id(&self) -> TaskId {
        self.id
    }

    async fn run(&self) -> Result<(), ActionError> {
        let action = actions::select_task_action(&self.driver, self.id).await?;
        debug!(task_id = %self.id, action = action.name(), "Running task action");

        if let Some(job) = self.driver.job_factory().get_job(self.id.job_id) {
            if let Some(task) = job.get_task(self.id.instance_id).await {
                task.set_last_action(action.name()).await;
            }
        }

        let follow_ups = action.execute(&self.driver, self.id).await?;
        self.driver.apply(follow_ups);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use keel_core::domain::job::JobState;
    use keel_core::domain::task::TaskState;

    #[tokio::test]
    async fn test_task_run_records_last_action_and_applies_follow_ups() {
        let h = Harness::new();
        let job_id = h
            .seed_batch_job(
                JobState::Running,
                JobState::Succeeded,
                &[(TaskState::Starting, TaskState::Running)],
            )
            .await;
        let task_id = TaskId::new(job_id, 0);

        TaskEntity::new(task_id, Arc::clone(&h.driver))
            .run()
            .await
            .unwrap();

        let job = h.driver.job_factory().get_job(job_id).unwrap();
        let task = job.get_task(0).await.unwrap();
        let (name, _) = task.last_action().await.unwrap();
        assert_eq!(name, "TaskLaunchRetry");
        assert!(h.driver.is_task_scheduled(task_id));
        assert!(h.driver.is_job_scheduled(job_id));
    }

    #[tokio::test]
    async fn test_job_run_for_unknown_job_is_a_no_op() {
        let h = Harness::new();

        JobEntity::new(JobId::new(), Arc::clone(&h.driver))
            .run()
            .await
            .unwrap();

        assert_eq!(h.driver.job_queue_length(), 0);
        assert_eq!(h.store.total_calls(), 0);
    }
}
