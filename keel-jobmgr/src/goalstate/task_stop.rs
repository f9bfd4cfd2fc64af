//! TaskStop: brings a task whose goal is KILLED to a stop

use keel_core::domain::task::{TaskId, TaskRuntime, TaskState};
use keel_core::dto::resmgr::KillTasksRequest;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use super::ActionError;
use super::driver::Driver;
use super::follow_up::FollowUps;
use crate::cached::{CachedJob, UpdateMode};

pub(super) async fn execute(driver: &Driver, task_id: TaskId) -> Result<FollowUps, ActionError> {
    let Some(job) = driver.job_factory().get_job(task_id.job_id) else {
        return Ok(FollowUps::none());
    };
    let Some(task) = job.get_task(task_id.instance_id).await else {
        return Ok(FollowUps::none());
    };

    let runtime = task.get_runtime().await?;
    let requeue_delay = driver.config().task_requeue_delay;

    match runtime.state {
        TaskState::Succeeded | TaskState::Failed | TaskState::Lost | TaskState::Killed => {
            Ok(FollowUps::none())
        }
        TaskState::Unknown | TaskState::Initialized => {
            write_state(&job, task_id, runtime, TaskState::Killed, "Task killed before placement")
                .await?;
            Ok(FollowUps::job(task_id.job_id, Duration::ZERO))
        }
        TaskState::Pending
        | TaskState::Ready
        | TaskState::Placing
        | TaskState::Placed
        | TaskState::Launching => {
            kill_placement(driver, task_id).await?;
            write_state(&job, task_id, runtime, TaskState::Killed, "Task killed before launch")
                .await?;
            Ok(FollowUps::job(task_id.job_id, Duration::ZERO))
        }
        TaskState::Launched
        | TaskState::Starting
        | TaskState::Running
        | TaskState::Preempting => {
            kill_placement(driver, task_id).await?;
            write_state(&job, task_id, runtime, TaskState::Killing, "Killing the task").await?;
            Ok(FollowUps::task(task_id, requeue_delay))
        }
        TaskState::Killing => {
            debug!("Task {} is still being killed", task_id);
            Ok(FollowUps::task(task_id, requeue_delay))
        }
    }
}

async fn kill_placement(driver: &Driver, task_id: TaskId) -> Result<(), ActionError> {
    let response = match driver
        .resmgr()
        .kill_tasks(KillTasksRequest {
            tasks: vec![task_id],
        })
        .await
    {
        Ok(response) => response,
        Err(e) if e.is_not_found() => {
            debug!("Task {} unknown to the resource manager, already gone", task_id);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    match response.errors.into_iter().find(|e| e.task_id == task_id) {
        Some(e) => Err(ActionError::KillFailed(format!("{}: {}", task_id, e.message))),
        None => Ok(()),
    }
}

async fn write_state(
    job: &CachedJob,
    task_id: TaskId,
    mut runtime: TaskRuntime,
    state: TaskState,
    message: &str,
) -> Result<(), ActionError> {
    info!("Task {} {} -> {}", task_id, runtime.state, state);
    runtime.state = state;
    runtime.message = message.to_string();
    job.update_tasks(
        BTreeMap::from([(task_id.instance_id, runtime)]),
        UpdateMode::CacheAndStore,
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use keel_core::domain::job::JobState;

    async fn seed(h: &Harness, state: TaskState) -> TaskId {
        let id = h
            .seed_batch_job(JobState::Killing, JobState::Killed, &[(state, TaskState::Killed)])
            .await;
        TaskId::new(id, 0)
    }

    #[tokio::test]
    async fn test_initialized_task_is_killed_without_resource_manager() {
        let h = Harness::new();
        let task_id = seed(&h, TaskState::Initialized).await;

        let follow_ups = execute(&h.driver, task_id).await.unwrap();

        assert_eq!(h.store.task_runtime(task_id).unwrap().state, TaskState::Killed);
        assert!(h.resmgr.kill_calls().is_empty());
        assert_eq!(follow_ups, FollowUps::job(task_id.job_id, Duration::ZERO));
    }

    #[tokio::test]
    async fn test_placed_task_is_released_and_killed() {
        let h = Harness::new();
        let task_id = seed(&h, TaskState::Placed).await;

        execute(&h.driver, task_id).await.unwrap();

        assert_eq!(h.resmgr.kill_calls().len(), 1);
        assert_eq!(h.store.task_runtime(task_id).unwrap().state, TaskState::Killed);
    }

    #[tokio::test]
    async fn test_running_task_moves_to_killing() {
        let h = Harness::new();
        let task_id = seed(&h, TaskState::Running).await;

        let follow_ups = execute(&h.driver, task_id).await.unwrap();

        let calls = h.resmgr.kill_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tasks, vec![task_id]);
        assert_eq!(h.store.task_runtime(task_id).unwrap().state, TaskState::Killing);
        assert_eq!(
            follow_ups,
            FollowUps::task(task_id, h.driver.config().task_requeue_delay)
        );
    }

    #[tokio::test]
    async fn test_kill_rpc_failure_leaves_task_untouched() {
        let h = Harness::new();
        let task_id = seed(&h, TaskState::Running).await;
        h.resmgr.set_unavailable();

        let result = execute(&h.driver, task_id).await;

        assert!(matches!(result, Err(ActionError::ResourceManager(_))));
        assert_eq!(h.store.task_runtime(task_id).unwrap().state, TaskState::Running);
        assert_eq!(h.store.call_count("update_task_runtime"), 0);
    }

    #[tokio::test]
    async fn test_task_unknown_to_resource_manager_is_stopped() {
        let h = Harness::new();
        let task_id = seed(&h, TaskState::Running).await;
        h.resmgr.fail_with(404, "no such task");

        let follow_ups = execute(&h.driver, task_id).await.unwrap();

        assert_eq!(h.resmgr.kill_calls().len(), 1);
        assert_eq!(h.store.task_runtime(task_id).unwrap().state, TaskState::Killing);
        assert_eq!(
            follow_ups,
            FollowUps::task(task_id, h.driver.config().task_requeue_delay)
        );
    }

    #[tokio::test]
    async fn test_rejected_kill_is_an_error() {
        let h = Harness::new();
        let task_id = seed(&h, TaskState::Starting).await;
        h.resmgr.reject_kill(task_id, "placement is locked");

        let result = execute(&h.driver, task_id).await;

        assert!(matches!(result, Err(ActionError::KillFailed(_))));
        assert_eq!(h.store.task_runtime(task_id).unwrap().state, TaskState::Starting);
    }

    #[tokio::test]
    async fn test_killing_and_terminal_tasks() {
        let h = Harness::new();
        let killing = seed(&h, TaskState::Killing).await;
        let failed = seed(&h, TaskState::Failed).await;

        let follow_ups = execute(&h.driver, killing).await.unwrap();
        assert_eq!(follow_ups.tasks.len(), 1);

        let follow_ups = execute(&h.driver, failed).await.unwrap();
        assert!(follow_ups.is_empty());

        assert!(h.resmgr.kill_calls().is_empty());
        assert_eq!(h.store.call_count("update_task_runtime"), 0);
    }
}
