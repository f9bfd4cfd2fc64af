//! TaskLaunchRetry: detects launches that never made progress
//!
//! A task in LAUNCHED or STARTING whose runtime has not changed for longer
//! than the launch timeout is sent back to INITIALIZED with a fresh worker
//! task id. Fresh LAUNCHED tasks are acknowledged to the resource manager.
//! The goal state is never touched.

use chrono::Utc;
use keel_core::domain::diff::RuntimeDiff;
use keel_core::domain::job::JobType;
use keel_core::domain::task::{TaskId, TaskState, WorkerTaskId};
use keel_core::dto::resmgr::MarkTasksLaunchedRequest;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::ActionError;
use super::driver::Driver;
use super::follow_up::FollowUps;
use crate::cached::CachedJob;

const RESCHEDULE_MESSAGE: &str = "Rescheduled after task launch timeout";

pub(super) async fn execute(driver: &Driver, task_id: TaskId) -> Result<FollowUps, ActionError> {
    let Some(job) = driver.job_factory().get_job(task_id.job_id) else {
        return Ok(FollowUps::none());
    };
    let Some(task) = job.get_task(task_id.instance_id).await else {
        return Ok(FollowUps::none());
    };

    let runtime = task.get_runtime().await?;
    if !matches!(runtime.state, TaskState::Launched | TaskState::Starting) {
        debug!(
            "Task {} is {}, not waiting on a launch; re-enqueueing",
            task_id, runtime.state
        );
        return Ok(requeue(driver, &job, task_id).await);
    }

    let Some(last_update) = task.last_runtime_update_time().await else {
        return Ok(FollowUps::none());
    };
    let elapsed = (Utc::now() - last_update)
        .to_std()
        .unwrap_or(Duration::ZERO);

    if elapsed < driver.config().launch_timeout {
        if runtime.state == TaskState::Launched {
            let req = MarkTasksLaunchedRequest {
                tasks: vec![task_id],
            };
            match driver.resmgr().mark_tasks_launched(req).await {
                Ok(_) => {}
                Err(e) if e.is_timeout() || e.is_server_error() => {
                    debug!(
                        "Resource manager unavailable, launch of task {} acknowledged on a later pass: {}",
                        task_id, e
                    );
                }
                Err(e) => warn!("Failed to acknowledge launch of task {}: {}", task_id, e),
            }
        }
        return Ok(requeue(driver, &job, task_id).await);
    }

    info!(
        "Task {} stuck in {} for {:?}, rescheduling",
        task_id, runtime.state, elapsed
    );

    // The cached copy may be stale; the stored record decides
    let stores = driver.stores();
    let stored = stores
        .call(stores.tasks().get_task_by_id(task_id))
        .await?
        .runtime;
    if !matches!(stored.state, TaskState::Launched | TaskState::Starting) {
        debug!(
            "Task {} is {} in the store, launch already progressed",
            task_id, stored.state
        );
        return Ok(requeue(driver, &job, task_id).await);
    }

    // GoalState is never part of this write
    let diff = RuntimeDiff::new()
        .state(TaskState::Initialized)
        .worker_task_id(Some(WorkerTaskId::generate(task_id)))
        .message(RESCHEDULE_MESSAGE);
    job.patch_tasks(BTreeMap::from([(task_id.instance_id, diff)]))
        .await?;

    let mut follow_ups = FollowUps::task(task_id, Duration::ZERO);
    follow_ups.push_job(task_id.job_id, Duration::ZERO);
    Ok(follow_ups)
}

/// Looks at the task again later. Batch jobs are re-enqueued too so the
/// job-level pass sees the task's progress.
async fn requeue(driver: &Driver, job: &CachedJob, task_id: TaskId) -> FollowUps {
    let config = driver.config();
    let mut follow_ups = FollowUps::task(task_id, config.task_requeue_delay);
    if job.get_job_type().await == JobType::Batch {
        follow_ups.push_job(task_id.job_id, config.job_requeue_delay);
    }
    follow_ups
}
