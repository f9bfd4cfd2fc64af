//! JobKill: moves a job and every resident instance toward KILLED

use keel_core::domain::diff::RuntimeDiff;
use keel_core::domain::job::{ConfigAddOn, JobId, JobInfo, JobRuntime, JobState};
use keel_core::domain::task::{TaskId, TaskState};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use super::ActionError;
use super::driver::Driver;
use super::follow_up::FollowUps;
use crate::cached::UpdateMode;

const KILL_MESSAGE: &str = "Task stop API request";

pub(super) async fn execute(driver: &Driver, job_id: JobId) -> Result<FollowUps, ActionError> {
    let Some(job) = driver.job_factory().get_job(job_id) else {
        debug!("Job {} not in cache, nothing to kill", job_id);
        return Ok(FollowUps::none());
    };

    let runtime = job.get_runtime().await?;
    let config = job.get_config().await?;
    // A partially created job is killed through its resident instances only
    let partially_created = job.is_partially_created().await;

    // Every read happens before the first write
    let mut states: BTreeMap<u32, TaskState> = BTreeMap::new();
    for (instance_id, task) in job.get_all_tasks().await {
        states.insert(instance_id, task.get_runtime().await?.state);
    }
    if partially_created {
        debug!(
            "Job {} is partially created, killing {} of {} instance(s)",
            job_id,
            states.len(),
            config.instance_count
        );
    }

    let diffs: BTreeMap<u32, RuntimeDiff> = states
        .keys()
        .map(|&instance_id| {
            let diff = RuntimeDiff::new()
                .goal_state(TaskState::Killed)
                .message(KILL_MESSAGE)
                .reason("");
            (instance_id, diff)
        })
        .collect();

    let state = if states.values().all(|state| state.is_terminal()) {
        JobState::Killed
    } else {
        JobState::Killing
    };

    let updated = JobRuntime {
        state,
        state_version: runtime.desired_state_version,
        ..runtime
    };
    job.update(
        JobInfo {
            runtime: Some(updated),
            config: None,
        },
        &ConfigAddOn::default(),
        UpdateMode::CacheAndStore,
    )
    .await?;

    job.patch_tasks(diffs).await?;

    let mut follow_ups = FollowUps::none();
    for (&instance_id, state) in &states {
        if !state.is_terminal() {
            follow_ups.push_task(TaskId::new(job_id, instance_id), Duration::ZERO);
        }
    }
    follow_ups.push_job(job_id, driver.config().job_requeue_delay);

    info!(
        "Job {} moved to {}, {} of {} instance(s) still to stop",
        job_id,
        state,
        follow_ups.tasks.len(),
        states.len()
    );
    Ok(follow_ups)
}
