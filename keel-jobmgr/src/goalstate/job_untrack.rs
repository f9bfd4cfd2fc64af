//! JobUntrack: evicts a terminal job once every instance is terminal

use keel_core::domain::job::JobId;
use tracing::{debug, info};

use super::ActionError;
use super::driver::Driver;
use super::follow_up::FollowUps;

pub(super) async fn execute(driver: &Driver, job_id: JobId) -> Result<FollowUps, ActionError> {
    let Some(job) = driver.job_factory().get_job(job_id) else {
        return Ok(FollowUps::none());
    };

    let tasks = job.get_all_tasks().await;
    for task in tasks.values() {
        let runtime = task.get_runtime().await?;
        if !runtime.state.is_terminal() {
            debug!(
                "Job {} has instance {} in {}, keeping it tracked",
                job_id,
                task.instance_id(),
                runtime.state
            );
            return Ok(FollowUps::job(job_id, driver.config().job_requeue_delay));
        }
    }

    for task in tasks.values() {
        driver.delete_task(task.id());
    }
    driver.delete_job(job_id);
    driver.job_factory().clear_job(job_id);

    info!("Untracked job {} with {} instance(s)", job_id, tasks.len());
    Ok(FollowUps::none())
}
