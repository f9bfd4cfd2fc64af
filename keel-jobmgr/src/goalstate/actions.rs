//! Action selection
//!
//! Maps the (state, goal) pair of a job or task to the action that moves it
//! forward.

use keel_core::domain::job::{JobId, JobState};
use keel_core::domain::task::{TaskId, TaskState};

use super::driver::Driver;
use super::follow_up::FollowUps;
use super::{ActionError, job_kill, job_untrack, task_launch_retry, task_stop};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    NoAction,
    Kill,
    Untrack,
}

impl JobAction {
    pub fn name(self) -> &'static str {
        match self {
            Self::NoAction => "NoAction",
            Self::Kill => "JobKill",
            Self::Untrack => "JobUntrack",
        }
    }

    pub async fn execute(self, driver: &Driver, id: JobId) -> Result<FollowUps, ActionError> {
        match self {
            Self::NoAction => Ok(FollowUps::none()),
            Self::Kill => job_kill::execute(driver, id).await,
            Self::Untrack => job_untrack::execute(driver, id).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    NoAction,
    Stop,
    LaunchRetry,
}

impl TaskAction {
    pub fn name(self) -> &'static str {
        match self {
            Self::NoAction => "NoAction",
            Self::Stop => "TaskStop",
            Self::LaunchRetry => "TaskLaunchRetry",
        }
    }

    pub async fn execute(self, driver: &Driver, id: TaskId) -> Result<FollowUps, ActionError> {
        match self {
            Self::NoAction => Ok(FollowUps::none()),
            Self::Stop => task_stop::execute(driver, id).await,
            Self::LaunchRetry => task_launch_retry::execute(driver, id).await,
        }
    }
}

pub fn job_action_for(state: JobState, goal: JobState) -> JobAction {
    if state.is_terminal() {
        JobAction::Untrack
    } else if goal == JobState::Killed {
        JobAction::Kill
    } else {
        JobAction::NoAction
    }
}

pub fn task_action_for(state: TaskState, goal: TaskState) -> TaskAction {
    if state.is_terminal() {
        return TaskAction::NoAction;
    }
    if goal == TaskState::Killed {
        return TaskAction::Stop;
    }
    match state {
        TaskState::Launched | TaskState::Starting => TaskAction::LaunchRetry,
        _ => TaskAction::NoAction,
    }
}

/// Action for a job; `NoAction` when it is not resident
pub async fn select_job_action(driver: &Driver, id: JobId) -> Result<JobAction, ActionError> {
    let Some(job) = driver.job_factory().get_job(id) else {
        return Ok(JobAction::NoAction);
    };

    let runtime = job.get_runtime().await?;
    Ok(job_action_for(runtime.state, runtime.goal_state))
}

/// Action for a task; `NoAction` when it or its job is not resident
pub async fn select_task_action(driver: &Driver, id: TaskId) -> Result<TaskAction, ActionError> {
    let Some(job) = driver.job_factory().get_job(id.job_id) else {
        return Ok(TaskAction::NoAction);
    };
    let Some(task) = job.get_task(id.instance_id).await else {
        return Ok(TaskAction::NoAction);
    };

    let runtime = task.get_runtime().await?;
    Ok(task_action_for(runtime.state, runtime.goal_state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_action_selection() {
        assert_eq!(
            job_action_for(JobState::Killed, JobState::Killed),
            JobAction::Untrack
        );
        assert_eq!(
            job_action_for(JobState::Succeeded, JobState::Succeeded),
            JobAction::Untrack
        );
        assert_eq!(
            job_action_for(JobState::Running, JobState::Killed),
            JobAction::Kill
        );
        assert_eq!(
            job_action_for(JobState::Killing, JobState::Killed),
            JobAction::Kill
        );
        assert_eq!(
            job_action_for(JobState::Running, JobState::Succeeded),
            JobAction::NoAction
        );
    }

    #[test]
    fn test_task_action_selection() {
        assert_eq!(
            task_action_for(TaskState::Failed, TaskState::Killed),
            TaskAction::NoAction
        );
        assert_eq!(
            task_action_for(TaskState::Running, TaskState::Killed),
            TaskAction::Stop
        );
        assert_eq!(
            task_action_for(TaskState::Launched, TaskState::Killed),
            TaskAction::Stop
        );
        assert_eq!(
            task_action_for(TaskState::Launched, TaskState::Running),
            TaskAction::LaunchRetry
        );
        assert_eq!(
            task_action_for(TaskState::Starting, TaskState::Succeeded),
            TaskAction::LaunchRetry
        );
        assert_eq!(
            task_action_for(TaskState::Running, TaskState::Succeeded),
            TaskAction::NoAction
        );
    }
}
