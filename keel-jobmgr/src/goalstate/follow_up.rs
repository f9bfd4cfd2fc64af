use keel_core::domain::job::JobId;
use keel_core::domain::task::TaskId;
use std::time::Duration;

/// Enqueue requests returned by an action, applied after it completes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowUps {
    pub jobs: Vec<(JobId, Duration)>,
    pub tasks: Vec<(TaskId, Duration)>,
}

impl FollowUps {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn job(id: JobId, delay: Duration) -> Self {
        Self {
            jobs: vec![(id, delay)],
            tasks: Vec::new(),
        }
    }

    pub fn task(id: TaskId, delay: Duration) -> Self {
        Self {
            jobs: Vec::new(),
            tasks: vec![(id, delay)],
        }
    }

    pub fn push_job(&mut self, id: JobId, delay: Duration) {
        self.jobs.push((id, delay));
    }

    pub fn push_task(&mut self, id: TaskId, delay: Duration) {
        self.tasks.push((id, delay));
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.tasks.is_empty()
    }
}
