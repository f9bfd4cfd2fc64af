//! Task domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::job::{JobId, UnknownStateError};

/// Version reported when the current or desired config version is not known
pub const UNKNOWN_VERSION: u64 = u64::MAX;

/// Identity of a task instance: owning job plus instance index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId {
    pub job_id: JobId,
    pub instance_id: u32,
}

impl TaskId {
    pub fn new(job_id: JobId, instance_id: u32) -> Self {
        Self {
            job_id,
            instance_id,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.job_id, self.instance_id)
    }
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Unknown,
    Initialized,
    Pending,
    Ready,
    Placing,
    Placed,
    Launching,
    Launched,
    Starting,
    Running,
    Succeeded,
    Failed,
    Lost,
    Preempting,
    Killing,
    Killed,
}

impl TaskState {
    /// A terminal instance has nothing left to converge.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Killed | Self::Lost
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Initialized => "INITIALIZED",
            Self::Pending => "PENDING",
            Self::Ready => "READY",
            Self::Placing => "PLACING",
            Self::Placed => "PLACED",
            Self::Launching => "LAUNCHING",
            Self::Launched => "LAUNCHED",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Lost => "LOST",
            Self::Preempting => "PREEMPTING",
            Self::Killing => "KILLING",
            Self::Killed => "KILLED",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = UnknownStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let state = match s {
            "UNKNOWN" => Self::Unknown,
            "INITIALIZED" => Self::Initialized,
            "PENDING" => Self::Pending,
            "READY" => Self::Ready,
            "PLACING" => Self::Placing,
            "PLACED" => Self::Placed,
            "LAUNCHING" => Self::Launching,
            "LAUNCHED" => Self::Launched,
            "STARTING" => Self::Starting,
            "RUNNING" => Self::Running,
            "SUCCEEDED" => Self::Succeeded,
            "FAILED" => Self::Failed,
            "LOST" => Self::Lost,
            "PREEMPTING" => Self::Preempting,
            "KILLING" => Self::Killing,
            "KILLED" => Self::Killed,
            other => return Err(UnknownStateError(other.to_string())),
        };
        Ok(state)
    }
}

/// Identifier a worker host uses for one launch attempt of an instance
///
/// Formatted as `<job id>-<instance>-<uuid>`. Every launch attempt gets a new
/// one so that messages about an earlier attempt can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerTaskId(pub String);

impl WorkerTaskId {
    pub fn generate(task_id: TaskId) -> Self {
        Self(format!("{}-{}", task_id, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Runtime record of a task instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRuntime {
    pub state: TaskState,
    pub goal_state: TaskState,
    pub config_version: u64,
    pub desired_config_version: u64,
    pub worker_task_id: Option<WorkerTaskId>,
    pub message: String,
    pub reason: String,
}

impl TaskRuntime {
    /// Runtime of an instance that was just persisted
    pub fn initialized(task_id: TaskId, goal_state: TaskState, config_version: u64) -> Self {
        Self {
            state: TaskState::Initialized,
            goal_state,
            config_version,
            desired_config_version: config_version,
            worker_task_id: Some(WorkerTaskId::generate(task_id)),
            message: String::new(),
            reason: String::new(),
        }
    }
}

/// A task instance as read from the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub job_id: JobId,
    pub instance_id: u32,
    pub runtime: TaskRuntime,
}

/// Actual or goal state of a task together with its config version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskStateVector {
    pub state: TaskState,
    pub config_version: u64,
}

impl TaskStateVector {
    pub fn unknown() -> Self {
        Self {
            state: TaskState::Unknown,
            config_version: UNKNOWN_VERSION,
        }
    }
}
