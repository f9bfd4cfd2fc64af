//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Globally unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Unknown,
    Initialized,
    Pending,
    Running,
    Succeeded,
    Failed,
    Killing,
    Killed,
}

impl JobState {
    /// A terminal job never transitions again without being re-created.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Killed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Initialized => "INITIALIZED",
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Killing => "KILLING",
            Self::Killed => "KILLED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = UnknownStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNKNOWN" => Ok(Self::Unknown),
            "INITIALIZED" => Ok(Self::Initialized),
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "SUCCEEDED" => Ok(Self::Succeeded),
            "FAILED" => Ok(Self::Failed),
            "KILLING" => Ok(Self::Killing),
            "KILLED" => Ok(Self::Killed),
            other => Err(UnknownStateError(other.to_string())),
        }
    }
}

/// Returned when a persisted state string does not name a known state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStateError(pub String);

impl fmt::Display for UnknownStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown state '{}'", self.0)
    }
}

impl std::error::Error for UnknownStateError {}

/// Kind of workload a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobType {
    /// Instances run to completion
    #[default]
    Batch,
    /// Instances are expected to run forever
    Service,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Batch => "BATCH",
            Self::Service => "SERVICE",
        }
    }
}

impl FromStr for JobType {
    type Err = UnknownStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BATCH" => Ok(Self::Batch),
            "SERVICE" => Ok(Self::Service),
            other => Err(UnknownStateError(other.to_string())),
        }
    }
}

/// Scheduling constraints attached to a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sla {
    pub priority: u32,
    pub preemptible: bool,
    /// Zero means unbounded
    pub maximum_running_instances: u32,
}

/// Declared job configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub job_type: JobType,
    pub instance_count: u32,
    pub sla: Sla,
    pub config_version: u64,
}

/// Extra data persisted alongside a job configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigAddOn {
    pub system_labels: HashMap<String, String>,
}

/// Job runtime record
///
/// `state_version` never decreases; `desired_state_version` is bumped when the
/// goal changes and copied into `state_version` once the job catches up.
/// `revision` counts accepted runtime mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRuntime {
    pub state: JobState,
    pub goal_state: JobState,
    pub state_version: u64,
    pub desired_state_version: u64,
    pub revision: u64,
    pub creation_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl JobRuntime {
    /// Runtime of a freshly submitted job
    pub fn initialized(goal_state: JobState) -> Self {
        let now = Utc::now();
        Self {
            state: JobState::Initialized,
            goal_state,
            state_version: 0,
            desired_state_version: 0,
            revision: 0,
            creation_time: now,
            update_time: now,
        }
    }
}

/// Partial job record used for updates
///
/// Absent parts are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobInfo {
    pub runtime: Option<JobRuntime>,
    pub config: Option<JobConfig>,
}
