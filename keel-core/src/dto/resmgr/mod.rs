//! Resource manager DTOs
//!
//! Requests the job manager sends to the resource manager to keep its
//! placement bookkeeping consistent with task runtimes.

use serde::{Deserialize, Serialize};

use crate::domain::task::TaskId;

/// Acknowledges tasks the job manager considers launched. Safe to repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkTasksLaunchedRequest {
    pub tasks: Vec<TaskId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkTasksLaunchedResponse {}

/// Asks the resource manager to drop placements and stop running instances
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillTasksRequest {
    pub tasks: Vec<TaskId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillTasksResponse {
    /// Per-task failures; tasks the resource manager does not know are not errors
    pub errors: Vec<KillTaskError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillTaskError {
    pub task_id: TaskId,
    pub message: String,
}
