//! Sparse task runtime patches
//!
//! A [`RuntimeDiff`] names the runtime fields to overwrite and their new
//! values. Applying a diff only assigns, so applying it twice leaves the
//! record exactly as applying it once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::task::{TaskRuntime, TaskState, WorkerTaskId};

/// Patchable task runtime field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RuntimeField {
    State,
    GoalState,
    ConfigVersion,
    DesiredConfigVersion,
    WorkerTaskId,
    Message,
    Reason,
}

/// New value for a single field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    State(TaskState),
    GoalState(TaskState),
    ConfigVersion(u64),
    DesiredConfigVersion(u64),
    WorkerTaskId(Option<WorkerTaskId>),
    Message(String),
    Reason(String),
}

impl FieldValue {
    pub fn field(&self) -> RuntimeField {
        match self {
            Self::State(_) => RuntimeField::State,
            Self::GoalState(_) => RuntimeField::GoalState,
            Self::ConfigVersion(_) => RuntimeField::ConfigVersion,
            Self::DesiredConfigVersion(_) => RuntimeField::DesiredConfigVersion,
            Self::WorkerTaskId(_) => RuntimeField::WorkerTaskId,
            Self::Message(_) => RuntimeField::Message,
            Self::Reason(_) => RuntimeField::Reason,
        }
    }
}

/// Field-level patch for one task runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeDiff {
    fields: BTreeMap<RuntimeField, FieldValue>,
}

impl RuntimeDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing any earlier value for the same field.
    pub fn set(mut self, value: FieldValue) -> Self {
        self.fields.insert(value.field(), value);
        self
    }

    pub fn state(self, state: TaskState) -> Self {
        self.set(FieldValue::State(state))
    }

    pub fn goal_state(self, state: TaskState) -> Self {
        self.set(FieldValue::GoalState(state))
    }

    pub fn message(self, message: impl Into<String>) -> Self {
        self.set(FieldValue::Message(message.into()))
    }

    pub fn reason(self, reason: impl Into<String>) -> Self {
        self.set(FieldValue::Reason(reason.into()))
    }

    pub fn worker_task_id(self, id: Option<WorkerTaskId>) -> Self {
        self.set(FieldValue::WorkerTaskId(id))
    }

    pub fn get(&self, field: RuntimeField) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    pub fn values(&self) -> impl Iterator<Item = &FieldValue> {
        self.fields.values()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn apply(&self, runtime: &mut TaskRuntime) {
        for value in self.fields.values() {
            match value {
                FieldValue::State(state) => runtime.state = *state,
                FieldValue::GoalState(state) => runtime.goal_state = *state,
                FieldValue::ConfigVersion(v) => runtime.config_version = *v,
                FieldValue::DesiredConfigVersion(v) => runtime.desired_config_version = *v,
                FieldValue::WorkerTaskId(id) => runtime.worker_task_id = id.clone(),
                FieldValue::Message(m) => runtime.message = m.clone(),
                FieldValue::Reason(r) => runtime.reason = r.clone(),
            }
        }
    }
}
