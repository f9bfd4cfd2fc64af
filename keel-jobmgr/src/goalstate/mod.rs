//! Goal state reconciliation
//!
//! Two [`engine::Engine`] instances, one for jobs and one for tasks, run the
//! action bound to each entity's (state, goal) pair. Actions never enqueue
//! directly: they return follow-ups that the [`Driver`] applies once they
//! complete.

pub mod actions;
mod driver;
pub mod engine;
mod entity;
mod follow_up;
mod job_kill;
mod job_untrack;
mod task_launch_retry;
mod task_stop;

use thiserror::Error;

use crate::cached::CacheError;
use crate::repository::StoreError;

pub use driver::Driver;

/// Action error type
///
/// Returned to the engine for logging only; an action that wants another pass
/// asks for it through its follow-ups.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("resource manager request failed: {0}")]
    ResourceManager(#[from] keel_client::ClientError),

    #[error("resource manager refused to kill task: {0}")]
    KillFailed(String),
}
