//! Cached entity store
//!
//! In-memory mirror of the jobs this job manager owns and their task
//! instances. Every reconciliation decision reads from here.
//!
//! Each [`CachedJob`] guards its own record and all of its tasks with one
//! async mutex, so work on different jobs never contends while writers of the
//! same job serialize. Writes go to the store first and reach the cache only
//! once the store accepted them.

pub mod factory;
pub mod job;
pub mod task;

use keel_core::domain::task::TaskId;
use thiserror::Error;

use crate::repository::StoreError;

pub use factory::JobFactory;
pub use job::CachedJob;
pub use task::CachedTask;

/// Where an update is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Only the cache; used when loading records that came from the store
    CacheOnly,
    /// Store first, then the cache
    CacheAndStore,
    /// Only the store; the cached copy is dropped and reloaded on next read
    StoreOnly,
}

impl UpdateMode {
    fn writes_store(self) -> bool {
        matches!(self, Self::CacheAndStore | Self::StoreOnly)
    }
}

/// Cache error type
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("task {0} is not in the cache")]
    TaskNotFound(TaskId),
}
