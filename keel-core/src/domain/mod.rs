//! Core domain types
//!
//! Jobs own a sparse set of task instances. Both carry a runtime record with
//! an actual state and a goal state; the job manager drives the former toward
//! the latter.

pub mod diff;
pub mod job;
pub mod task;
