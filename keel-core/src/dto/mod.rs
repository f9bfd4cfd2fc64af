//! Data Transfer Objects for inter-service communication
//!
//! Messages exchanged between the job manager and the resource manager.

pub mod resmgr;
