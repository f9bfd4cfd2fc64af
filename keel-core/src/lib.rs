//! Keel Core
//!
//! Core types shared by the Keel job manager and its collaborators.
//!
//! This crate contains:
//! - Domain types: jobs, tasks, their runtimes and the sparse runtime diff
//! - DTOs: messages exchanged with the resource manager

pub mod domain;
pub mod dto;
