//! Internal implementation modules for `wheelwright-core`.
//!
//! Callers go through the re-exports in the crate root.

pub mod build;
pub mod commands;
pub mod config;
pub mod github;
pub mod index;
pub mod layout;
pub mod pipeline;
pub mod planning;
pub mod publish;
pub mod runtime;
pub mod tooling;
pub mod wheel;
