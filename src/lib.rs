//! xwgit: a scripted GitHub contribution workflow.
//!
//! This library provides single-use access codes, layered configuration,
//! a thin git wrapper with sparse fetching, a GitHub REST client, tool
//! scaffolding and the workflow commands built on top of them.

pub mod access;
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod github;
pub mod scaffold;
pub mod workflow;

// Re-export commonly used error types
pub use error::{AccessError, ConfigError, GitError, HostingError, ScaffoldError};
