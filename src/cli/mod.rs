//! Command-line interface for xwgit.
//!
//! Provides commands for access codes, repository acquisition, tool
//! scaffolding, commits, issues and pull requests.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
