//! Error types for xwgit operations.
//!
//! Defines error types for each subsystem:
//! - Access-code issuance and redemption
//! - Configuration resolution
//! - Git subprocess execution
//! - Hosting API interactions
//! - Tool scaffolding

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while issuing or redeeming access codes.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Access code '{0}' was never issued or has already been used")]
    CodeNotFound(String),

    #[error("Access code '{code}' expired at {expired_at} (unix seconds)")]
    CodeExpired { code: String, expired_at: i64 },

    #[error("Access code store at '{}' is unavailable: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Access code store at '{}' is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Could not draw an unused access code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: usize },

    #[error("Owner name must not be empty")]
    EmptyOwner,
}

impl AccessError {
    /// Whether the failure is a redemption the user can recover from by
    /// requesting a fresh code.
    pub fn is_rejected_code(&self) -> bool {
        matches!(
            self,
            AccessError::CodeNotFound(_) | AccessError::CodeExpired { .. }
        )
    }
}

/// Errors that can occur while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting '{key}' (set {env_var} or run `xwgit config set {key} <value>`)")]
    Missing { key: String, env_var: String },

    #[error("Invalid value '{value}' for setting '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Unknown setting '{0}'")]
    UnknownKey(String),

    #[error("Failed to read config file '{}': {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while running git.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to spawn git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("git {args} failed: {stderr}")]
    CommandFailed { args: String, stderr: String },

    #[error("Not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("No files found for '{0}'")]
    NothingFetched(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while talking to the hosting API.
#[derive(Debug, Error)]
pub enum HostingError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Authentication rejected by the hosting API")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),
}

/// Errors that can occur while scaffolding tool files.
#[derive(Debug, Error)]
pub enum ScaffoldError {
    #[error("Invalid tool name '{0}': only lowercase letters, digits, '-' and '_' are allowed")]
    InvalidName(String),

    #[error("Invalid category '{category}'. Valid categories: {valid}")]
    InvalidCategory { category: String, valid: String },

    #[error("Invalid tool path '{0}': expected 'category/name'")]
    InvalidPath(String),

    #[error("Tera template rendering error: {0}")]
    Tera(#[from] tera::Error),

    #[error("Failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
