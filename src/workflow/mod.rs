//! Contribution workflow commands.
//!
//! Each command is a short sequence of git invocations, hosting API calls
//! and file writes. Commands return report structs; printing is left to
//! the CLI layer. Nothing here changes the process working directory:
//! every path is resolved against [`Workspace::cwd`].

pub mod access;
pub mod commit;
pub mod issues;
pub mod repo;
pub mod tools;

pub use access::{git_identity, init, InitReport};
pub use commit::{commit, finalize, push, CommitOutcome, CommitRequest, PushStatus};
pub use issues::{
    add_comment, create_issue_branch, create_pull_request, pull_request_body, show_issue,
    BranchOutcome, IssueDetails,
};
pub use repo::{
    checkout, clone, contribute, fetch, status, verify_access, CheckoutOutcome, CloneOutcome,
    ContributeReport, LocalTool, StatusReport,
};
pub use tools::{add_tool, quickstart, AddToolReport, QuickstartReport};

use std::path::{Path, PathBuf};

use crate::access::{AccessCodes, FileCodeStore};
use crate::config::Settings;
use crate::error::GitError;
use crate::git::{find_repo_root, Git};

/// Resolved settings plus the directory commands run from.
#[derive(Debug, Clone)]
pub struct Workspace {
    settings: Settings,
    cwd: PathBuf,
    git: Git,
}

impl Workspace {
    pub fn new(settings: Settings, cwd: impl Into<PathBuf>) -> Self {
        let cwd = cwd.into();
        Self {
            settings,
            git: Git::new(&cwd),
            cwd,
        }
    }

    /// Same settings and git executable, different working directory.
    pub fn rooted_at(&self, cwd: impl Into<PathBuf>) -> Self {
        let cwd = cwd.into();
        Self {
            settings: self.settings.clone(),
            git: self.git.at(&cwd),
            cwd,
        }
    }

    /// Uses a different git executable for every command.
    pub fn with_git_program(mut self, program: impl Into<String>) -> Self {
        self.git = self.git.with_program(program);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Git running in the working directory itself.
    pub fn git(&self) -> &Git {
        &self.git
    }

    /// Git running at the root of the repository containing the working
    /// directory.
    pub fn repo(&self) -> Result<Git, GitError> {
        find_repo_root(&self.cwd)
            .map(|root| self.git.at(root))
            .ok_or_else(|| GitError::NotARepository(self.cwd.clone()))
    }

    /// The file-backed access-code store with the configured validity.
    pub fn access_codes(&self) -> AccessCodes<FileCodeStore> {
        AccessCodes::new(FileCodeStore::new(&self.settings.codes_path))
            .with_validity(self.settings.code_validity_secs)
    }

    /// Clone URL for `repo`, authenticated when a token is configured.
    pub fn remote_url(&self, repo: &str) -> String {
        crate::git::authenticated_url(repo, self.settings.token.as_deref())
    }
}
