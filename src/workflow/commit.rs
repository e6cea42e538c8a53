//! Staging, committing and pushing.

use anyhow::{bail, Context};
use regex::Regex;
use tracing::{info, warn};

use super::Workspace;
use crate::git::Git;

/// Options for [`commit`].
#[derive(Debug, Clone, Default)]
pub struct CommitRequest {
    pub message: String,
    /// Stage everything (the default when no pattern is given).
    pub all: bool,
    /// Stage only changed paths matching this regex.
    pub pattern: Option<String>,
    /// Appends ` (#N)` to the message.
    pub issue: Option<u64>,
    pub push: bool,
}

/// What happened to an optional push after a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    NotRequested,
    Pushed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The working tree was clean.
    NothingToCommit,
    Committed {
        message: String,
        branch: String,
        /// Paths staged by pattern; empty when everything was staged.
        staged: Vec<String>,
        push: PushStatus,
    },
}

pub fn commit_message(message: &str, issue: Option<u64>) -> String {
    match issue {
        Some(n) => format!("{} (#{})", message, n),
        None => message.to_string(),
    }
}

/// Commits pending changes in the current repository.
///
/// A push failure after a successful commit is reported in the outcome and
/// does not fail the command.
pub async fn commit(workspace: &Workspace, request: &CommitRequest) -> anyhow::Result<CommitOutcome> {
    let pattern = request
        .pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("Invalid --pattern regex")?;

    let git = workspace.repo()?;
    let changes = git.status().await?;
    if changes.is_empty() {
        info!("no changes to commit");
        return Ok(CommitOutcome::NothingToCommit);
    }

    let staged = match pattern.filter(|_| !request.all) {
        Some(re) => {
            let matching: Vec<String> = changes
                .iter()
                .filter(|entry| re.is_match(&entry.path))
                .map(|entry| entry.path.clone())
                .collect();
            if matching.is_empty() {
                bail!(
                    "No changed files match pattern '{}'",
                    request.pattern.as_deref().unwrap_or_default()
                );
            }
            git.add(&matching).await?;
            matching
        }
        None => {
            git.add_all().await?;
            Vec::new()
        }
    };

    let message = commit_message(&request.message, request.issue);
    git.commit(&message).await?;
    let branch = git.current_branch().await?;
    info!(%branch, %message, "committed");

    let push = if request.push {
        push_branch(&git, &branch).await
    } else {
        PushStatus::NotRequested
    };

    Ok(CommitOutcome::Committed {
        message,
        branch,
        staged,
        push,
    })
}

pub(crate) async fn push_branch(git: &Git, branch: &str) -> PushStatus {
    match git.push_upstream(branch).await {
        Ok(()) => PushStatus::Pushed,
        Err(e) => {
            warn!(error = %e, "push failed");
            PushStatus::Failed(e.to_string())
        }
    }
}

/// Stages everything and commits, without pushing.
pub async fn finalize(
    workspace: &Workspace,
    message: &str,
    issue: Option<u64>,
) -> anyhow::Result<CommitOutcome> {
    commit(
        workspace,
        &CommitRequest {
            message: message.to_string(),
            all: true,
            issue,
            ..CommitRequest::default()
        },
    )
    .await
}

/// Pushes the current branch, setting its upstream. Returns the branch.
pub async fn push(workspace: &Workspace) -> anyhow::Result<String> {
    let git = workspace.repo()?;
    let branch = git.current_branch().await?;
    git.push_upstream(&branch)
        .await
        .with_context(|| format!("Failed to push {}", branch))?;
    Ok(branch)
}
