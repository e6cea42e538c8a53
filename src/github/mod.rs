//! Remote hosting API (GitHub).
//!
//! Workflow commands talk to the hosting service only through
//! [`HostingApi`], so tests can substitute an in-memory fake.

pub mod client;
pub mod types;

pub use client::{GitHubClient, GITHUB_API_BASE};
pub use types::{Comment, Issue, Label, NewPullRequest, PullRequest, Repository, User};

use async_trait::async_trait;

use crate::error::HostingError;

#[async_trait]
pub trait HostingApi: Send + Sync {
    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, HostingError>;

    async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, HostingError>;

    async fn list_issue_comments(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<Comment>, HostingError>;

    async fn add_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<Comment, HostingError>;

    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        pull: &NewPullRequest,
    ) -> Result<PullRequest, HostingError>;
}

/// Splits `owner/repo`, rejecting anything else.
pub fn split_repo(full_name: &str) -> Option<(&str, &str)> {
    let (owner, repo) = full_name.trim().trim_end_matches('/').split_once('/')?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner, repo))
}
