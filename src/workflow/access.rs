//! Redeeming an access code into a ready-to-use working copy.

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use super::Workspace;
use crate::access::{AccessCodes, CodeStore};
use super::repo::verify_access;
use crate::git::{clone_repo, CloneOptions};
use crate::github::HostingApi;

/// Git identity for a contributor: `AI-<name>` and
/// `<name lowercased>@<domain>`, whitespace in the name becoming `-`.
pub fn git_identity(owner: &str, email_domain: &str) -> (String, String) {
    let local: String = owner
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase();
    (
        format!("AI-{}", owner.trim()),
        format!("{}@{}", local, email_domain),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub owner: String,
    pub repo_dir: PathBuf,
    pub cloned: bool,
    pub user_name: String,
    pub user_email: String,
}

/// Redeems `code`, clones the configured repository into `dir` (default:
/// the repository name) unless a clone is already there, and sets the
/// local git identity for the code's owner.
///
/// Redemption happens first; a rejected code fails before any git work.
/// When `api` is given, repository access is checked before cloning.
pub async fn init<S: CodeStore>(
    workspace: &Workspace,
    api: Option<&dyn HostingApi>,
    codes: &AccessCodes<S>,
    code: &str,
    dir: Option<&str>,
) -> anyhow::Result<InitReport> {
    let owner = codes.redeem(code)?;
    let settings = workspace.settings();

    let dir_name = dir.unwrap_or(&settings.repository);
    let repo_dir = workspace.cwd().join(dir_name);
    let cloned = if repo_dir.join(".git").exists() {
        info!(dir = %repo_dir.display(), "using existing clone");
        false
    } else {
        if let Some(api) = api {
            verify_access(api, &settings.default_repo()).await?;
        }
        let url = workspace.remote_url(&settings.default_repo());
        clone_repo(workspace.git(), &url, dir_name, &CloneOptions::default())
            .await
            .with_context(|| format!("Failed to clone {}", settings.default_repo()))?;
        true
    };

    let (user_name, user_email) = git_identity(&owner, &settings.email_domain);
    workspace
        .git()
        .at(&repo_dir)
        .set_local_identity(&user_name, &user_email)
        .await
        .context("Failed to set git identity")?;

    Ok(InitReport {
        owner,
        repo_dir,
        cloned,
        user_name,
        user_email,
    })
}
