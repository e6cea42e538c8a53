//! Repository acquisition and inspection: `clone`, `fetch`, `checkout`,
//! `status` and `contribute`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use tracing::{info, warn};

use super::tools::{add_tool, AddToolReport};
use super::Workspace;
use crate::git::{
    clone_repo, fetch_patterns, find_repo_root, redact_remote, repo_dir_name, sparse_fetch,
    CloneOptions, FetchKind, StatusEntry,
};
use crate::github::{split_repo, HostingApi, Repository};
use crate::scaffold::{parse_tool_path, ToolSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneOutcome {
    Cloned(PathBuf),
    /// The target directory already existed; nothing was done.
    AlreadyPresent(PathBuf),
}

/// Checks that the configured token can see `owner/repo`.
///
/// Runs before any clone so a missing repository or a rejected token is
/// reported as such rather than as a git failure.
pub async fn verify_access(api: &dyn HostingApi, repo: &str) -> anyhow::Result<Repository> {
    let (owner, name) = split_repo(repo)
        .ok_or_else(|| anyhow!("Invalid repository '{}': expected owner/repo", repo))?;
    let found = api
        .get_repository(owner, name)
        .await
        .with_context(|| format!("No access to repository {}", repo))?;
    info!(repo = %found.full_name, private = found.private, "repository access confirmed");
    Ok(found)
}

/// Clones `owner/repo` into the working directory. Requires a token.
///
/// When `api` is given, repository access is verified before cloning.
pub async fn clone(
    workspace: &Workspace,
    api: Option<&dyn HostingApi>,
    repo: &str,
    options: &CloneOptions,
) -> anyhow::Result<CloneOutcome> {
    workspace.settings().require_token()?;
    split_repo(repo).ok_or_else(|| anyhow!("Invalid repository '{}': expected owner/repo", repo))?;

    let dir_name = repo_dir_name(repo);
    let target = workspace.cwd().join(dir_name);
    if target.exists() {
        info!(dir = %target.display(), "repository already present");
        return Ok(CloneOutcome::AlreadyPresent(target));
    }

    if let Some(api) = api {
        verify_access(api, repo).await?;
    }

    let url = workspace.remote_url(repo);
    let path = clone_repo(workspace.git(), &url, dir_name, options)
        .await
        .with_context(|| format!("Failed to clone {}", repo))?;
    Ok(CloneOutcome::Cloned(path))
}

/// Sparse-fetches `path` from `repo` (default: the configured repository)
/// into the working directory. Returns the copied paths.
pub async fn fetch(
    workspace: &Workspace,
    kind: FetchKind,
    path: &str,
    repo: Option<&str>,
    branch: Option<&str>,
) -> anyhow::Result<Vec<PathBuf>> {
    let settings = workspace.settings();
    let repo = repo
        .map(str::to_string)
        .unwrap_or_else(|| settings.default_repo());
    let branch = branch.unwrap_or(&settings.base_branch);

    let patterns = fetch_patterns(kind, path);
    let url = workspace.remote_url(&repo);
    let copied = sparse_fetch(workspace.git(), &url, branch, &patterns, workspace.cwd())
        .await
        .with_context(|| format!("Failed to fetch {} from {}", path, repo))?;
    info!(count = copied.len(), %repo, "fetched");
    Ok(copied)
}

/// A tool found in the local checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTool {
    pub implementation: PathBuf,
    pub doc: Option<PathBuf>,
    pub test: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    Local(LocalTool),
    Fetched(Vec<PathBuf>),
}

/// Reports a tool that already exists under the working directory, or
/// fetches it (and any non-tool path) from the remote.
pub async fn checkout(
    workspace: &Workspace,
    kind: FetchKind,
    path: &str,
    repo: Option<&str>,
) -> anyhow::Result<CheckoutOutcome> {
    if kind == FetchKind::Tool {
        if let Some(local) = find_local_tool(workspace.cwd(), path) {
            return Ok(CheckoutOutcome::Local(local));
        }
    }
    fetch(workspace, kind, path, repo, None)
        .await
        .map(CheckoutOutcome::Fetched)
}

fn find_local_tool(root: &Path, path: &str) -> Option<LocalTool> {
    let path = path.trim_matches('/');
    let implementation = Path::new("xwtools").join(format!("{}.py", path));
    if !root.join(&implementation).is_file() {
        return None;
    }
    let name = path.rsplit('/').next().unwrap_or(path);
    let doc = Path::new("docs").join("tools").join(format!("{}.md", name));
    let test = Path::new("tests").join(format!("test_{}.py", name));
    Some(LocalTool {
        implementation,
        doc: root.join(&doc).is_file().then_some(doc),
        test: root.join(&test).is_file().then_some(test),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub repo_name: String,
    pub branch: String,
    pub remote: Option<String>,
    pub changes: Vec<StatusEntry>,
    pub recent_commits: Vec<String>,
}

/// Summarises the repository containing the working directory.
pub async fn status(workspace: &Workspace) -> anyhow::Result<StatusReport> {
    let git = workspace.repo()?;
    let repo_name = git
        .workdir()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let branch = git
        .current_branch()
        .await
        .unwrap_or_else(|_| "unknown".to_string());
    let remote = git.remote_url().await?.map(|url| redact_remote(&url));
    let changes = git.status().await?;
    // A repository without commits has no log.
    let recent_commits = git.recent_commits(3).await.unwrap_or_default();

    Ok(StatusReport {
        repo_name,
        branch,
        remote,
        changes,
        recent_commits,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributeReport {
    pub repo_dir: PathBuf,
    pub tool: AddToolReport,
}

/// End-to-end contribution: make sure a clone of the configured repository
/// exists, then scaffold and commit `category/name` inside it.
pub async fn contribute(
    workspace: &Workspace,
    api: Option<&dyn HostingApi>,
    tool_path: &str,
    description: &str,
    push: bool,
) -> anyhow::Result<ContributeReport> {
    let (category, name) = parse_tool_path(tool_path)?;
    let settings = workspace.settings();
    let full_name = settings.default_repo();

    let inside = find_repo_root(workspace.cwd())
        .filter(|root| root.file_name().is_some_and(|n| n == settings.repository.as_str()));

    let repo_dir = match inside {
        Some(root) => root,
        None => ensure_clone(workspace, api, &full_name, &category).await?,
    };

    let repo_workspace = workspace.rooted_at(&repo_dir);
    let spec = ToolSpec::new(category, name, description);
    let tool = add_tool(&repo_workspace, &spec, true, push).await?;
    Ok(ContributeReport { repo_dir, tool })
}

async fn ensure_clone(
    workspace: &Workspace,
    api: Option<&dyn HostingApi>,
    full_name: &str,
    category: &str,
) -> anyhow::Result<PathBuf> {
    let dir_name = repo_dir_name(full_name);
    let target = workspace.cwd().join(dir_name);

    if target.exists() {
        let git = workspace.git().at(&target);
        let points_here = git.is_repository()
            && git
                .remote_url()
                .await
                .ok()
                .flatten()
                .is_some_and(|url| url.contains(full_name));
        if points_here {
            if let Err(e) = git.pull().await {
                warn!(error = %e, "pull failed, continuing with local state");
            }
            return Ok(target);
        }
        warn!(dir = %target.display(), "existing directory is not a clone of {}, replacing it", full_name);
        fs::remove_dir_all(&target)
            .with_context(|| format!("Failed to remove {}", target.display()))?;
    }

    let options = CloneOptions {
        sparse: true,
        depth: Some(1),
        paths: vec![
            format!("xwtools/{}", category),
            "docs/tools".to_string(),
            "tests".to_string(),
        ],
    };
    match clone(workspace, api, full_name, &options).await? {
        CloneOutcome::Cloned(path) | CloneOutcome::AlreadyPresent(path) => Ok(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GitError, HostingError};
    use crate::workflow::testing::{git_available, init_repo, settings, FakeHosting};

    #[test]
    fn test_find_local_tool() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("xwtools/search")).expect("mkdir");
        fs::create_dir_all(root.join("docs/tools")).expect("mkdir");
        fs::write(root.join("xwtools/search/finder.py"), "").expect("write");
        fs::write(root.join("docs/tools/finder.md"), "").expect("write");

        let local = find_local_tool(root, "search/finder").expect("found");
        assert_eq!(local.implementation, PathBuf::from("xwtools/search/finder.py"));
        assert_eq!(local.doc, Some(PathBuf::from("docs/tools/finder.md")));
        assert_eq!(local.test, None);

        assert!(find_local_tool(root, "search/missing").is_none());
    }

    #[tokio::test]
    async fn test_clone_requires_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut settings = settings(dir.path());
        settings.token = None;
        let workspace = Workspace::new(settings, dir.path());
        let err = clone(&workspace, None, "o/r", &CloneOptions::default())
            .await
            .expect_err("token");
        assert!(err.to_string().contains("github.token"));
    }

    #[tokio::test]
    async fn test_clone_existing_directory_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("r")).expect("mkdir");
        let workspace = Workspace::new(settings(dir.path()), dir.path())
            .with_git_program("xwgit-definitely-not-installed");
        let outcome = clone(&workspace, None, "o/r", &CloneOptions::default())
            .await
            .expect("clone");
        assert_eq!(outcome, CloneOutcome::AlreadyPresent(dir.path().join("r")));
    }

    #[tokio::test]
    async fn test_clone_checks_repository_access_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(settings(dir.path()), dir.path())
            .with_git_program("xwgit-definitely-not-installed");
        let api = FakeHosting::default().with_missing_repository("o/hidden");

        let err = clone(&workspace, Some(&api), "o/hidden", &CloneOptions::default())
            .await
            .expect_err("no access");
        assert!(matches!(
            err.downcast_ref::<HostingError>(),
            Some(HostingError::NotFound(_))
        ));
        assert!(err.to_string().contains("No access to repository o/hidden"));
        assert!(!dir.path().join("hidden").exists());

        // Access confirmed, so the clone itself runs (and fails on the missing git).
        let err = clone(&workspace, Some(&api), "o/visible", &CloneOptions::default())
            .await
            .expect_err("git missing");
        assert!(matches!(
            err.downcast_ref::<GitError>(),
            Some(GitError::Spawn(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_access_returns_repository() {
        let api = FakeHosting::default();
        let repo = verify_access(&api, "xwander-dev/XwDevTools")
            .await
            .expect("access");
        assert_eq!(repo.full_name, "xwander-dev/XwDevTools");
        assert!(verify_access(&api, "not-a-repo").await.is_err());
    }

    #[tokio::test]
    async fn test_contribute_rejects_bad_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(settings(dir.path()), dir.path());
        assert!(contribute(&workspace, None, "no-slash", "x", false).await.is_err());
    }

    #[tokio::test]
    async fn test_status_report() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let root = init_repo(dir.path()).await;
        let git = crate::git::Git::new(&root);
        git.run_checked(&[
            "remote",
            "add",
            "origin",
            "https://ghp_secret@github.com/xwander-dev/XwDevTools.git",
        ])
        .await
        .expect("remote");
        fs::write(root.join("new.py"), "").expect("write");

        let workspace = Workspace::new(settings(dir.path()), &root);
        let report = status(&workspace).await.expect("status");
        assert_eq!(report.branch, "main");
        assert_eq!(
            report.remote.as_deref(),
            Some("https://github.com/xwander-dev/XwDevTools.git")
        );
        assert_eq!(report.changes.len(), 1);
        assert_eq!(report.changes[0].to_string(), "New file: new.py");
        assert_eq!(report.recent_commits.len(), 1);
    }
}
