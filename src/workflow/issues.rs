//! Issue, branch and pull request commands.

use anyhow::Context;
use tera::Tera;
use tracing::{info, warn};

use super::Workspace;
use crate::github::{Comment, HostingApi, Issue, NewPullRequest, PullRequest};
use crate::scaffold::slugify_branch;

const PR_BODY_WITH_ISSUE: &str = "## Related Issue
#{{ number }} - {{ title }}

## Changes
[Describe your changes here]

## Testing
[Describe how you tested these changes]

Closes #{{ number }}
";

const PR_BODY: &str = "## Changes
[Describe your changes here]

## Testing
[Describe how you tested these changes]
";

/// Pull request description, linking `issue` when one is given.
pub fn pull_request_body(issue: Option<(u64, &str)>) -> anyhow::Result<String> {
    let Some((number, title)) = issue else {
        return Ok(PR_BODY.to_string());
    };
    let mut context = tera::Context::new();
    context.insert("number", &number);
    context.insert("title", title);
    Tera::one_off(PR_BODY_WITH_ISSUE, &context, false).context("Failed to render pull request body")
}

#[derive(Debug, Clone)]
pub struct IssueDetails {
    pub issue: Issue,
    pub comments: Vec<Comment>,
}

/// Fetches an issue of the configured repository with its comments.
pub async fn show_issue(
    workspace: &Workspace,
    api: &dyn HostingApi,
    number: u64,
) -> anyhow::Result<IssueDetails> {
    let settings = workspace.settings();
    let (owner, repo) = (&settings.organization, &settings.repository);
    let issue = api
        .get_issue(owner, repo, number)
        .await
        .with_context(|| format!("Issue #{} not found", number))?;
    let comments = api.list_issue_comments(owner, repo, number).await?;
    Ok(IssueDetails { issue, comments })
}

pub async fn add_comment(
    workspace: &Workspace,
    api: &dyn HostingApi,
    number: u64,
    body: &str,
) -> anyhow::Result<Comment> {
    let settings = workspace.settings();
    api.add_issue_comment(&settings.organization, &settings.repository, number, body)
        .await
        .with_context(|| format!("Failed to comment on issue #{}", number))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchOutcome {
    Created(String),
    /// The branch was already there; nothing was changed.
    AlreadyExists(String),
}

/// Creates the working branch for an issue from an up-to-date base branch.
pub async fn create_issue_branch(
    workspace: &Workspace,
    api: &dyn HostingApi,
    number: u64,
) -> anyhow::Result<BranchOutcome> {
    let settings = workspace.settings();
    let git = workspace.repo()?;
    let issue = api
        .get_issue(&settings.organization, &settings.repository, number)
        .await
        .with_context(|| format!("Issue #{} not found", number))?;

    let branch = slugify_branch(number, &issue.title);
    if git.branch_exists(&branch).await? {
        warn!(%branch, "branch already exists");
        return Ok(BranchOutcome::AlreadyExists(branch));
    }

    git.checkout(&settings.base_branch).await?;
    if let Err(e) = git.pull().await {
        warn!(error = %e, "could not update base branch");
    }
    git.checkout_new_branch(&branch).await?;
    info!(%branch, issue = number, "branch created");
    Ok(BranchOutcome::Created(branch))
}

/// Opens a pull request from the current branch into `base` (default: the
/// configured base branch).
///
/// When `issue` cannot be fetched the body degrades to `Closes #N`.
pub async fn create_pull_request(
    workspace: &Workspace,
    api: &dyn HostingApi,
    title: &str,
    issue: Option<u64>,
    base: Option<&str>,
) -> anyhow::Result<PullRequest> {
    let settings = workspace.settings();
    let (owner, repo) = (&settings.organization, &settings.repository);
    let head = workspace.repo()?.current_branch().await?;

    let body = match issue {
        Some(number) => match api.get_issue(owner, repo, number).await {
            Ok(found) => pull_request_body(Some((number, &found.title)))?,
            Err(e) => {
                warn!(error = %e, issue = number, "could not load linked issue");
                format!("Closes #{}", number)
            }
        },
        None => pull_request_body(None)?,
    };

    let pull = NewPullRequest {
        title: title.to_string(),
        body,
        head,
        base: base.unwrap_or(&settings.base_branch).to_string(),
    };
    let created = api
        .create_pull_request(owner, repo, &pull)
        .await
        .context("Failed to create pull request")?;
    info!(number = created.number, url = %created.html_url, "pull request created");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::testing::{git_available, init_repo, issue, settings, FakeHosting};

    #[test]
    fn test_pull_request_body_with_issue() {
        let body = pull_request_body(Some((12, "Add <search> tool"))).expect("render");
        assert!(body.starts_with("## Related Issue\n#12 - Add <search> tool\n"));
        assert!(body.trim_end().ends_with("Closes #12"));
    }

    #[test]
    fn test_pull_request_body_without_issue() {
        let body = pull_request_body(None).expect("render");
        assert!(body.starts_with("## Changes"));
        assert!(!body.contains("Closes"));
    }

    #[tokio::test]
    async fn test_show_issue_and_comment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(settings(dir.path()), dir.path());
        let api = FakeHosting::default().with_issue(issue(5, "Add search"));

        let comment = add_comment(&workspace, &api, 5, "Working on it")
            .await
            .expect("comment");
        assert_eq!(comment.body, "Working on it");

        let details = show_issue(&workspace, &api, 5).await.expect("issue");
        assert_eq!(details.issue.title, "Add search");
        assert_eq!(details.comments.len(), 1);

        assert!(show_issue(&workspace, &api, 6).await.is_err());
        assert!(add_comment(&workspace, &api, 6, "x").await.is_err());
    }

    #[tokio::test]
    async fn test_branch_and_pull_request() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let root = init_repo(dir.path()).await;
        let workspace = Workspace::new(settings(dir.path()), &root);
        let api = FakeHosting::default().with_issue(issue(12, "Add Perplexity search!"));

        let outcome = create_issue_branch(&workspace, &api, 12)
            .await
            .expect("branch");
        let expected = "feature/issue-12-add-perplexity-search".to_string();
        assert_eq!(outcome, BranchOutcome::Created(expected.clone()));
        assert_eq!(
            create_issue_branch(&workspace, &api, 12)
                .await
                .expect("branch again"),
            BranchOutcome::AlreadyExists(expected.clone())
        );

        let pr = create_pull_request(&workspace, &api, "Add search", Some(12), None)
            .await
            .expect("pr");
        assert_eq!(pr.number, 1);

        let missing = create_pull_request(&workspace, &api, "Other", Some(99), Some("develop"))
            .await
            .expect("pr without issue data");
        assert_eq!(missing.number, 2);

        let pulls = api.pulls.lock().unwrap();
        assert_eq!(pulls[0].head, expected);
        assert_eq!(pulls[0].base, "main");
        assert!(pulls[0].body.contains("#12 - Add Perplexity search!"));
        assert_eq!(pulls[1].body, "Closes #99");
        assert_eq!(pulls[1].base, "develop");
    }
}
