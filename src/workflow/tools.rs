//! `add-tool` and `quickstart`.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{info, warn};

use super::commit::{push_branch, PushStatus};
use super::Workspace;
use crate::scaffold::{scaffold_tool, validate_category, ToolSpec};

/// Outcome of `add-tool`.
///
/// Files are always created when this is returned; `commit_error` and
/// `push` describe the optional follow-up steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddToolReport {
    pub created: Vec<PathBuf>,
    pub commit_message: Option<String>,
    pub commit_error: Option<String>,
    pub push: PushStatus,
}

impl AddToolReport {
    pub fn committed(&self) -> bool {
        self.commit_message.is_some() && self.commit_error.is_none()
    }
}

/// Scaffolds a tool at the repository root (or the working directory when
/// not inside a repository), then optionally commits and pushes it.
pub async fn add_tool(
    workspace: &Workspace,
    spec: &ToolSpec,
    commit: bool,
    push: bool,
) -> anyhow::Result<AddToolReport> {
    validate_category(&spec.category)?;

    let repo = workspace.repo().ok();
    let root = repo
        .as_ref()
        .map(|git| git.workdir().to_path_buf())
        .unwrap_or_else(|| workspace.cwd().to_path_buf());

    let created = scaffold_tool(&root, spec)?;
    info!(tool = %spec.name, category = %spec.category, "tool scaffolded");

    let mut report = AddToolReport {
        created,
        commit_message: None,
        commit_error: None,
        push: PushStatus::NotRequested,
    };
    if !commit {
        return Ok(report);
    }

    let Some(git) = repo else {
        warn!("not in a git repository, skipping commit");
        report.commit_error = Some("not in a git repository".to_string());
        return Ok(report);
    };

    let message = format!("Add {}: {}", spec.name, spec.description);
    report.commit_message = Some(message.clone());

    let paths: Vec<String> = report
        .created
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    let committed = async {
        git.add(&paths).await?;
        git.commit(&message).await
    }
    .await;
    if let Err(e) = committed {
        warn!(error = %e, "commit failed");
        report.commit_error = Some(e.to_string());
        return Ok(report);
    }

    if push {
        report.push = match git.current_branch().await {
            Ok(branch) => push_branch(&git, &branch).await,
            Err(e) => PushStatus::Failed(e.to_string()),
        };
    }
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickstartReport {
    pub branch: String,
    pub created: Vec<PathBuf>,
}

/// Creates `feature/<name>-<unix time>` and scaffolds the tool on it.
///
/// `tool_type` becomes the category directory; unlike `add-tool` it is not
/// restricted to the fixed category list.
pub async fn quickstart(
    workspace: &Workspace,
    name: &str,
    description: &str,
    tool_type: &str,
) -> anyhow::Result<QuickstartReport> {
    let spec = ToolSpec::new(tool_type, name, description);
    spec.validate()?;

    let git = workspace.repo()?;
    let branch = format!("feature/{}-{}", name, Utc::now().timestamp());
    git.checkout_new_branch(&branch).await?;

    let created = scaffold_tool(git.workdir(), &spec)?;
    info!(%branch, tool = %name, "quickstart complete");
    Ok(QuickstartReport { branch, created })
}
