//! Thin async wrapper around the `git` executable.
//!
//! xwgit never implements version control itself: every operation here is a
//! `git` subprocess with an explicit argument vector and working directory.

pub mod sparse;
pub mod status;

pub use sparse::{clone_repo, fetch_patterns, sparse_fetch, CloneOptions, FetchKind};
pub use status::{
    authenticated_url, parse_porcelain, redact_remote, repo_dir_name, ChangeKind, StatusEntry,
};

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::GitError;

/// Captured result of one git invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs git commands in a fixed working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    program: String,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            program: "git".to_string(),
        }
    }

    /// Overrides the executable (useful for wrappers or tests).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Same executable, different working directory.
    pub fn at(&self, workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            program: self.program.clone(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn is_repository(&self) -> bool {
        self.workdir.join(".git").exists()
    }

    /// Runs `git <args>` and captures its output regardless of exit status.
    pub async fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<GitOutput, GitError> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        debug!(
            cwd = %self.workdir.display(),
            args = %display_args(&args),
            "running git"
        );

        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(GitError::Spawn)?;

        Ok(GitOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Runs `git <args>`, failing on a non-zero exit. Returns stdout with
    /// trailing whitespace removed.
    pub async fn run_checked<S: AsRef<str>>(&self, args: &[S]) -> Result<String, GitError> {
        let output = self.run(args).await?;
        if output.success {
            return Ok(output.stdout.trim_end().to_string());
        }

        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        let mut stderr = output.stderr.trim().to_string();
        let stdout = output.stdout.trim();
        if !stdout.is_empty() {
            if !stderr.is_empty() {
                stderr.push('\n');
            }
            stderr.push_str(stdout);
        }
        Err(GitError::CommandFailed {
            args: display_args(&args),
            stderr: redact_remote_mentions(&stderr),
        })
    }

    pub async fn init(&self) -> Result<(), GitError> {
        self.run_checked(&["init"]).await.map(drop)
    }

    pub async fn current_branch(&self) -> Result<String, GitError> {
        Ok(self
            .run_checked(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await?
            .trim()
            .to_string())
    }

    /// Reads a config value, `None` when unset.
    pub async fn config_get(&self, key: &str) -> Result<Option<String>, GitError> {
        let output = self.run(&["config", "--get", key]).await?;
        let value = output.stdout.trim();
        Ok((output.success && !value.is_empty()).then(|| value.to_string()))
    }

    pub async fn remote_url(&self) -> Result<Option<String>, GitError> {
        self.config_get("remote.origin.url").await
    }

    pub async fn set_local_identity(&self, name: &str, email: &str) -> Result<(), GitError> {
        self.run_checked(&["config", "--local", "user.name", name])
            .await?;
        self.run_checked(&["config", "--local", "user.email", email])
            .await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<Vec<StatusEntry>, GitError> {
        let output = self.run_checked(&["status", "--porcelain", "--untracked-files=all"]).await?;
        Ok(parse_porcelain(&output))
    }

    pub async fn recent_commits(&self, count: usize) -> Result<Vec<String>, GitError> {
        let max = format!("--max-count={}", count);
        let output = self.run_checked(&["log", "--oneline", max.as_str()]).await?;
        Ok(output
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    pub async fn add<S: AsRef<str>>(&self, paths: &[S]) -> Result<(), GitError> {
        let mut args = vec!["add".to_string(), "--".to_string()];
        args.extend(paths.iter().map(|p| p.as_ref().to_string()));
        self.run_checked(&args).await.map(drop)
    }

    pub async fn add_all(&self) -> Result<(), GitError> {
        self.run_checked(&["add", "--all"]).await.map(drop)
    }

    pub async fn commit(&self, message: &str) -> Result<(), GitError> {
        self.run_checked(&["commit", "-m", message]).await.map(drop)
    }

    pub async fn push(&self) -> Result<(), GitError> {
        self.run_checked(&["push"]).await.map(drop)
    }

    pub async fn push_upstream(&self, branch: &str) -> Result<(), GitError> {
        self.run_checked(&["push", "-u", "origin", branch])
            .await
            .map(drop)
    }

    pub async fn pull(&self) -> Result<(), GitError> {
        self.run_checked(&["pull"]).await.map(drop)
    }

    pub async fn checkout(&self, branch: &str) -> Result<(), GitError> {
        self.run_checked(&["checkout", branch]).await.map(drop)
    }

    pub async fn checkout_new_branch(&self, branch: &str) -> Result<(), GitError> {
        self.run_checked(&["checkout", "-b", branch]).await.map(drop)
    }

    pub async fn branch_exists(&self, branch: &str) -> Result<bool, GitError> {
        let reference = format!("refs/heads/{}", branch);
        let output = self
            .run(&["rev-parse", "--verify", "--quiet", reference.as_str()])
            .await?;
        Ok(output.success)
    }
}

/// Walks up from `start` looking for a directory containing `.git`.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

fn display_args(args: &[&str]) -> String {
    args.iter()
        .map(|a| redact_remote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

fn redact_remote_mentions(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            if word.contains("://") {
                redact_remote(word)
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
