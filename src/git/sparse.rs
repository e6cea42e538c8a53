//! Cloning and sparse fetching.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::Git;
use crate::error::GitError;

/// What kind of item a fetch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FetchKind {
    /// A tool: implementation, docs and tests.
    Tool,
    File,
    Dir,
}

/// Sparse-checkout patterns for fetching `path`.
///
/// Tools are addressed as `category/name` and expand to their
/// implementation, documentation and test files.
pub fn fetch_patterns(kind: FetchKind, path: &str) -> Vec<String> {
    let path = path.trim_matches('/');
    match kind {
        FetchKind::Tool => {
            let name = path.rsplit('/').next().unwrap_or(path);
            vec![
                format!("xwtools/{}*", path),
                format!("docs/tools/{}*", name),
                format!("tests/test_{}*", name),
            ]
        }
        FetchKind::File | FetchKind::Dir => vec![path.to_string()],
    }
}

/// Options for [`clone_repo`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneOptions {
    /// Partial clone (`--filter=blob:none --sparse`).
    pub sparse: bool,
    /// Shallow clone depth.
    pub depth: Option<u32>,
    /// Cone-mode paths added after a sparse clone.
    pub paths: Vec<String>,
}

/// Clones `url` into `dest` (relative to `git`'s working directory).
///
/// Failing to configure sparse paths after a successful clone is logged and
/// does not fail the clone.
pub async fn clone_repo(
    git: &Git,
    url: &str,
    dest: &str,
    options: &CloneOptions,
) -> Result<PathBuf, GitError> {
    let mut args = vec!["clone".to_string()];
    if options.sparse {
        args.push("--filter=blob:none".to_string());
        args.push("--sparse".to_string());
    }
    if let Some(depth) = options.depth {
        args.push("--depth".to_string());
        args.push(depth.to_string());
    }
    args.push(url.to_string());
    args.push(dest.to_string());

    git.run_checked(&args).await?;
    let repo_dir = git.workdir().join(dest);

    if options.sparse && !options.paths.is_empty() {
        let repo = git.at(&repo_dir);
        if let Err(e) = repo.run_checked(&["sparse-checkout", "init", "--cone"]).await {
            warn!(error = %e, "failed to initialise sparse checkout");
        } else {
            let mut args = vec!["sparse-checkout".to_string(), "add".to_string()];
            args.extend(options.paths.iter().map(|p| p.trim().to_string()));
            if let Err(e) = repo.run_checked(&args).await {
                warn!(error = %e, "failed to add sparse checkout paths");
            }
        }
    }

    info!(dest = %repo_dir.display(), sparse = options.sparse, "repository cloned");
    Ok(repo_dir)
}

/// Fetches only the files matching `patterns` from `branch` of `remote_url`
/// and copies them into `dest`.
///
/// The work happens in a temporary staging repository that is removed on
/// every exit path. Each match is copied to `dest/<file name>`. Returns the
/// copied destination paths.
pub async fn sparse_fetch(
    git: &Git,
    remote_url: &str,
    branch: &str,
    patterns: &[String],
    dest: &Path,
) -> Result<Vec<PathBuf>, GitError> {
    let staging = tempfile::Builder::new()
        .prefix("xwgit-fetch-")
        .tempdir()?;
    let repo = git.at(staging.path());

    repo.init().await?;
    repo.run_checked(&["remote", "add", "origin", remote_url])
        .await?;
    repo.run_checked(&["config", "core.sparseCheckout", "true"])
        .await?;

    let info_dir = staging.path().join(".git").join("info");
    fs::create_dir_all(&info_dir)?;
    fs::write(info_dir.join("sparse-checkout"), patterns.join("\n") + "\n")?;

    repo.run_checked(&["fetch", "--depth=1", "origin", branch])
        .await?;
    repo.run_checked(&["checkout", "FETCH_HEAD"]).await?;

    fs::create_dir_all(dest)?;
    let mut copied = Vec::new();
    for pattern in patterns {
        for source in resolve_pattern(staging.path(), pattern)? {
            let Some(name) = source.file_name() else {
                continue;
            };
            let target = dest.join(name);
            copy_path(&source, &target)?;
            debug!(from = %source.display(), to = %target.display(), "copied");
            copied.push(target);
        }
    }

    if copied.is_empty() {
        return Err(GitError::NothingFetched(patterns.join(", ")));
    }
    Ok(copied)
}

/// Paths under `root` matched by a sparse pattern.
///
/// Supports a trailing-`*` prefix match on the final component, which is
/// all the patterns from [`fetch_patterns`] use.
fn resolve_pattern(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, GitError> {
    let pattern = pattern.trim_matches('/');
    let Some(star) = pattern.find('*') else {
        let path = root.join(pattern);
        return Ok(if path.exists() { vec![path] } else { Vec::new() });
    };

    let literal = &pattern[..star];
    let (dir, prefix) = match literal.rfind('/') {
        Some(slash) => (root.join(&literal[..slash]), &literal[slash + 1..]),
        None => (root.to_path_buf(), literal),
    };
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut matches = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with(prefix) && name != ".git" {
            matches.push(entry.path());
        }
    }
    matches.sort();
    Ok(matches)
}

fn copy_path(source: &Path, target: &Path) -> Result<(), GitError> {
    if source.is_dir() {
        for entry in WalkDir::new(source) {
            let entry = entry.map_err(|e| GitError::Io(e.into()))?;
            let Ok(relative) = entry.path().strip_prefix(source) else {
                continue;
            };
            let destination = target.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&destination)?;
            } else {
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &destination)?;
            }
        }
    } else {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, target)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_patterns() {
        assert_eq!(
            fetch_patterns(FetchKind::Tool, "search/perplexity"),
            vec![
                "xwtools/search/perplexity*".to_string(),
                "docs/tools/perplexity*".to_string(),
                "tests/test_perplexity*".to_string(),
            ]
        );
    }

    #[test]
    fn test_file_patterns() {
        assert_eq!(
            fetch_patterns(FetchKind::File, "/README.md"),
            vec!["README.md".to_string()]
        );
        assert_eq!(fetch_patterns(FetchKind::Dir, "docs/"), vec!["docs".to_string()]);
    }

    #[test]
    fn test_resolve_pattern_prefix_and_exact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("xwtools/search")).expect("mkdir");
        fs::write(root.join("xwtools/search/perplexity.py"), "x").expect("write");
        fs::write(root.join("xwtools/search/other.py"), "x").expect("write");
        fs::write(root.join("README.md"), "x").expect("write");

        let found = resolve_pattern(root, "xwtools/search/perplexity*").expect("resolve");
        assert_eq!(found, vec![root.join("xwtools/search/perplexity.py")]);

        let exact = resolve_pattern(root, "README.md").expect("resolve");
        assert_eq!(exact, vec![root.join("README.md")]);

        assert!(resolve_pattern(root, "missing/dir*").expect("resolve").is_empty());
    }

    #[test]
    fn test_copy_directory_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("src");
        fs::create_dir_all(source.join("nested")).expect("mkdir");
        fs::write(source.join("nested/a.txt"), "a").expect("write");

        let target = dir.path().join("out");
        copy_path(&source, &target).expect("copy");
        assert_eq!(
            fs::read_to_string(target.join("nested/a.txt")).expect("read"),
            "a"
        );
    }
}
