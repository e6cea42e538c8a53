//! Tool scaffolding.
//!
//! A tool is three files: the Python implementation under
//! `xwtools/<category>/`, its Markdown page under `docs/tools/` and a
//! unittest suite under `tests/`.

pub mod templates;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tera::{Context, Tera};
use tracing::debug;

use crate::error::ScaffoldError;

pub use templates::{DOC_TEMPLATE, TEST_TEMPLATE, TOOL_TEMPLATE};

/// Categories `add-tool` accepts.
pub const VALID_CATEGORIES: &[&str] = &["utility", "search", "integration", "analysis"];

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9_-]+$").expect("valid regex"))
}

/// Checks a tool name (also used for quickstart tool types).
pub fn validate_name(name: &str) -> Result<(), ScaffoldError> {
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(ScaffoldError::InvalidName(name.to_string()))
    }
}

pub fn validate_category(category: &str) -> Result<(), ScaffoldError> {
    if VALID_CATEGORIES.contains(&category) {
        Ok(())
    } else {
        Err(ScaffoldError::InvalidCategory {
            category: category.to_string(),
            valid: VALID_CATEGORIES.join(", "),
        })
    }
}

/// `my-cool_tool` -> `My Cool Tool`.
pub fn name_title(name: &str) -> String {
    name.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Splits `category/name` as used by `contribute` and tool fetches.
pub fn parse_tool_path(path: &str) -> Result<(String, String), ScaffoldError> {
    match path.trim().trim_matches('/').split_once('/') {
        Some((category, name))
            if !category.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((category.to_string(), name.to_string()))
        }
        _ => Err(ScaffoldError::InvalidPath(path.to_string())),
    }
}

/// Branch name for work on an issue:
/// `feature/issue-<n>-<lowercased title, non-alphanumerics collapsed to '-'>`.
pub fn slugify_branch(issue_number: u64, title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        format!("feature/issue-{}", issue_number)
    } else {
        format!("feature/issue-{}-{}", issue_number, slug)
    }
}

/// What to scaffold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub category: String,
    pub name: String,
    pub description: String,
}

impl ToolSpec {
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            description: description.into(),
        }
    }

    /// Name and category must both be plain path segments.
    pub fn validate(&self) -> Result<(), ScaffoldError> {
        validate_name(&self.name)?;
        if !name_pattern().is_match(&self.category) {
            return Err(ScaffoldError::InvalidCategory {
                category: self.category.clone(),
                valid: VALID_CATEGORIES.join(", "),
            });
        }
        Ok(())
    }

    pub fn implementation_path(&self) -> PathBuf {
        Path::new("xwtools")
            .join(&self.category)
            .join(format!("{}.py", self.name))
    }

    pub fn doc_path(&self) -> PathBuf {
        Path::new("docs")
            .join("tools")
            .join(format!("{}.md", self.name))
    }

    pub fn test_path(&self) -> PathBuf {
        Path::new("tests").join(format!("test_{}.py", self.name))
    }

    fn context(&self) -> Context {
        let title = name_title(&self.name);
        let mut context = Context::new();
        context.insert("name", &self.name);
        context.insert("class_name", &title.replace(' ', ""));
        context.insert("name_title", &title);
        context.insert("description", &self.description);
        context.insert("category", &self.category);
        context
    }
}

/// A rendered file ready to write.
#[derive(Debug, Clone)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub contents: String,
    pub executable: bool,
}

/// Renders the three tool files without touching the filesystem.
pub fn render_tool(spec: &ToolSpec) -> Result<Vec<RenderedFile>, ScaffoldError> {
    spec.validate()?;
    let context = spec.context();

    Ok(vec![
        RenderedFile {
            path: spec.implementation_path(),
            contents: Tera::one_off(TOOL_TEMPLATE, &context, false)?,
            executable: true,
        },
        RenderedFile {
            path: spec.doc_path(),
            contents: Tera::one_off(DOC_TEMPLATE, &context, false)?,
            executable: false,
        },
        RenderedFile {
            path: spec.test_path(),
            contents: Tera::one_off(TEST_TEMPLATE, &context, false)?,
            executable: true,
        },
    ])
}

/// Writes the tool files under `root`, creating directories as needed.
///
/// Returns the created paths relative to `root`, in implementation, doc,
/// test order. Existing files are overwritten.
pub fn scaffold_tool(root: &Path, spec: &ToolSpec) -> Result<Vec<PathBuf>, ScaffoldError> {
    let files = render_tool(spec)?;
    let mut created = Vec::with_capacity(files.len());

    for file in files {
        let target = root.join(&file.path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| ScaffoldError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&target, &file.contents).map_err(|source| ScaffoldError::Write {
            path: target.clone(),
            source,
        })?;
        if file.executable {
            make_executable(&target)?;
        }
        debug!(path = %target.display(), "created");
        created.push(file.path);
    }
    Ok(created)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), ScaffoldError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|source| {
        ScaffoldError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), ScaffoldError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("perplexity").is_ok());
        assert!(validate_name("web-search_2").is_ok());
        assert!(matches!(
            validate_name("Bad Name"),
            Err(ScaffoldError::InvalidName(_))
        ));
        assert!(validate_name("").is_err());
        assert!(validate_name("../etc").is_err());
    }

    #[test]
    fn test_validate_category() {
        for category in VALID_CATEGORIES {
            assert!(validate_category(category).is_ok());
        }
        match validate_category("api") {
            Err(ScaffoldError::InvalidCategory { valid, .. }) => {
                assert_eq!(valid, "utility, search, integration, analysis")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_name_title() {
        assert_eq!(name_title("web-search_tool"), "Web Search Tool");
        assert_eq!(name_title("perplexity"), "Perplexity");
        assert_eq!(name_title("a--b"), "A B");
    }

    #[test]
    fn test_slugify_branch() {
        assert_eq!(
            slugify_branch(12, "Add Perplexity search tool!"),
            "feature/issue-12-add-perplexity-search-tool"
        );
        assert_eq!(
            slugify_branch(3, "  Fix: crash -- on   empty input "),
            "feature/issue-3-fix-crash-on-empty-input"
        );
        assert_eq!(slugify_branch(7, "???"), "feature/issue-7");
    }

    #[test]
    fn test_parse_tool_path() {
        assert_eq!(
            parse_tool_path("search/perplexity").expect("parse"),
            ("search".to_string(), "perplexity".to_string())
        );
        assert!(parse_tool_path("perplexity").is_err());
        assert!(parse_tool_path("a/b/c").is_err());
        assert!(parse_tool_path("/x").is_err());
    }

    #[test]
    fn test_render_substitutes_context() {
        let spec = ToolSpec::new("search", "web-search", "Search the web");
        let files = render_tool(&spec).expect("render");
        assert_eq!(files.len(), 3);

        let tool = &files[0].contents;
        assert!(tool.starts_with("#!/usr/bin/env python3"));
        assert!(tool.contains("web-search.py - Search the web"));
        assert!(tool.contains("A search tool for the XwDevTools repository."));
        assert!(!tool.contains("{{"));

        let doc = &files[1].contents;
        assert!(doc.starts_with("# Web Search"));
        assert!(doc.contains("./xwtools/search/web-search.py --example value"));

        let test = &files[2].contents;
        assert!(test.contains("class TestWebSearch(unittest.TestCase):"));
        assert!(test.contains("from xwtools.search.web-search import main"));
    }

    #[test]
    fn test_description_is_not_escaped() {
        let spec = ToolSpec::new("utility", "quote", "Handles <tags> & \"quotes\"");
        let files = render_tool(&spec).expect("render");
        assert!(files[0].contents.contains("Handles <tags> & \"quotes\""));
    }

    #[test]
    fn test_description_is_a_valid_python_literal() {
        let spec = ToolSpec::new("utility", "greeter", r#"Say "hi" \ wave"#);
        let files = render_tool(&spec).expect("render");
        assert!(files[0]
            .contents
            .contains(r#"description="Say \"hi\" \\ wave""#));
        assert!(!files[0].contents.contains(r#"description="Say "hi""#));
    }

    #[test]
    fn test_scaffold_writes_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = ToolSpec::new("analysis", "log_stats", "Summarise logs");
        let created = scaffold_tool(dir.path(), &spec).expect("scaffold");

        assert_eq!(
            created,
            vec![
                PathBuf::from("xwtools/analysis/log_stats.py"),
                PathBuf::from("docs/tools/log_stats.md"),
                PathBuf::from("tests/test_log_stats.py"),
            ]
        );
        for path in &created {
            assert!(dir.path().join(path).is_file());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dir.path().join(&created[0]))
                .expect("metadata")
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o755);
            let doc_mode = fs::metadata(dir.path().join(&created[1]))
                .expect("metadata")
                .permissions()
                .mode();
            assert_eq!(doc_mode & 0o111, 0);
        }
    }

    #[test]
    fn test_scaffold_rejects_invalid_name_without_writing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = ToolSpec::new("search", "Bad", "x");
        assert!(scaffold_tool(dir.path(), &spec).is_err());
        assert!(!dir.path().join("xwtools").exists());
    }
}
