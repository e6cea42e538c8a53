//! CLI command definitions for xwgit.
//!
//! Commands resolve configuration, call into [`crate::workflow`] and print
//! the outcome. Diagnostics go through `tracing` (stderr); everything the
//! user is meant to read is printed to stdout.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::debug;

use crate::access::IssuedCode;
use crate::config::{redact, set_user_value, ConfigKey, ConfigPaths, ConfigResolver, Settings};
use crate::error::AccessError;
use crate::git::{CloneOptions, FetchKind};
use crate::github::{GitHubClient, HostingApi};
use crate::scaffold::ToolSpec;
use crate::workflow::{
    self, AddToolReport, BranchOutcome, CheckoutOutcome, CloneOutcome, CommitOutcome,
    CommitRequest, PushStatus, Workspace,
};

const NEW_CODE_HINT: &str = "Request a new code with `xwgit generate-code <name>`";

/// Default description for scaffolded tools.
const DEFAULT_DESCRIPTION: &str = "A useful tool";

/// Streamlined GitHub contribution workflow.
#[derive(Parser)]
#[command(name = "xwgit")]
#[command(about = "Streamlined GitHub workflow for AI developers")]
#[command(version)]
#[command(
    long_about = "xwgit wraps git and the GitHub API into a scripted contribution workflow:\none-time access codes, sparse fetches, tool scaffolding, commits and pull requests.\n\nExample usage:\n  xwgit generate-code claude\n  xwgit init --code AB12CD34\n  xwgit contribute search/perplexity \"Search with Perplexity\" --push"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "warn", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Issue a one-time access code for a contributor.
    GenerateCode(GenerateCodeArgs),

    /// Redeem an access code: clone the repository and set the git identity.
    Init(InitArgs),

    /// Clone a repository efficiently.
    Clone(CloneArgs),

    /// Fetch a tool, file or directory without cloning.
    Fetch(FetchArgs),

    /// Check out a tool or file locally.
    Checkout(CheckoutArgs),

    /// Create a new tool with implementation, docs and tests.
    AddTool(AddToolArgs),

    /// Create a feature branch and scaffold a tool on it.
    Quickstart(QuickstartArgs),

    /// Commit changes to the repository.
    Commit(CommitArgs),

    /// Stage everything and commit.
    Finalize(FinalizeArgs),

    /// Push the current branch to origin.
    Push,

    /// Show repository status.
    Status,

    /// End-to-end contribution: clone, scaffold, commit and optionally push.
    Contribute(ContributeArgs),

    /// Issue management.
    Issue {
        #[command(subcommand)]
        command: IssueCommand,
    },

    /// Branch management.
    Branch {
        #[command(subcommand)]
        command: BranchCommand,
    },

    /// Pull request management.
    Pr {
        #[command(subcommand)]
        command: PrCommand,
    },

    /// Show or change configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Inspect issued access codes.
    Codes {
        #[command(subcommand)]
        command: CodesCommand,
    },
}

/// Arguments for `xwgit generate-code`.
#[derive(Parser, Debug)]
pub struct GenerateCodeArgs {
    /// Contributor name (e.g. claude, ecom-agent).
    pub name: String,

    /// Validity window in seconds (default: codes.validity_secs).
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
    pub validity: Option<i64>,
}

/// Arguments for `xwgit init`.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Access code.
    #[arg(long)]
    pub code: String,

    /// Directory to clone into (default: the repository name).
    #[arg(long)]
    pub dir: Option<String>,
}

/// Arguments for `xwgit clone`.
#[derive(Parser, Debug)]
pub struct CloneArgs {
    /// Repository as owner/name.
    pub repo: String,

    /// Partial clone with sparse checkout.
    #[arg(long)]
    pub sparse: bool,

    /// Shallow clone depth.
    #[arg(long)]
    pub depth: Option<u32>,

    /// Comma-separated paths to check out when --sparse is given.
    #[arg(long, value_delimiter = ',')]
    pub paths: Vec<String>,
}

/// Arguments for `xwgit fetch`.
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// What to fetch.
    #[arg(value_enum)]
    pub kind: FetchKind,

    /// Path to fetch (category/name for tools).
    pub path: String,

    /// Repository as owner/name (default: the configured repository).
    #[arg(long)]
    pub repo: Option<String>,

    /// Branch to fetch from (default: repository.base_branch).
    #[arg(long)]
    pub branch: Option<String>,
}

/// Arguments for `xwgit checkout`.
#[derive(Parser, Debug)]
pub struct CheckoutArgs {
    /// What to check out.
    #[arg(value_enum)]
    pub kind: FetchKind,

    /// Path to check out (category/name for tools).
    pub path: String,

    /// Repository as owner/name (default: the configured repository).
    #[arg(long)]
    pub repo: Option<String>,
}

/// Arguments for `xwgit add-tool`.
#[derive(Parser, Debug)]
pub struct AddToolArgs {
    /// Tool category (utility, search, integration, analysis).
    pub category: String,

    /// Tool name (lowercase letters, digits, '-' and '_').
    pub name: String,

    /// Tool description.
    #[arg(short, long, default_value = DEFAULT_DESCRIPTION)]
    pub description: String,

    /// Commit the created files.
    #[arg(long)]
    pub commit: bool,

    /// Push after committing.
    #[arg(long, requires = "commit")]
    pub push: bool,
}

/// Arguments for `xwgit quickstart`.
#[derive(Parser, Debug)]
pub struct QuickstartArgs {
    /// Tool name.
    pub name: String,

    /// Tool description.
    #[arg(short, long, default_value = DEFAULT_DESCRIPTION)]
    pub description: String,

    /// Tool type, used as the category directory.
    #[arg(short = 't', long = "type", default_value = "search")]
    pub tool_type: String,
}

/// Arguments for `xwgit commit`.
#[derive(Parser, Debug)]
pub struct CommitArgs {
    /// Commit message.
    pub message: String,

    /// Stage all changes.
    #[arg(short, long)]
    pub all: bool,

    /// Only stage changed files matching this regex.
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Issue number to reference in the message.
    #[arg(short, long)]
    pub issue: Option<u64>,

    /// Push after committing.
    #[arg(long)]
    pub push: bool,
}

/// Arguments for `xwgit finalize`.
#[derive(Parser, Debug)]
pub struct FinalizeArgs {
    /// Commit message.
    pub message: String,

    /// Issue number to reference in the message.
    #[arg(short, long)]
    pub issue: Option<u64>,
}

/// Arguments for `xwgit contribute`.
#[derive(Parser, Debug)]
pub struct ContributeArgs {
    /// Tool as category/name.
    pub path: String,

    /// Tool description.
    pub description: String,

    /// Push after committing.
    #[arg(long)]
    pub push: bool,
}

#[derive(clap::Subcommand, Debug)]
pub enum IssueCommand {
    /// Show an issue with its comments.
    Get {
        number: u64,
    },
    /// Comment on an issue.
    Comment {
        number: u64,
        text: String,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum BranchCommand {
    /// Create the working branch for an issue.
    Create {
        issue: u64,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum PrCommand {
    /// Open a pull request from the current branch.
    Create {
        /// Pull request title.
        #[arg(long)]
        title: String,

        /// Issue the pull request closes.
        #[arg(long)]
        issue: Option<u64>,

        /// Target branch (default: repository.base_branch).
        #[arg(long)]
        base: Option<String>,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show every setting with its source.
    Show,
    /// Write a setting to the user config file.
    Set {
        /// Dotted key (e.g. repository.base_branch) or its environment variable name.
        key: String,
        value: String,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum CodesCommand {
    /// List codes that can still be redeemed.
    List,
    /// Remove expired codes.
    Prune,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("Failed to determine working directory")?;
    let env = Environment::load(&cwd)?;

    match cli.command {
        Commands::GenerateCode(args) => run_generate_code(&env, args),
        Commands::Init(args) => run_init(&env, args).await,
        Commands::Clone(args) => run_clone(&env, args).await,
        Commands::Fetch(args) => run_fetch(&env, args).await,
        Commands::Checkout(args) => run_checkout(&env, args).await,
        Commands::AddTool(args) => run_add_tool(&env, args).await,
        Commands::Quickstart(args) => run_quickstart(&env, args).await,
        Commands::Commit(args) => run_commit(&env, args).await,
        Commands::Finalize(args) => run_finalize(&env, args).await,
        Commands::Push => {
            let branch = workflow::push(&env.workspace).await?;
            println!("Pushed {} to origin", branch);
            Ok(())
        }
        Commands::Status => run_status(&env).await,
        Commands::Contribute(args) => run_contribute(&env, args).await,
        Commands::Issue { command } => run_issue(&env, command).await,
        Commands::Branch { command } => run_branch(&env, command).await,
        Commands::Pr { command } => run_pr(&env, command).await,
        Commands::Config { command } => run_config(&env, command),
        Commands::Codes { command } => run_codes(&env, command),
    }
}

/// Everything a command needs: resolved settings plus where they came from.
struct Environment {
    paths: ConfigPaths,
    resolver: ConfigResolver,
    workspace: Workspace,
}

impl Environment {
    fn load(cwd: &Path) -> anyhow::Result<Self> {
        let paths = ConfigPaths::discover(cwd);
        let resolver = ConfigResolver::standard(&paths)?;
        let settings = Settings::resolve(&resolver, &paths)?;
        debug!(providers = ?resolver.provider_names(), "configuration loaded");
        Ok(Self {
            workspace: Workspace::new(settings, cwd),
            paths,
            resolver,
        })
    }

    fn settings(&self) -> &Settings {
        self.workspace.settings()
    }

    fn hosting(&self) -> anyhow::Result<GitHubClient> {
        let settings = self.settings();
        let token = settings.require_token()?;
        Ok(GitHubClient::new(
            settings.api_base.clone(),
            Some(token.to_string()),
        )?)
    }

    /// A hosting client when a token is configured, for optional checks.
    fn hosting_if_configured(&self) -> anyhow::Result<Option<GitHubClient>> {
        if self.settings().token.is_none() {
            return Ok(None);
        }
        self.hosting().map(Some)
    }
}

// ============================================================================
// Access codes
// ============================================================================

fn run_generate_code(env: &Environment, args: GenerateCodeArgs) -> anyhow::Result<()> {
    let mut codes = env.workspace.access_codes();
    if let Some(validity) = args.validity {
        codes = codes.with_validity(validity);
    }
    let IssuedCode { code, record } = codes.issue(&args.name)?;
    let window = describe_duration(record.expires_at - record.created_at);

    println!("{}", "=".repeat(50));
    println!("Access code for {}", record.name);
    println!("{}", "=".repeat(50));
    println!("Code: {}", code);
    println!("Valid for: {}", window);
    println!("{}", "=".repeat(50));
    println!();
    println!("Provide this code to the developer with this command:");
    println!("xwgit init --code {}", code);
    println!();
    println!(
        "The code can only be used once and will expire after {}.",
        window
    );
    Ok(())
}

async fn run_init(env: &Environment, args: InitArgs) -> anyhow::Result<()> {
    let codes = env.workspace.access_codes();
    let api = env.hosting_if_configured()?;
    let report = workflow::init(
        &env.workspace,
        api.as_ref().map(|c| c as &dyn HostingApi),
        &codes,
        &args.code,
        args.dir.as_deref(),
    )
    .await
    .map_err(with_new_code_hint)?;

    println!("Access code verified for {}", report.owner);
    if report.cloned {
        println!("Repository cloned into {}", report.repo_dir.display());
    } else {
        println!("Using existing clone at {}", report.repo_dir.display());
    }
    println!(
        "Git identity set: {} <{}>",
        report.user_name, report.user_email
    );
    println!();
    println!("Next steps:");
    println!("1. cd {}", report.repo_dir.display());
    println!("2. xwgit quickstart tool_name --description \"Your tool description\"");
    Ok(())
}

/// Points the user at `generate-code` when their code was rejected.
fn with_new_code_hint(error: anyhow::Error) -> anyhow::Error {
    let rejected = error
        .downcast_ref::<AccessError>()
        .is_some_and(AccessError::is_rejected_code);
    if rejected {
        error.context(NEW_CODE_HINT)
    } else {
        error
    }
}

fn run_codes(env: &Environment, command: CodesCommand) -> anyhow::Result<()> {
    let codes = env.workspace.access_codes();
    match command {
        CodesCommand::List => {
            let pending = codes.pending()?;
            if pending.is_empty() {
                println!("No pending access codes");
                return Ok(());
            }
            let now = Utc::now().timestamp();
            for (code, record) in pending {
                println!(
                    "{}  {:<20}  expires in {}",
                    code,
                    record.name,
                    describe_duration(record.remaining_secs(now))
                );
            }
        }
        CodesCommand::Prune => {
            let removed = codes.prune()?;
            println!("Removed {} expired access code(s)", removed);
        }
    }
    Ok(())
}

/// `1800` -> `30 minutes`, `86400` -> `24 hours`.
fn describe_duration(secs: i64) -> String {
    fn plural(n: i64, unit: &str) -> String {
        if n == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", n, unit)
        }
    }
    if secs >= 3600 && secs % 3600 == 0 {
        plural(secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        plural(secs / 60, "minute")
    } else {
        plural(secs, "second")
    }
}

// ============================================================================
// Repository commands
// ============================================================================

async fn run_clone(env: &Environment, args: CloneArgs) -> anyhow::Result<()> {
    let options = CloneOptions {
        sparse: args.sparse,
        depth: args.depth,
        paths: args.paths,
    };
    let api = env.hosting()?;
    match workflow::clone(&env.workspace, Some(&api), &args.repo, &options).await? {
        CloneOutcome::Cloned(path) => {
            println!("Repository {} cloned into {}", args.repo, path.display())
        }
        CloneOutcome::AlreadyPresent(path) => {
            println!("Repository already exists locally at {}", path.display())
        }
    }
    Ok(())
}

async fn run_fetch(env: &Environment, args: FetchArgs) -> anyhow::Result<()> {
    let copied = workflow::fetch(
        &env.workspace,
        args.kind,
        &args.path,
        args.repo.as_deref(),
        args.branch.as_deref(),
    )
    .await?;
    print_copied(&copied);
    Ok(())
}

async fn run_checkout(env: &Environment, args: CheckoutArgs) -> anyhow::Result<()> {
    match workflow::checkout(&env.workspace, args.kind, &args.path, args.repo.as_deref()).await? {
        CheckoutOutcome::Local(tool) => {
            println!("Tool already exists locally: {}", tool.implementation.display());
            println!("Documentation: {}", display_optional(tool.doc.as_deref()));
            println!("Tests: {}", display_optional(tool.test.as_deref()));
        }
        CheckoutOutcome::Fetched(copied) => print_copied(&copied),
    }
    Ok(())
}

fn print_copied(copied: &[PathBuf]) {
    for path in copied {
        println!("Copied: {}", path.display());
    }
    println!("Fetch completed successfully");
}

fn display_optional(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "Not found".to_string())
}

async fn run_status(env: &Environment) -> anyhow::Result<()> {
    let report = workflow::status(&env.workspace).await?;
    println!("Repository: {}", report.repo_name);
    println!("Branch: {}", report.branch);
    println!(
        "Remote: {}",
        report.remote.as_deref().unwrap_or("unknown")
    );

    if report.changes.is_empty() {
        println!("\nWorking tree clean");
    } else {
        println!("\nUncommitted changes:");
        for change in &report.changes {
            println!("  - {}", change);
        }
    }

    if !report.recent_commits.is_empty() {
        println!("\nRecent commits:");
        for line in &report.recent_commits {
            println!("  - {}", line);
        }
    }
    Ok(())
}

// ============================================================================
// Tools and commits
// ============================================================================

async fn run_add_tool(env: &Environment, args: AddToolArgs) -> anyhow::Result<()> {
    let spec = ToolSpec::new(args.category, args.name, args.description);
    let report = workflow::add_tool(&env.workspace, &spec, args.commit, args.push).await?;
    print_add_tool(&report);
    println!("\nTool {} created successfully", spec.name);
    Ok(())
}

fn print_add_tool(report: &AddToolReport) {
    for path in &report.created {
        println!("Created: {}", path.display());
    }
    match (&report.commit_message, &report.commit_error) {
        (_, Some(error)) => {
            println!("Files created, but not committed: {}", error);
        }
        (Some(message), None) => println!("Committed: {}", message),
        (None, None) => {}
    }
    print_push(&report.push);
}

fn print_push(push: &PushStatus) {
    match push {
        PushStatus::NotRequested => {}
        PushStatus::Pushed => println!("Changes pushed to remote repository"),
        PushStatus::Failed(error) => {
            println!("Committed, but not pushed: {}", error)
        }
    }
}

async fn run_quickstart(env: &Environment, args: QuickstartArgs) -> anyhow::Result<()> {
    let report =
        workflow::quickstart(&env.workspace, &args.name, &args.description, &args.tool_type)
            .await?;
    println!("Created branch: {}", report.branch);
    for path in &report.created {
        println!("Created: {}", path.display());
    }
    println!("\nNext steps:");
    if let Some(implementation) = report.created.first() {
        println!("1. Edit {} to implement your tool", implementation.display());
    }
    println!("2. Edit docs/tools/{}.md to document your tool", args.name);
    println!("3. Run tests with: python tests/test_{}.py", args.name);
    println!("4. When finished, run: xwgit finalize \"Implement tool functionality\"");
    Ok(())
}

async fn run_commit(env: &Environment, args: CommitArgs) -> anyhow::Result<()> {
    let request = CommitRequest {
        message: args.message,
        all: args.all,
        pattern: args.pattern,
        issue: args.issue,
        push: args.push,
    };
    let outcome = workflow::commit(&env.workspace, &request).await?;
    print_commit(&outcome);
    Ok(())
}

async fn run_finalize(env: &Environment, args: FinalizeArgs) -> anyhow::Result<()> {
    let outcome = workflow::finalize(&env.workspace, &args.message, args.issue).await?;
    print_commit(&outcome);
    if let CommitOutcome::Committed { branch, .. } = &outcome {
        println!("\nChanges committed to branch: {}", branch);
        println!("Run `xwgit push` and `xwgit pr create --title ...` to open a pull request.");
    }
    Ok(())
}

fn print_commit(outcome: &CommitOutcome) {
    match outcome {
        CommitOutcome::NothingToCommit => println!("No changes to commit"),
        CommitOutcome::Committed {
            message,
            staged,
            push,
            ..
        } => {
            for path in staged {
                println!("Staged: {}", path);
            }
            println!("Committed: {}", message);
            print_push(push);
        }
    }
}

async fn run_contribute(env: &Environment, args: ContributeArgs) -> anyhow::Result<()> {
    let api = env.hosting_if_configured()?;
    let report = workflow::contribute(
        &env.workspace,
        api.as_ref().map(|c| c as &dyn HostingApi),
        &args.path,
        &args.description,
        args.push,
    )
    .await?;
    print_add_tool(&report.tool);

    println!("\nContribution summary:");
    println!("- Tool: {}", args.path);
    println!("- Description: {}", args.description);
    println!("- Repository: {}", report.repo_dir.display());
    println!(
        "- Committed: {}",
        if report.tool.committed() { "Yes" } else { "No" }
    );
    println!(
        "- Pushed: {}",
        if report.tool.push == PushStatus::Pushed {
            "Yes"
        } else {
            "No"
        }
    );
    Ok(())
}

// ============================================================================
// Hosting commands
// ============================================================================

async fn run_issue(env: &Environment, command: IssueCommand) -> anyhow::Result<()> {
    let api = env.hosting()?;
    match command {
        IssueCommand::Get { number } => {
            let details = workflow::show_issue(&env.workspace, &api, number).await?;
            let issue = &details.issue;
            println!("{}", "=".repeat(43));
            println!("Issue #{}: {}", issue.number, issue.title);
            println!("{}", "=".repeat(43));
            println!("Status: {}", issue.state);
            println!("Created: {}", issue.created_at.to_rfc3339());
            println!("Author: {}", issue.user.login);
            println!(
                "Assignee: {}",
                issue
                    .assignee
                    .as_ref()
                    .map(|a| a.login.as_str())
                    .unwrap_or("Unassigned")
            );
            println!("Labels: {}", issue.label_names().join(", "));
            println!("\n{}\n", issue.body.as_deref().unwrap_or(""));

            if !details.comments.is_empty() {
                println!("Comments:");
                for comment in &details.comments {
                    println!("{} - {}", comment.user.login, comment.created_at.to_rfc3339());
                    println!("{}\n", comment.body);
                }
            }
        }
        IssueCommand::Comment { number, text } => {
            workflow::add_comment(&env.workspace, &api, number, &text).await?;
            println!("Comment added to issue #{}", number);
        }
    }
    Ok(())
}

async fn run_branch(env: &Environment, command: BranchCommand) -> anyhow::Result<()> {
    let api = env.hosting()?;
    match command {
        BranchCommand::Create { issue } => {
            match workflow::create_issue_branch(&env.workspace, &api, issue).await? {
                BranchOutcome::Created(branch) => {
                    println!("Created branch {} for issue #{}", branch, issue)
                }
                BranchOutcome::AlreadyExists(branch) => {
                    println!("Branch {} already exists", branch)
                }
            }
        }
    }
    Ok(())
}

async fn run_pr(env: &Environment, command: PrCommand) -> anyhow::Result<()> {
    let api = env.hosting()?;
    match command {
        PrCommand::Create { title, issue, base } => {
            let pull = workflow::create_pull_request(
                &env.workspace,
                &api,
                &title,
                issue,
                base.as_deref(),
            )
            .await?;
            println!("Pull request created: {}", pull.html_url);
        }
    }
    Ok(())
}

// ============================================================================
// Configuration
// ============================================================================

fn run_config(env: &Environment, command: ConfigCommand) -> anyhow::Result<()> {
    match command {
        ConfigCommand::Show => {
            println!("Config directory: {}", env.paths.home.display());
            for key in ConfigKey::ALL {
                match env.resolver.resolve(*key) {
                    Some(resolved) => {
                        let value = if key.is_secret() {
                            redact(&resolved.value)
                        } else {
                            resolved.value
                        };
                        println!("{:<26} = {:<32} [{}]", key.as_str(), value, resolved.source);
                    }
                    None => println!("{:<26} = (unset)", key.as_str()),
                }
            }
            println!(
                "{:<26} = {}",
                "codes.path (effective)",
                env.settings().codes_path.display()
            );
        }
        ConfigCommand::Set { key, value } => {
            let key = ConfigKey::from_str(&key)?;
            set_user_value(&env.paths.user_config, key, &value)?;
            println!(
                "Set {} in {}",
                key.as_str(),
                env.paths.user_config.display()
            );
        }
    }
    Ok(())
}
