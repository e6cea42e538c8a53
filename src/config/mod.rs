//! Configuration for xwgit.
//!
//! Settings are resolved through an ordered list of providers, highest
//! priority first:
//!
//! 1. process environment
//! 2. `./.env`
//! 3. user config (`$XWGIT_HOME/config.json`)
//! 4. shared team config (`$XWGIT_TEAM_CONFIG` or `./.xwgit-team.yaml`)
//! 5. built-in defaults
//!
//! The first provider that knows a key wins.

pub mod provider;

pub use provider::{ConfigProvider, DefaultsProvider, EnvProvider, FileProvider, VarsProvider};

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::access::DEFAULT_VALIDITY_SECS;
use crate::error::ConfigError;
use crate::github::GITHUB_API_BASE;

/// Directory name under `$HOME` used when `XWGIT_HOME` is unset.
const HOME_DIR_NAME: &str = ".xwgit";

/// Team config file looked up in the working directory.
const TEAM_CONFIG_FILE: &str = ".xwgit-team.yaml";

/// Every setting xwgit understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    GithubToken,
    ApiBase,
    Organization,
    Repository,
    BaseBranch,
    CodeValidity,
    CodesPath,
    EmailDomain,
}

impl ConfigKey {
    pub const ALL: &'static [ConfigKey] = &[
        ConfigKey::GithubToken,
        ConfigKey::ApiBase,
        ConfigKey::Organization,
        ConfigKey::Repository,
        ConfigKey::BaseBranch,
        ConfigKey::CodeValidity,
        ConfigKey::CodesPath,
        ConfigKey::EmailDomain,
    ];

    /// Dotted `section.name` form used in config files.
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::GithubToken => "github.token",
            ConfigKey::ApiBase => "github.api_base",
            ConfigKey::Organization => "repository.organization",
            ConfigKey::Repository => "repository.name",
            ConfigKey::BaseBranch => "repository.base_branch",
            ConfigKey::CodeValidity => "codes.validity_secs",
            ConfigKey::CodesPath => "codes.path",
            ConfigKey::EmailDomain => "identity.email_domain",
        }
    }

    /// Environment variable (also used in `.env` files).
    pub fn env_var(self) -> &'static str {
        match self {
            ConfigKey::GithubToken => "GITHUB_TOKEN",
            ConfigKey::ApiBase => "XWGIT_API_BASE",
            ConfigKey::Organization => "XWGIT_ORGANIZATION",
            ConfigKey::Repository => "XWGIT_REPOSITORY",
            ConfigKey::BaseBranch => "XWGIT_BASE_BRANCH",
            ConfigKey::CodeValidity => "XWGIT_CODE_VALIDITY",
            ConfigKey::CodesPath => "XWGIT_CODES_PATH",
            ConfigKey::EmailDomain => "XWGIT_EMAIL_DOMAIN",
        }
    }

    pub fn default_value(self) -> Option<&'static str> {
        match self {
            ConfigKey::GithubToken | ConfigKey::CodesPath => None,
            ConfigKey::ApiBase => Some(GITHUB_API_BASE),
            ConfigKey::Organization => Some("xwander-dev"),
            ConfigKey::Repository => Some("XwDevTools"),
            ConfigKey::BaseBranch => Some("main"),
            ConfigKey::CodeValidity => Some("1800"),
            ConfigKey::EmailDomain => Some("ai.xwander.dev"),
        }
    }

    pub fn is_secret(self) -> bool {
        matches!(self, ConfigKey::GithubToken)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s || k.env_var() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

/// A value together with the provider that supplied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub value: String,
    pub source: String,
}

/// Queries providers in priority order.
#[derive(Default)]
pub struct ConfigResolver {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a provider with lower priority than those already added.
    pub fn with_provider(mut self, provider: impl ConfigProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Builds the standard provider chain for the given paths.
    pub fn standard(paths: &ConfigPaths) -> Result<Self, ConfigError> {
        Ok(Self::new()
            .with_provider(EnvProvider)
            .with_provider(VarsProvider::dotenv(&paths.dotenv)?)
            .with_provider(FileProvider::json("user config", &paths.user_config)?)
            .with_provider(FileProvider::yaml("team config", &paths.team_config)?)
            .with_provider(DefaultsProvider))
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn resolve(&self, key: ConfigKey) -> Option<Resolved> {
        self.providers.iter().find_map(|provider| {
            provider.get(key).map(|value| {
                debug!(key = %key, source = provider.name(), "config resolved");
                Resolved {
                    value,
                    source: provider.name().to_string(),
                }
            })
        })
    }

    pub fn get(&self, key: ConfigKey) -> Option<String> {
        self.resolve(key).map(|r| r.value)
    }

    pub fn require(&self, key: ConfigKey) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::Missing {
            key: key.as_str().to_string(),
            env_var: key.env_var().to_string(),
        })
    }
}

/// Filesystem locations xwgit reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    /// Per-user state directory (`$XWGIT_HOME` or `$HOME/.xwgit`).
    pub home: PathBuf,
    pub user_config: PathBuf,
    pub team_config: PathBuf,
    pub dotenv: PathBuf,
}

impl ConfigPaths {
    /// Derives every path from a state directory and a working directory.
    pub fn new(home: impl Into<PathBuf>, cwd: &Path) -> Self {
        let home = home.into();
        Self {
            user_config: home.join("config.json"),
            team_config: cwd.join(TEAM_CONFIG_FILE),
            dotenv: cwd.join(".env"),
            home,
        }
    }

    /// Uses `XWGIT_HOME`, `XWGIT_TEAM_CONFIG` and `HOME` from the environment.
    pub fn discover(cwd: &Path) -> Self {
        let home = std::env::var_os("XWGIT_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(HOME_DIR_NAME)))
            .unwrap_or_else(|| cwd.join(HOME_DIR_NAME));

        let mut paths = Self::new(home, cwd);
        if let Some(team) = std::env::var_os("XWGIT_TEAM_CONFIG") {
            paths.team_config = PathBuf::from(team);
        }
        paths
    }

    pub fn default_codes_path(&self) -> PathBuf {
        self.home.join("codes.json")
    }
}

/// Fully resolved settings used by the workflow commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub token: Option<String>,
    pub api_base: String,
    pub organization: String,
    pub repository: String,
    pub base_branch: String,
    pub code_validity_secs: i64,
    pub codes_path: PathBuf,
    pub email_domain: String,
}

impl Settings {
    pub fn resolve(resolver: &ConfigResolver, paths: &ConfigPaths) -> Result<Self, ConfigError> {
        let code_validity_secs = match resolver.resolve(ConfigKey::CodeValidity) {
            Some(resolved) => parse_validity(&resolved.value)?,
            None => DEFAULT_VALIDITY_SECS,
        };

        Ok(Self {
            token: resolver.get(ConfigKey::GithubToken),
            api_base: resolver.require(ConfigKey::ApiBase)?,
            organization: resolver.require(ConfigKey::Organization)?,
            repository: resolver.require(ConfigKey::Repository)?,
            base_branch: resolver.require(ConfigKey::BaseBranch)?,
            code_validity_secs,
            codes_path: resolver
                .get(ConfigKey::CodesPath)
                .map(PathBuf::from)
                .unwrap_or_else(|| paths.default_codes_path()),
            email_domain: resolver.require(ConfigKey::EmailDomain)?,
        })
    }

    /// The configured repository as `owner/name`.
    pub fn default_repo(&self) -> String {
        format!("{}/{}", self.organization, self.repository)
    }

    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.token.as_deref().ok_or_else(|| ConfigError::Missing {
            key: ConfigKey::GithubToken.as_str().to_string(),
            env_var: ConfigKey::GithubToken.env_var().to_string(),
        })
    }
}

fn parse_validity(raw: &str) -> Result<i64, ConfigError> {
    let value: i64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: ConfigKey::CodeValidity.as_str().to_string(),
        value: raw.to_string(),
        reason: "expected a whole number of seconds".to_string(),
    })?;
    if value <= 0 {
        return Err(ConfigError::InvalidValue {
            key: ConfigKey::CodeValidity.as_str().to_string(),
            value: raw.to_string(),
            reason: "must be positive".to_string(),
        });
    }
    Ok(value)
}

/// Writes `key = value` into the sectioned user config file.
///
/// The file is replaced atomically and is readable only by its owner, since
/// it may hold the GitHub token. Concurrent writers are not coordinated.
pub fn set_user_value(path: &Path, key: ConfigKey, value: &str) -> Result<(), ConfigError> {
    if key == ConfigKey::CodeValidity {
        parse_validity(value)?;
    }

    let mut root = match fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => serde_json::from_str(&text)?,
        Ok(_) => Value::Object(Map::new()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Value::Object(Map::new()),
        Err(e) => return Err(e.into()),
    };

    let (section, name) = key
        .as_str()
        .split_once('.')
        .ok_or_else(|| ConfigError::UnknownKey(key.as_str().to_string()))?;

    let object = root
        .as_object_mut()
        .ok_or_else(|| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason: "top level is not an object".to_string(),
        })?;
    let section = object
        .entry(section.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !section.is_object() {
        *section = Value::Object(Map::new());
    }
    if let Some(map) = section.as_object_mut() {
        map.insert(name.to_string(), Value::String(value.to_string()));
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all((serde_json::to_string_pretty(&root)? + "\n").as_bytes())?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    tmp.persist(path).map_err(|e| ConfigError::Io(e.error))?;
    debug!(path = %path.display(), key = key.as_str(), "user config updated");
    Ok(())
}

/// Masks all but the last four characters of a secret.
pub fn redact(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}
