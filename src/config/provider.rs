//! Configuration providers.
//!
//! Each provider answers lookups for [`ConfigKey`]s from one source. The
//! [`ConfigResolver`](super::ConfigResolver) queries them in priority order
//! and stops at the first hit.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use super::ConfigKey;
use crate::error::ConfigError;

/// A single source of configuration values.
pub trait ConfigProvider: Send + Sync {
    /// Human-readable source name shown by `xwgit config show`.
    fn name(&self) -> &str;

    /// Returns the value for `key`, if this source defines one.
    fn get(&self, key: ConfigKey) -> Option<String>;
}

/// Reads the live process environment.
#[derive(Debug, Default)]
pub struct EnvProvider;

impl ConfigProvider for EnvProvider {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: ConfigKey) -> Option<String> {
        std::env::var(key.env_var())
            .ok()
            .filter(|v| !v.trim().is_empty())
    }
}

/// Environment-style `NAME=value` pairs held in memory.
///
/// Backs `.env` files and lets tests stand in for the real environment.
#[derive(Debug, Clone, Default)]
pub struct VarsProvider {
    name: String,
    vars: HashMap<String, String>,
}

impl VarsProvider {
    pub fn new(name: impl Into<String>, vars: HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            vars,
        }
    }

    /// Loads a dotenv file. A missing file yields an empty provider.
    pub fn dotenv(path: &Path) -> Result<Self, ConfigError> {
        let name = format!("dotenv ({})", path.display());
        if !path.exists() {
            return Ok(Self::new(name, HashMap::new()));
        }

        let iter = dotenv::from_path_iter(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut vars = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| ConfigError::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            vars.insert(key, value);
        }
        debug!(path = %path.display(), count = vars.len(), "loaded dotenv file");
        Ok(Self::new(name, vars))
    }
}

impl ConfigProvider for VarsProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: ConfigKey) -> Option<String> {
        self.vars
            .get(key.env_var())
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }
}

/// Sectioned config file (`{"github": {"token": "..."}}`) in JSON or YAML.
#[derive(Debug, Clone)]
pub struct FileProvider {
    name: String,
    path: PathBuf,
    root: Value,
}

impl FileProvider {
    /// Loads a JSON file. A missing file yields an empty provider.
    pub fn json(name: impl Into<String>, path: &Path) -> Result<Self, ConfigError> {
        let root = match read_optional(path)? {
            Some(text) if !text.trim().is_empty() => {
                serde_json::from_str(&text).map_err(|e| ConfigError::Unreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
            }
            _ => Value::Null,
        };
        Ok(Self::from_value(name, path, root))
    }

    /// Loads a YAML file. A missing file yields an empty provider.
    pub fn yaml(name: impl Into<String>, path: &Path) -> Result<Self, ConfigError> {
        let root = match read_optional(path)? {
            Some(text) if !text.trim().is_empty() => {
                serde_yaml::from_str(&text).map_err(|e| ConfigError::Unreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
            }
            _ => Value::Null,
        };
        Ok(Self::from_value(name, path, root))
    }

    pub fn from_value(name: impl Into<String>, path: &Path, root: Value) -> Self {
        Self {
            name: format!("{} ({})", name.into(), path.display()),
            path: path.to_path_buf(),
            root,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigProvider for FileProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: ConfigKey) -> Option<String> {
        let mut node = &self.root;
        for part in key.as_str().split('.') {
            node = node.get(part)?;
        }
        match node {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Built-in defaults, always consulted last.
#[derive(Debug, Default)]
pub struct DefaultsProvider;

impl ConfigProvider for DefaultsProvider {
    fn name(&self) -> &str {
        "defaults"
    }

    fn get(&self, key: ConfigKey) -> Option<String> {
        key.default_value().map(str::to_string)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}
