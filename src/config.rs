use crate::merge::DEFAULT_INSTRUCTIONS;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "themesync.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub review: ReviewConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_path")]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default = "default_instructions")]
    pub instructions: String,
    #[serde(default = "default_verify")]
    pub verify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReviewConfig {
    #[serde(default = "default_review_title")]
    pub title: String,
    #[serde(default = "default_review_body")]
    pub body: String,
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads `explicit` when given, otherwise `themesync.toml` in the working
/// directory if present, otherwise the defaults.
pub fn resolve(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        return load(path);
    }
    let fallback = Path::new(DEFAULT_CONFIG_FILE);
    if fallback.is_file() {
        tracing::debug!("using {}", fallback.display());
        return load(fallback);
    }
    Ok(Config::default())
}

fn default_root() -> PathBuf {
    PathBuf::from(".themesync")
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_branch() -> String {
    "design-tokens".to_string()
}

fn default_path() -> String {
    "src/styles/tokens.css".to_string()
}

fn default_instructions() -> String {
    DEFAULT_INSTRUCTIONS.to_string()
}

fn default_verify() -> bool {
    true
}

fn default_review_title() -> String {
    "Update design tokens".to_string()
}

fn default_review_body() -> String {
    "Merges the latest design-token export into the tracked stylesheet.".to_string()
}

fn default_commit_message() -> String {
    "Merge incoming design tokens".to_string()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            base_branch: default_base_branch(),
            branch: default_branch(),
            path: default_path(),
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            instructions: default_instructions(),
            verify: default_verify(),
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            title: default_review_title(),
            body: default_review_body(),
            commit_message: default_commit_message(),
        }
    }
}
