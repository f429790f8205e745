//! Tool configuration parsed from an optional TOML file.
//!
//! Every section is optional; a missing file means all defaults. Run
//! gating (enabled flag, mode, branches) is environment-driven and lives
//! in [`crate::env`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub collect: CollectConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Directory receiving `manifest.json` and one subdirectory per branch.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// URL prefix under which `dir` is served.
    #[serde(default = "default_public_base")]
    pub public_base: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            public_base: default_public_base(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("public/docfind")
}
fn default_public_base() -> String {
    "/docfind".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexerConfig {
    /// Release tag to download, or `latest`.
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_release_base_url")]
    pub release_base_url: String,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            release_base_url: default_release_base_url(),
            cache_dir: None,
        }
    }
}

fn default_version() -> String {
    "latest".to_string()
}
fn default_release_base_url() -> String {
    "https://github.com/microsoft/docfind/releases".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepositoryConfig {
    /// Base URL that `<owner>/<name>.git` is appended to.
    #[serde(default = "default_remote_base")]
    pub remote_base: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            remote_base: default_remote_base(),
        }
    }
}

fn default_remote_base() -> String {
    "https://github.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectConfig {
    /// Files larger than this are indexed by path only.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

impl Config {
    pub fn manifest_path(&self) -> PathBuf {
        self.output.dir.join("manifest.json")
    }

    /// Binary cache directory: configured value, else `$HOME/.cache/docfind-build/bin`.
    pub fn cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.indexer.cache_dir {
            return dir.clone();
        }
        let base = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(base)
            .join(".cache")
            .join("docfind-build")
            .join("bin")
    }
}

/// Load the config file at `path`, falling back to defaults when it does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.collect.max_file_bytes == 0 {
        anyhow::bail!("collect.max_file_bytes must be > 0");
    }

    if config.indexer.version.trim().is_empty() {
        anyhow::bail!("indexer.version must not be empty (use \"latest\")");
    }

    if !config.output.public_base.starts_with('/') {
        anyhow::bail!(
            "output.public_base must start with '/': '{}'",
            config.output.public_base
        );
    }

    Ok(config)
}
