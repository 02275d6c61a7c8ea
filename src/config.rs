//! Settings and the per-invocation context
//!
//! Values are layered: built-in defaults, then the JSON config file, then
//! environment and command-line overrides applied by the CLI.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::model::version::DEFAULT_SHA_LENGTH;
use crate::model::DESCRIPTOR_FILE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory whose subdirectories form the repository pool
    pub repos_dir: PathBuf,
    /// Scratch space for dependency builds
    pub build_dir: PathBuf,
    pub descriptor: String,
    pub jobs: usize,
    pub fetch: bool,
    pub resolve_cmd: Vec<String>,
    pub install_cmd: Vec<String>,
    pub sha_length: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let cache = dirs::cache_dir().unwrap_or_else(|| home.join(".cache"));
        Self {
            repos_dir: home.join(".gitver").join("repos"),
            build_dir: cache.join("gitver").join("build"),
            descriptor: DESCRIPTOR_FILE.to_string(),
            jobs: num_cpus::get(),
            fetch: false,
            resolve_cmd: vec!["lein".into(), "deps".into()],
            install_cmd: vec!["lein".into(), "install".into()],
            sha_length: DEFAULT_SHA_LENGTH,
        }
    }
}

impl Settings {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gitver").join("config.json"))
    }

    /// Read settings from `path`; missing fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from an explicit path, or from the default path when it exists
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.jobs > 0, "jobs must be at least 1");
        anyhow::ensure!(
            (4..=40).contains(&self.sha_length),
            "sha_length must be between 4 and 40, got {}",
            self.sha_length
        );
        anyhow::ensure!(!self.descriptor.is_empty(), "descriptor must not be empty");
        Ok(())
    }
}

/// Everything an operation needs to know about its invocation
#[derive(Debug, Clone)]
pub struct Context {
    pub settings: Settings,
    pub cwd: PathBuf,
}

impl Context {
    pub fn new(settings: Settings, cwd: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            cwd: cwd.into(),
        }
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.cwd.join(&self.settings.descriptor)
    }
}
