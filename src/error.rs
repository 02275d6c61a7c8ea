//! Domain error types
//!
//! Orchestration code (importer, pool, CLI) works in `anyhow::Result` and
//! attaches context; the failures callers need to tell apart are typed here.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A git subprocess exited with a code the caller did not allow
#[derive(Debug)]
pub struct GitError {
    pub dir: PathBuf,
    pub args: Vec<String>,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self
            .code
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        write!(f, "git {} failed in {} (exit {code})", self.args.join(" "), self.dir.display())?;
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            write!(f, ": {stderr}")?;
        }
        Ok(())
    }
}

impl std::error::Error for GitError {}

/// Maven-style coordinate of an artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
}

impl Coordinate {
    /// `group/artifact` as used in descriptors
    pub fn project_name(&self) -> String {
        format!("{}/{}", self.group, self.artifact)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("artifact not found: {0}")]
    MissingArtifact(Coordinate),
    #[error("dependency resolution failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StampError {
    #[error("working copy has uncommitted changes under {0}")]
    DirtyWorkingCopy(PathBuf),
    #[error("no commit has touched {0}")]
    NoHistory(PathBuf),
    #[error("descriptor {0} could not be resolved")]
    UnresolvableDescriptor(PathBuf),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RewriteError {
    #[error("no occurrence of {0} found in descriptor")]
    NoMatch(String),
    #[error("{1} occurrences of {0} found in descriptor")]
    MultipleMatches(String, usize),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("project name {query:?} is ambiguous: {}", candidates.join(", "))]
    AmbiguousProject { query: String, candidates: Vec<String> },
    #[error(transparent)]
    Range(#[from] crate::model::maven::RangeError),
}
