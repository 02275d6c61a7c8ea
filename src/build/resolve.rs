//! Dependency resolution through the host build tool

use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Coordinate, ResolveError};

static MISSING_ARTIFACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Could not find artifact (\S+)").expect("static regex")
});

/// Resolves a project's dependencies, reporting the first missing artifact
pub trait DependencyResolver {
    fn resolve(&self, project_dir: &Path) -> Result<(), ResolveError>;
}

/// Runs a command such as `lein deps` in the project directory
#[derive(Debug, Clone)]
pub struct CommandResolver {
    program: String,
    args: Vec<String>,
}

impl CommandResolver {
    /// `None` when `command` is empty
    pub fn from_args(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl DependencyResolver for CommandResolver {
    fn resolve(&self, project_dir: &Path) -> Result<(), ResolveError> {
        tracing::info!("resolving dependencies: {} {}", self.program, self.args.join(" "));
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(project_dir)
            .output()?;
        if output.status.success() {
            return Ok(());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if let Some(missing) = parse_missing_artifact(&stderr).or_else(|| parse_missing_artifact(&stdout)) {
            return Err(ResolveError::MissingArtifact(missing));
        }
        Err(ResolveError::Failed(stderr.trim().to_string()))
    }
}

/// Extract the coordinate from an Aether "Could not find artifact
/// group:artifact:ext[:classifier]:version" message
pub fn parse_missing_artifact(output: &str) -> Option<Coordinate> {
    let caps = MISSING_ARTIFACT.captures(output)?;
    let parts: Vec<&str> = caps[1].split(':').collect();
    if parts.len() < 3 {
        return None;
    }
    Some(Coordinate {
        group: parts[0].to_string(),
        artifact: parts[1].to_string(),
        version: parts[parts.len() - 1].to_string(),
    })
}
