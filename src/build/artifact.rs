//! Building artifacts for git-derived versions

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};

use crate::model::Sha;
use crate::repository::git::Git;
use crate::repository::pool::IndexedRepo;

use super::rewrite::set_project_version;
use super::BuildTarget;

/// Rewrites a descriptor's project version and puts the original content
/// back when dropped.
pub struct StampedDescriptor {
    path: PathBuf,
    original: String,
}

impl StampedDescriptor {
    pub fn apply(path: &Path, version: &str) -> Result<Self> {
        let original = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let stamped = set_project_version(&original, version)?;
        fs::write(path, stamped).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            original,
        })
    }
}

impl Drop for StampedDescriptor {
    fn drop(&mut self) {
        if let Err(e) = fs::write(&self.path, &self.original) {
            tracing::warn!("could not restore {}: {e}", self.path.display());
        }
    }
}

/// Run a command line in `dir`, failing on a non-zero exit
pub fn run_command(dir: &Path, command: &[String]) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        bail!("empty command");
    };
    tracing::info!("running {} in {}", command.join(" "), dir.display());
    let status = Command::new(program)
        .args(args)
        .current_dir(dir)
        .status()
        .with_context(|| format!("Failed to start {program}"))?;
    if !status.success() {
        bail!("{} exited with {status}", command.join(" "));
    }
    Ok(())
}

/// Produces the artifact of a project at one commit
pub trait ArtifactBuilder {
    fn build(&self, repo: &IndexedRepo, target: &BuildTarget) -> Result<()>;
}

/// Builds in a scratch clone: check out the commit, stamp the descriptor
/// with the derived version, run the install command, restore.
#[derive(Debug, Clone)]
pub struct CheckoutBuilder {
    pub build_dir: PathBuf,
    pub descriptor: String,
    pub install_cmd: Vec<String>,
    pub sha_length: usize,
}

impl CheckoutBuilder {
    fn checkout(&self, repo: &IndexedRepo, commit: &Sha) -> Result<PathBuf> {
        let clone_dir = self.build_dir.join(&repo.name);
        if clone_dir.join(".git").exists() {
            Git::new(&clone_dir).run(["fetch", "--quiet", "origin"])?;
        } else {
            fs::create_dir_all(&self.build_dir)
                .with_context(|| format!("Failed to create {}", self.build_dir.display()))?;
            Git::new(&self.build_dir).run([
                OsStr::new("clone"),
                OsStr::new("--quiet"),
                OsStr::new("--shared"),
                OsStr::new("--no-checkout"),
                repo.dir.as_os_str(),
                clone_dir.as_os_str(),
            ])?;
        }
        Git::new(&clone_dir).run(["checkout", "--quiet", "--force", "--detach", commit.to_hex().as_str()])?;
        Ok(clone_dir)
    }
}

impl ArtifactBuilder for CheckoutBuilder {
    fn build(&self, repo: &IndexedRepo, target: &BuildTarget) -> Result<()> {
        let derived = target.derived_version(self.sha_length);
        let clone_dir = self.checkout(repo, &target.commit)?;
        let project_dir = if target.path.is_empty() {
            clone_dir
        } else {
            clone_dir.join(&target.path)
        };

        let _stamped = StampedDescriptor::apply(&project_dir.join(&self.descriptor), &derived)?;
        run_command(&project_dir, &self.install_cmd)
            .with_context(|| format!("Failed to build {derived} from {}", repo.name))
    }
}
