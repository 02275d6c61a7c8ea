//! Version stamping of a working copy

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use git2::{Repository, Status, StatusOptions};

use crate::error::StampError;
use crate::model::descriptor::parse_descriptor;
use crate::model::version::format_version_with;
use crate::model::{ProjectInfo, Sha, VersionCoordinate};
use crate::repository::git::Git;

/// The derived version of a project directory at its last commit
#[derive(Debug, Clone)]
pub struct Stamp {
    pub descriptor: PathBuf,
    pub project: ProjectInfo,
    pub coordinate: VersionCoordinate,
    pub derived: String,
}

/// Directory of `path` relative to the repository's work tree, `/`-separated
fn relative_dir(workdir: &Path, project_dir: &Path) -> Result<String> {
    let workdir = fs::canonicalize(workdir)?;
    let project_dir = fs::canonicalize(project_dir)
        .with_context(|| format!("Could not resolve {}", project_dir.display()))?;
    let rel = project_dir
        .strip_prefix(&workdir)
        .with_context(|| format!("{} is outside {}", project_dir.display(), workdir.display()))?;
    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Fail if anything under `rel_dir` differs from HEAD, untracked files included
fn ensure_clean(repo: &Repository, rel_dir: &str, project_dir: &Path) -> Result<()> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);
    if !rel_dir.is_empty() {
        opts.pathspec(rel_dir);
    }
    let statuses = repo.statuses(Some(&mut opts))?;
    let dirty = statuses
        .iter()
        .any(|entry| !entry.status().is_empty() && !entry.status().contains(Status::IGNORED));
    if dirty {
        return Err(StampError::DirtyWorkingCopy(project_dir.to_path_buf()).into());
    }
    Ok(())
}

/// Compute the derived version of the project in `project_dir`
pub fn stamp_version(
    project_dir: &Path,
    descriptor: &str,
    allow_dirty: bool,
    sha_length: usize,
) -> Result<Stamp> {
    let descriptor_path = project_dir.join(descriptor);
    let text = fs::read_to_string(&descriptor_path)
        .with_context(|| format!("Failed to read {}", descriptor_path.display()))?;
    let project = parse_descriptor(&text).map_err(|e| {
        tracing::debug!("{}: {e}", descriptor_path.display());
        StampError::UnresolvableDescriptor(descriptor_path.clone())
    })?;

    let repo = Repository::discover(project_dir)
        .with_context(|| format!("{} is not inside a git work tree", project_dir.display()))?;
    let workdir = repo
        .workdir()
        .context("Cannot stamp a project in a bare repository")?
        .to_path_buf();
    let rel_dir = relative_dir(&workdir, project_dir)?;

    if !allow_dirty {
        ensure_clean(&repo, &rel_dir, project_dir)?;
    }

    let pathspec = if rel_dir.is_empty() { "." } else { rel_dir.as_str() };
    let (sha, ctime) = Git::new(&workdir)
        .last_commit_touching(Path::new(pathspec))?
        .ok_or_else(|| StampError::NoHistory(project_dir.to_path_buf()))?;
    let sha = Sha::from_hex(&sha).context("git log printed an invalid commit id")?;

    let coordinate = VersionCoordinate::new(&project.name, &project.version, ctime, sha);
    let derived = format_version_with(&project.version, ctime, &sha, sha_length);
    tracing::info!("{} at {} is {derived}", project.name, sha.short(10));

    Ok(Stamp {
        descriptor: descriptor_path,
        project,
        coordinate,
        derived,
    })
}
