//! Repository pool
//!
//! A pool is a directory whose immediate subdirectories are git
//! repositories (work trees or bare). Imports run one blocking task per
//! repository, at most `jobs` at a time; a repository that fails to import
//! is reported and the rest carry on.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::Semaphore;

use crate::model::descriptor::DESCRIPTOR_FILE;
use crate::model::{ParsedVersion, Sha};
use crate::repository::git::Git;
use crate::repository::importer::{ImportOutcome, Importer, NoopProgress, ProgressReporter};
use crate::repository::index::RepoIndex;

/// A repository found in the pool directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRepo {
    pub name: String,
    pub dir: PathBuf,
}

/// A repository with its up-to-date index, shared read-only
#[derive(Debug, Clone)]
pub struct IndexedRepo {
    pub name: String,
    pub dir: PathBuf,
    pub index: Arc<RepoIndex>,
}

impl IndexedRepo {
    /// Commits matching a parsed git-derived version
    pub fn find_commits(&self, version: &ParsedVersion) -> Vec<Sha> {
        self.index.facts.find_commits(version.ctime, &version.sha_prefix)
    }
}

#[derive(Debug, Clone)]
pub struct RepoImport {
    pub outcome: ImportOutcome,
    pub elapsed: Duration,
    pub index: Arc<RepoIndex>,
}

#[derive(Debug)]
pub struct RepoReport {
    pub repo: PoolRepo,
    pub result: Result<RepoImport>,
}

#[derive(Debug, Clone)]
pub struct RepoPool {
    root: PathBuf,
    descriptor: String,
    jobs: usize,
    fetch: bool,
}

impl RepoPool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            descriptor: DESCRIPTOR_FILE.to_string(),
            jobs: num_cpus::get(),
            fetch: false,
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.descriptor = descriptor.into();
        self
    }

    pub fn with_fetch(mut self, fetch: bool) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Immediate subdirectories that look like git repositories, by name
    pub fn discover(&self) -> Result<Vec<PoolRepo>> {
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read pool directory {}", self.root.display()))?;
        let mut repos = Vec::new();
        for entry in entries {
            let entry = entry?;
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let is_repo = dir.join(".git").exists()
                || (dir.join("HEAD").is_file() && dir.join("objects").is_dir());
            if !is_repo {
                tracing::debug!("skipping non-repository {}", dir.display());
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            repos.push(PoolRepo { name, dir });
        }
        repos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(repos)
    }

    /// Import every repository in the pool in parallel
    pub async fn import_all(&self, progress: &dyn ProgressReporter) -> Result<Vec<RepoReport>> {
        let repos = self.discover()?;
        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let pb = progress.start("Importing", Some(repos.len() as u64));

        let mut handles = Vec::with_capacity(repos.len());
        for repo in &repos {
            let permit = semaphore.clone().acquire_owned().await?;
            let dir = repo.dir.clone();
            let descriptor = self.descriptor.clone();
            let fetch = self.fetch;
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                import_repo(&dir, &descriptor, fetch)
            }));
        }

        let mut reports = Vec::with_capacity(repos.len());
        for (repo, handle) in repos.into_iter().zip(handles) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("import task for {} failed: {e}", repo.name)),
            };
            if let Err(e) = &result {
                tracing::warn!("{}: {e:#}", repo.name);
            }
            pb.set_message(&repo.name);
            pb.inc(1);
            reports.push(RepoReport { repo, result });
        }
        pb.finish();
        Ok(reports)
    }

    /// Import everything and keep the repositories that succeeded
    pub async fn indexed(&self, progress: &dyn ProgressReporter) -> Result<Vec<IndexedRepo>> {
        let reports = self.import_all(progress).await?;
        Ok(reports
            .into_iter()
            .filter_map(|report| {
                let import = report.result.ok()?;
                Some(IndexedRepo {
                    name: report.repo.name,
                    dir: report.repo.dir,
                    index: import.index,
                })
            })
            .collect())
    }
}

/// Load, update and (when changed) save one repository's index
pub fn import_repo(dir: &Path, descriptor: &str, fetch: bool) -> Result<RepoImport> {
    let started = Instant::now();
    let git = Git::new(dir);
    if fetch {
        git.fetch_all()
            .with_context(|| format!("Failed to fetch {}", dir.display()))?;
    }
    let git_dir = git
        .git_dir()
        .with_context(|| format!("{} is not a git repository", dir.display()))?;
    let path = RepoIndex::path_for(&git_dir);
    let mut index = RepoIndex::load(&path);

    let outcome = Importer::new(dir, &NoopProgress)
        .with_descriptor(descriptor)
        .import(&mut index)?;
    if outcome.is_changed() {
        index.save(&path)?;
    }

    Ok(RepoImport {
        outcome,
        elapsed: started.elapsed(),
        index: Arc::new(index),
    })
}
