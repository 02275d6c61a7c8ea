//! Git history importer
//!
//! Brings one repository's [`RepoIndex`] up to date with its branches.
//!
//! # Phases
//!
//! 1. **tips**: list branch tips; identical to the recorded ones means done
//! 2. **export**: one `git fast-export` over the commits not yet indexed
//! 3. **merges**: replace each merge's file list with the paths that differ
//!    from at least two parents
//! 4. **descriptors**: parse every new descriptor blob, once per blob
//! 5. **stage**: collect facts in an [`ImportDelta`]
//! 6. **apply**: commit facts, then ancestry, then branch tips

mod fast_export;
mod merge;
mod progress;
mod types;

pub use fast_export::{parse_fast_export, unquote_path, ExportedCommit, FileChange};
pub use merge::{merge_changes, parse_merge_diff};
pub use progress::{
    IndicatifProgress, NoopProgress, ProgressHandle, ProgressReporter, VerboseProgress,
};
pub use types::{ImportDelta, ImportOutcome, ImportSummary, StagedCommit};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::model::descriptor::{read_descriptor, DESCRIPTOR_FILE};
use crate::model::Sha;
use crate::repository::facts::DescriptorBlob;
use crate::repository::git::Git;
use crate::repository::index::RepoIndex;
use crate::util::format_elapsed;
use crate::util::path::{ancestor_dirs, file_name, parent_dir};

/// Imports git history into a repository index
pub struct Importer<'a> {
    git: Git,
    descriptor: String,
    progress: &'a dyn ProgressReporter,
}

/// Reads descriptor blobs from the object database, falling back to
/// `git cat-file` when gix cannot open the repository.
struct BlobReader<'g> {
    repo: Option<gix::Repository>,
    git: &'g Git,
}

impl<'g> BlobReader<'g> {
    fn open(git: &'g Git) -> Self {
        let repo = match gix::open(git.dir()) {
            Ok(repo) => Some(repo),
            Err(e) => {
                tracing::warn!("gix could not open {}: {e}; using git cat-file", git.dir().display());
                None
            }
        };
        Self { repo, git }
    }

    fn read(&self, blob: &Sha) -> Result<Vec<u8>> {
        if let Some(repo) = &self.repo {
            let oid = gix::ObjectId::try_from(blob.0.as_slice())?;
            match repo.find_object(oid) {
                Ok(object) => return Ok(object.data.clone()),
                Err(e) => tracing::debug!("gix lookup of {} failed: {e}", blob.short(10)),
            }
        }
        Ok(self.git.cat_blob(&blob.to_hex())?)
    }
}

impl<'a> Importer<'a> {
    pub fn new(repo_dir: impl Into<PathBuf>, progress: &'a dyn ProgressReporter) -> Self {
        Self {
            git: Git::new(repo_dir),
            descriptor: DESCRIPTOR_FILE.to_string(),
            progress,
        }
    }

    /// Use a descriptor file name other than `project.clj`
    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.descriptor = descriptor.into();
        self
    }

    pub fn repo_dir(&self) -> &Path {
        self.git.dir()
    }

    /// Bring `index` up to date. On error the index is left untouched.
    pub fn import(&self, index: &mut RepoIndex) -> Result<ImportOutcome> {
        let started = Instant::now();
        let Some(delta) = self.stage(index)? else {
            tracing::debug!("{}: branch tips unchanged", self.git.dir().display());
            return Ok(ImportOutcome::Unchanged);
        };
        let summary = delta.apply(index);
        tracing::info!(
            "{}: imported {} commits, {} descriptor changes in {}",
            self.git.dir().display(),
            summary.commits,
            summary.descriptors,
            format_elapsed(started.elapsed())
        );
        Ok(ImportOutcome::Updated(summary))
    }

    /// Stage everything that changed since `index` was last updated, or
    /// `None` when the branch tips are unchanged.
    pub fn stage(&self, index: &RepoIndex) -> Result<Option<ImportDelta>> {
        // Phase 1: tips
        let listed = self
            .git
            .branch_tips()
            .with_context(|| format!("Failed to list branches of {}", self.git.dir().display()))?;
        let mut tips: BTreeMap<String, Sha> = BTreeMap::new();
        let mut refnames: FxHashMap<String, String> = FxHashMap::default();
        for tip in listed {
            let Some(sha) = Sha::from_hex(&tip.sha) else {
                tracing::warn!("skipping {} with unparsable id {}", tip.refname, tip.sha);
                continue;
            };
            refnames.insert(tip.name.clone(), tip.refname);
            tips.insert(tip.name, sha);
        }

        let recorded = index.facts.branch_tips();
        if recorded == tips {
            return Ok(None);
        }

        // Phase 2: export commits reachable from moved tips only
        let to_export: Vec<&str> = tips
            .iter()
            .filter(|(name, sha)| recorded.get(*name) != Some(*sha) && !index.facts.has_commit(sha))
            .filter_map(|(name, _)| refnames.get(name).map(String::as_str))
            .collect();
        let exclude: Vec<String> = recorded
            .values()
            .filter(|sha| index.facts.has_commit(sha))
            .map(|sha| format!("^{}", sha.to_hex()))
            .collect();

        let exported = if to_export.is_empty() {
            Vec::new()
        } else {
            self.export(&to_export, &exclude)?
        };
        let exported: Vec<ExportedCommit> = exported
            .into_iter()
            .filter(|c| !index.facts.has_commit(&c.sha))
            .collect();

        let mut delta = ImportDelta {
            tips,
            ..ImportDelta::default()
        };
        if exported.is_empty() {
            return Ok(Some(delta));
        }

        // Phases 3 to 5
        let reader = BlobReader::open(&self.git);
        let mut blob_cache: FxHashSet<Sha> = FxHashSet::default();
        let pb = self.progress.start("Indexing commits", Some(exported.len() as u64));

        for commit in exported {
            pb.inc(1);
            let changes = if commit.parents.len() > 1 {
                merge_changes(&self.git, &commit.sha).with_context(|| {
                    format!("Failed to diff merge {}", commit.sha.short(10))
                })?
            } else {
                commit.changes
            };

            let mut dirs: FxHashSet<&str> = FxHashSet::default();
            for change in &changes {
                dirs.extend(ancestor_dirs(change.path()));

                let FileChange::Modify { path, blob } = change else {
                    continue;
                };
                if file_name(path) != self.descriptor {
                    continue;
                }
                if index.facts.descriptor_blob(blob).is_none() && blob_cache.insert(*blob) {
                    let info = self.describe_blob(&reader, blob);
                    delta.descriptor_blobs.push((*blob, info));
                }
                delta
                    .descriptor_paths
                    .push((commit.sha, parent_dir(path).to_string(), *blob));
            }
            let mut dirs: Vec<&str> = dirs.into_iter().collect();
            dirs.sort_unstable();
            delta
                .commit_paths
                .extend(dirs.into_iter().map(|dir| (commit.sha, dir.to_string())));

            delta.commits.push(StagedCommit {
                sha: commit.sha,
                ctime: commit.ctime,
                parents: commit.parents,
            });
        }
        pb.finish();

        Ok(Some(delta))
    }

    fn export(&self, refs: &[&str], exclude: &[String]) -> Result<Vec<ExportedCommit>> {
        let started = Instant::now();
        let mut args: Vec<&str> = vec![
            "fast-export",
            "--no-data",
            "--show-original-ids",
            "--reference-excluded-parents",
            "--use-done-feature",
        ];
        args.extend(refs);
        args.extend(exclude.iter().map(String::as_str));

        let out = self
            .git
            .run(&args)
            .with_context(|| format!("Failed to export history of {}", self.git.dir().display()))?;
        let commits = parse_fast_export(&out.stdout).context("Failed to parse fast-export stream")?;
        tracing::info!(
            "{}: exported {} commits ({} bytes) in {}",
            self.git.dir().display(),
            commits.len(),
            out.stdout.len(),
            format_elapsed(started.elapsed())
        );
        Ok(commits)
    }

    fn describe_blob(&self, reader: &BlobReader<'_>, blob: &Sha) -> DescriptorBlob {
        let content = match reader.read(blob) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("could not read descriptor blob {}: {e:#}", blob.short(10));
                return DescriptorBlob::unresolved();
            }
        };
        match read_descriptor(&content) {
            Some(info) => DescriptorBlob {
                snapshot_deps: Some(info.has_snapshot_deps()),
                name: Some(info.name),
                version: Some(info.version),
            },
            None => DescriptorBlob::unresolved(),
        }
    }
}
