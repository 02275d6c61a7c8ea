//! Staged import results
//!
//! The importer collects everything it learns into an [`ImportDelta`] before
//! touching the index, so a failure halfway through leaves the index as it was.

use std::collections::BTreeMap;

use crate::model::Sha;
use crate::repository::facts::{DescriptorBlob, Fact};
use crate::repository::index::RepoIndex;

/// A commit together with its ordered parents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedCommit {
    pub sha: Sha,
    pub ctime: i64,
    pub parents: Vec<Sha>,
}

#[derive(Debug, Default)]
pub struct ImportDelta {
    pub commits: Vec<StagedCommit>,
    pub commit_paths: Vec<(Sha, String)>,
    pub descriptor_paths: Vec<(Sha, String, Sha)>,
    pub descriptor_blobs: Vec<(Sha, DescriptorBlob)>,
    /// The complete set of branch tips after this import
    pub tips: BTreeMap<String, Sha>,
}

/// What an applied import changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub commits: usize,
    pub descriptors: usize,
    pub indexed: usize,
    pub branches_moved: usize,
    pub branches_removed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Branch tips matched the recorded ones; nothing was read
    Unchanged,
    Updated(ImportSummary),
}

impl ImportOutcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, ImportOutcome::Updated(_))
    }
}

impl ImportDelta {
    /// Apply the staged facts: commit facts first, then ancestry, then the
    /// branch tips. Tips move last so a tip never names an unindexed commit.
    pub fn apply(self, index: &mut RepoIndex) -> ImportSummary {
        let mut summary = ImportSummary {
            commits: self.commits.len(),
            ..ImportSummary::default()
        };
        let facts = &mut index.facts;

        for commit in self.commits {
            facts.insert(Fact::Commit { sha: commit.sha, ctime: commit.ctime });
            for (ordinal, parent) in commit.parents.into_iter().enumerate() {
                facts.insert(Fact::CommitParent {
                    child: commit.sha,
                    ordinal: ordinal as u32,
                    parent,
                });
            }
        }
        for (commit, path) in self.commit_paths {
            facts.insert(Fact::CommitPath { commit, path });
        }
        for (blob, info) in self.descriptor_blobs {
            facts.insert(Fact::DescriptorBlob { blob, info });
        }
        for (commit, path, blob) in self.descriptor_paths {
            if facts.insert(Fact::DescriptorPath { commit, path, blob }) {
                summary.descriptors += 1;
            }
        }

        let tips: Vec<Sha> = self.tips.values().copied().collect();
        summary.indexed = index.shabam.index_from_tips(&tips, |sha| {
            facts.has_commit(sha).then(|| facts.parents(sha))
        });

        for (name, old_tip) in facts.branch_tips() {
            match self.tips.get(&name) {
                Some(tip) if *tip == old_tip => {}
                Some(_) => {
                    facts.retract(&Fact::Branch { name, tip: old_tip });
                }
                None => {
                    facts.retract(&Fact::Branch { name, tip: old_tip });
                    summary.branches_removed += 1;
                }
            }
        }
        for (name, tip) in self.tips {
            if facts.insert(Fact::Branch { name, tip }) {
                summary.branches_moved += 1;
            }
        }

        summary
    }
}
