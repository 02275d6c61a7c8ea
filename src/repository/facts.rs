//! Relational fact store for one repository
//!
//! Six relations hold everything the importer derives from history:
//!
//! - **branch**(name, tip)
//! - **commit**(sha, ctime), keyed by sha
//! - **commit_parent**(child, ordinal, parent)
//! - **commit_path**(commit, dir): something under `dir` changed at `commit`
//! - **descriptor_path**(commit, dir, blob): the descriptor in `dir` changed to `blob`
//! - **descriptor_blob**(blob, name, version, snapshot_deps), keyed by blob
//!
//! Mutation only happens through [`FactStore::insert`] and
//! [`FactStore::retract`]. Queries are explicit hash joins over the derived
//! indexes, which are rebuilt whenever a store is loaded.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::model::Sha;

/// Parsed metadata of one descriptor blob. All fields are `None` when the
/// content could not be resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorBlob {
    pub name: Option<String>,
    pub version: Option<String>,
    pub snapshot_deps: Option<bool>,
}

impl DescriptorBlob {
    pub fn unresolved() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fact {
    Branch { name: String, tip: Sha },
    Commit { sha: Sha, ctime: i64 },
    CommitParent { child: Sha, ordinal: u32, parent: Sha },
    CommitPath { commit: Sha, path: String },
    DescriptorPath { commit: Sha, path: String, blob: Sha },
    DescriptorBlob { blob: Sha, info: DescriptorBlob },
}

/// A commit at which a project's descriptor changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchPoint {
    pub commit: Sha,
    pub ctime: i64,
    pub path: String,
    pub blob: Sha,
    pub version: Option<String>,
    pub snapshot_deps: bool,
}

/// Flattened relations, sorted so that equal stores serialize identically
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatFacts {
    pub branches: Vec<(String, Sha)>,
    pub commits: Vec<(Sha, i64)>,
    pub commit_parents: Vec<(Sha, u32, Sha)>,
    pub commit_paths: Vec<(Sha, String)>,
    pub descriptor_paths: Vec<(Sha, String, Sha)>,
    pub descriptor_blobs: Vec<(Sha, DescriptorBlob)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FactCounts {
    pub branches: usize,
    pub commits: usize,
    pub commit_paths: usize,
    pub descriptor_paths: usize,
    pub descriptor_blobs: usize,
}

#[derive(Debug, Default, Clone)]
pub struct FactStore {
    branches: FxHashSet<(String, Sha)>,
    commits: FxHashMap<Sha, i64>,
    commit_parents: FxHashSet<(Sha, u32, Sha)>,
    commit_paths: FxHashSet<(Sha, String)>,
    descriptor_paths: FxHashSet<(Sha, String, Sha)>,
    descriptor_blobs: FxHashMap<Sha, DescriptorBlob>,

    // derived, never persisted
    parents_by_child: FxHashMap<Sha, Vec<(u32, Sha)>>,
    paths_by_blob: FxHashMap<Sha, Vec<(Sha, String)>>,
    commits_by_path: FxHashMap<String, Vec<Sha>>,
}

fn remove_one<T: PartialEq>(items: &mut Vec<T>, item: &T) {
    if let Some(pos) = items.iter().position(|x| x == item) {
        items.swap_remove(pos);
    }
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fact. Returns false if an identical fact was already present.
    /// Keyed relations replace the previous value for the same key.
    pub fn insert(&mut self, fact: Fact) -> bool {
        match fact {
            Fact::Branch { name, tip } => self.branches.insert((name, tip)),
            Fact::Commit { sha, ctime } => self.commits.insert(sha, ctime) != Some(ctime),
            Fact::CommitParent { child, ordinal, parent } => {
                let added = self.commit_parents.insert((child, ordinal, parent));
                if added {
                    self.parents_by_child.entry(child).or_default().push((ordinal, parent));
                }
                added
            }
            Fact::CommitPath { commit, path } => {
                let added = self.commit_paths.insert((commit, path.clone()));
                if added {
                    self.commits_by_path.entry(path).or_default().push(commit);
                }
                added
            }
            Fact::DescriptorPath { commit, path, blob } => {
                let added = self.descriptor_paths.insert((commit, path.clone(), blob));
                if added {
                    self.paths_by_blob.entry(blob).or_default().push((commit, path));
                }
                added
            }
            Fact::DescriptorBlob { blob, info } => {
                if self.descriptor_blobs.get(&blob) == Some(&info) {
                    false
                } else {
                    self.descriptor_blobs.insert(blob, info);
                    true
                }
            }
        }
    }

    /// Remove exactly the given fact. Returns false if it was not present.
    pub fn retract(&mut self, fact: &Fact) -> bool {
        match fact {
            Fact::Branch { name, tip } => self.branches.remove(&(name.clone(), *tip)),
            Fact::Commit { sha, ctime } => {
                self.commits.get(sha) == Some(ctime) && self.commits.remove(sha).is_some()
            }
            Fact::CommitParent { child, ordinal, parent } => {
                let removed = self.commit_parents.remove(&(*child, *ordinal, *parent));
                if removed {
                    if let Some(parents) = self.parents_by_child.get_mut(child) {
                        remove_one(parents, &(*ordinal, *parent));
                    }
                }
                removed
            }
            Fact::CommitPath { commit, path } => {
                let removed = self.commit_paths.remove(&(*commit, path.clone()));
                if removed {
                    if let Some(commits) = self.commits_by_path.get_mut(path) {
                        remove_one(commits, commit);
                    }
                }
                removed
            }
            Fact::DescriptorPath { commit, path, blob } => {
                let removed = self.descriptor_paths.remove(&(*commit, path.clone(), *blob));
                if removed {
                    if let Some(paths) = self.paths_by_blob.get_mut(blob) {
                        remove_one(paths, &(*commit, path.clone()));
                    }
                }
                removed
            }
            Fact::DescriptorBlob { blob, info } => {
                self.descriptor_blobs.get(blob) == Some(info)
                    && self.descriptor_blobs.remove(blob).is_some()
            }
        }
    }

    pub fn counts(&self) -> FactCounts {
        FactCounts {
            branches: self.branches.len(),
            commits: self.commits.len(),
            commit_paths: self.commit_paths.len(),
            descriptor_paths: self.descriptor_paths.len(),
            descriptor_blobs: self.descriptor_blobs.len(),
        }
    }

    /// Branch name → tip
    pub fn branch_tips(&self) -> BTreeMap<String, Sha> {
        self.branches
            .iter()
            .map(|(name, tip)| (name.clone(), *tip))
            .collect()
    }

    pub fn branch_tip(&self, name: &str) -> Option<Sha> {
        self.branches
            .iter()
            .find(|(branch, _)| branch == name)
            .map(|(_, tip)| *tip)
    }

    pub fn has_commit(&self, sha: &Sha) -> bool {
        self.commits.contains_key(sha)
    }

    pub fn commit_time(&self, sha: &Sha) -> Option<i64> {
        self.commits.get(sha).copied()
    }

    /// Commits made at `ctime` whose hex id starts with `prefix`
    pub fn find_commits(&self, ctime: i64, prefix: &str) -> Vec<Sha> {
        let prefix = prefix.to_ascii_lowercase();
        let mut found: Vec<Sha> = self
            .commits
            .iter()
            .filter(|(sha, t)| **t == ctime && sha.to_hex().starts_with(&prefix))
            .map(|(sha, _)| *sha)
            .collect();
        found.sort_unstable();
        found
    }

    /// Parents in their recorded order
    pub fn parents(&self, sha: &Sha) -> Vec<Sha> {
        let mut parents = self.parents_by_child.get(sha).cloned().unwrap_or_default();
        parents.sort_unstable();
        parents.into_iter().map(|(_, parent)| parent).collect()
    }

    pub fn is_merge(&self, sha: &Sha) -> bool {
        self.parents_by_child.get(sha).is_some_and(|p| p.len() > 1)
    }

    pub fn descriptor_blob(&self, blob: &Sha) -> Option<&DescriptorBlob> {
        self.descriptor_blobs.get(blob)
    }

    /// Every resolved project name
    pub fn project_names(&self) -> BTreeSet<&str> {
        self.descriptor_blobs
            .values()
            .filter_map(|b| b.name.as_deref())
            .collect()
    }

    /// descriptor_blob(name = project) ⋈ descriptor_path ⋈ commit
    pub fn touch_points(&self, project: &str) -> Vec<TouchPoint> {
        let mut out = Vec::new();
        for (blob, info) in &self.descriptor_blobs {
            if info.name.as_deref() != Some(project) {
                continue;
            }
            let Some(paths) = self.paths_by_blob.get(blob) else {
                continue;
            };
            for (commit, path) in paths {
                let Some(ctime) = self.commit_time(commit) else {
                    continue;
                };
                out.push(TouchPoint {
                    commit: *commit,
                    ctime,
                    path: path.clone(),
                    blob: *blob,
                    version: info.version.clone(),
                    snapshot_deps: info.snapshot_deps.unwrap_or(false),
                });
            }
        }
        out.sort_by(|a, b| (&a.path, a.ctime, a.commit).cmp(&(&b.path, b.ctime, b.commit)));
        out
    }

    /// Commits at which something under `path` changed
    pub fn commits_touching(&self, path: &str) -> &[Sha] {
        self.commits_by_path.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn touched(&self, commit: &Sha, path: &str) -> bool {
        self.commit_paths.contains(&(*commit, path.to_string()))
    }

    pub fn flatten(&self) -> FlatFacts {
        fn sorted<T: Ord + Clone>(items: impl Iterator<Item = T>) -> Vec<T> {
            let mut v: Vec<T> = items.collect();
            v.sort();
            v
        }

        let mut descriptor_blobs: Vec<(Sha, DescriptorBlob)> = self
            .descriptor_blobs
            .iter()
            .map(|(blob, info)| (*blob, info.clone()))
            .collect();
        descriptor_blobs.sort_by(|a, b| a.0.cmp(&b.0));

        FlatFacts {
            branches: sorted(self.branches.iter().cloned()),
            commits: sorted(self.commits.iter().map(|(sha, ctime)| (*sha, *ctime))),
            commit_parents: sorted(self.commit_parents.iter().copied()),
            commit_paths: sorted(self.commit_paths.iter().cloned()),
            descriptor_paths: sorted(self.descriptor_paths.iter().cloned()),
            descriptor_blobs,
        }
    }

    pub fn from_flat(flat: FlatFacts) -> Self {
        let mut store = FactStore::new();
        for (name, tip) in flat.branches {
            store.insert(Fact::Branch { name, tip });
        }
        for (sha, ctime) in flat.commits {
            store.insert(Fact::Commit { sha, ctime });
        }
        for (child, ordinal, parent) in flat.commit_parents {
            store.insert(Fact::CommitParent { child, ordinal, parent });
        }
        for (commit, path) in flat.commit_paths {
            store.insert(Fact::CommitPath { commit, path });
        }
        for (commit, path, blob) in flat.descriptor_paths {
            store.insert(Fact::DescriptorPath { commit, path, blob });
        }
        for (blob, info) in flat.descriptor_blobs {
            store.insert(Fact::DescriptorBlob { blob, info });
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha(n: u8) -> Sha {
        Sha([n; 20])
    }

    fn blob(name: &str, version: &str, snapshot_deps: bool) -> DescriptorBlob {
        DescriptorBlob {
            name: Some(name.to_string()),
            version: Some(version.to_string()),
            snapshot_deps: Some(snapshot_deps),
        }
    }

    fn sample_store() -> FactStore {
        let mut store = FactStore::new();
        store.insert(Fact::Commit { sha: sha(1), ctime: 100 });
        store.insert(Fact::Commit { sha: sha(2), ctime: 200 });
        store.insert(Fact::CommitParent { child: sha(2), ordinal: 0, parent: sha(1) });
        store.insert(Fact::DescriptorBlob { blob: sha(10), info: blob("g/a", "1.0.0", false) });
        store.insert(Fact::DescriptorBlob { blob: sha(11), info: blob("g/a", "1.1.0", true) });
        store.insert(Fact::DescriptorPath { commit: sha(1), path: "a".into(), blob: sha(10) });
        store.insert(Fact::DescriptorPath { commit: sha(2), path: "a".into(), blob: sha(11) });
        store.insert(Fact::CommitPath { commit: sha(1), path: "a".into() });
        store.insert(Fact::CommitPath { commit: sha(2), path: "a".into() });
        store.insert(Fact::Branch { name: "main".into(), tip: sha(2) });
        store
    }

    #[test]
    fn test_insert_reports_duplicates() {
        let mut store = FactStore::new();
        assert!(store.insert(Fact::CommitPath { commit: sha(1), path: "".into() }));
        assert!(!store.insert(Fact::CommitPath { commit: sha(1), path: "".into() }));
        assert!(store.insert(Fact::Commit { sha: sha(1), ctime: 5 }));
        assert!(!store.insert(Fact::Commit { sha: sha(1), ctime: 5 }));
    }

    #[test]
    fn test_retract_removes_exactly_one_fact() {
        let mut store = sample_store();
        let stale = Fact::Branch { name: "main".into(), tip: sha(2) };
        assert!(store.retract(&stale));
        assert!(!store.retract(&stale));
        assert!(store.branch_tip("main").is_none());

        let wrong_value = Fact::Commit { sha: sha(1), ctime: 999 };
        assert!(!store.retract(&wrong_value));
        assert_eq!(store.commit_time(&sha(1)), Some(100));

        assert!(store.retract(&Fact::DescriptorPath {
            commit: sha(1),
            path: "a".into(),
            blob: sha(10),
        }));
        assert_eq!(store.touch_points("g/a").len(), 1);
    }

    #[test]
    fn test_touch_point_join() {
        let store = sample_store();
        let points = store.touch_points("g/a");
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].commit, sha(1));
        assert_eq!(points[0].version.as_deref(), Some("1.0.0"));
        assert!(!points[0].snapshot_deps);
        assert_eq!(points[1].commit, sha(2));
        assert!(points[1].snapshot_deps);
        assert!(store.touch_points("g/other").is_empty());
    }

    #[test]
    fn test_parents_keep_order() {
        let mut store = FactStore::new();
        store.insert(Fact::CommitParent { child: sha(9), ordinal: 1, parent: sha(3) });
        store.insert(Fact::CommitParent { child: sha(9), ordinal: 0, parent: sha(7) });
        assert_eq!(store.parents(&sha(9)), vec![sha(7), sha(3)]);
        assert!(store.is_merge(&sha(9)));
        assert!(!store.is_merge(&sha(7)));
    }

    #[test]
    fn test_find_commits_by_time_and_prefix() {
        let store = sample_store();
        assert_eq!(store.find_commits(200, "0202"), vec![sha(2)]);
        assert!(store.find_commits(100, "0202").is_empty());
        assert_eq!(store.find_commits(100, "0101010"), vec![sha(1)]);
    }

    #[test]
    fn test_path_lookups() {
        let store = sample_store();
        assert_eq!(store.commits_touching("a").len(), 2);
        assert!(store.commits_touching("b").is_empty());
        assert!(store.touched(&sha(2), "a"));
        assert!(!store.touched(&sha(2), "b"));
    }

    #[test]
    fn test_unresolved_blobs_have_no_project() {
        let mut store = sample_store();
        store.insert(Fact::DescriptorBlob { blob: sha(12), info: DescriptorBlob::unresolved() });
        assert_eq!(store.project_names().into_iter().collect::<Vec<_>>(), vec!["g/a"]);
    }

    #[test]
    fn test_flatten_is_deterministic_and_restorable() {
        let store = sample_store();
        let flat = store.flatten();
        let restored = FactStore::from_flat(flat.clone());
        assert_eq!(restored.flatten(), flat);
        assert_eq!(restored.touch_points("g/a"), store.touch_points("g/a"));
        assert_eq!(restored.parents(&sha(2)), vec![sha(1)]);
        assert_eq!(restored.counts(), store.counts());
    }
}
