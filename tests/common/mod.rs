// Shared fixtures for integration tests
// Functions here are used across different test files
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use git2::{Oid, Repository, Signature, Time};
use gitver::model::Sha;
use tempfile::TempDir;

/// Base committer time of fixture commits (2024-01-31 17:45:02 UTC)
pub const T0: i64 = 1_706_723_102;

/// A repository whose commits are written directly as trees, with
/// controlled committer times and explicit branch refs.
pub struct TestRepo {
    _temp: Option<TempDir>,
    path: PathBuf,
    pub repo: Repository,
}

impl TestRepo {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let path = temp.path().to_path_buf();
        Self::init(Some(temp), path)
    }

    /// A repository at `<root>/<name>`, owned by the caller's directory
    pub fn in_dir(root: &Path, name: &str) -> Self {
        Self::init(None, root.join(name))
    }

    fn init(temp: Option<TempDir>, path: PathBuf) -> Self {
        let repo = Repository::init(&path).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Test User").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
        Self { _temp: temp, path, repo }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Commit exactly `files` (the full tree) with the given parents and
    /// point `refs/heads/<branch>` at it.
    pub fn commit(&self, branch: &str, parents: &[Oid], files: &[(&str, &str)], time: i64) -> Oid {
        let entries: Vec<(String, Vec<u8>)> = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.as_bytes().to_vec()))
            .collect();
        let tree_id = build_tree(&self.repo, &entries);
        let tree = self.repo.find_tree(tree_id).unwrap();
        let sig = Signature::new("Test User", "test@example.com", &Time::new(time, 0)).unwrap();
        let parents: Vec<git2::Commit<'_>> =
            parents.iter().map(|p| self.repo.find_commit(*p).unwrap()).collect();
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
        let oid = self
            .repo
            .commit(None, &sig, &sig, &format!("commit at {time}"), &tree, &parent_refs)
            .unwrap();
        self.set_branch(branch, oid);
        oid
    }

    pub fn set_branch(&self, branch: &str, oid: Oid) {
        self.repo
            .reference(&format!("refs/heads/{branch}"), oid, true, "fixture")
            .unwrap();
    }

    pub fn delete_branch(&self, branch: &str) {
        self.repo
            .find_reference(&format!("refs/heads/{branch}"))
            .unwrap()
            .delete()
            .unwrap();
    }

    /// Point HEAD at `branch` and check it out into the work tree
    pub fn checkout(&self, branch: &str) {
        self.repo.set_head(&format!("refs/heads/{branch}")).unwrap();
        self.repo
            .checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
            .unwrap();
    }
}

fn build_tree(repo: &Repository, files: &[(String, Vec<u8>)]) -> Oid {
    let mut builder = repo.treebuilder(None).unwrap();
    let mut subdirs: BTreeMap<String, Vec<(String, Vec<u8>)>> = BTreeMap::new();
    for (path, content) in files {
        match path.split_once('/') {
            Some((dir, rest)) => subdirs
                .entry(dir.to_string())
                .or_default()
                .push((rest.to_string(), content.clone())),
            None => {
                let blob = repo.blob(content).unwrap();
                builder.insert(path, blob, 0o100644).unwrap();
            }
        }
    }
    for (dir, entries) in subdirs {
        let oid = build_tree(repo, &entries);
        builder.insert(&dir, oid, 0o040000).unwrap();
    }
    builder.write().unwrap()
}

/// A minimal `project.clj`
pub fn project_clj(name: &str, version: &str, deps: &[(&str, &str)]) -> String {
    let deps: Vec<String> = deps
        .iter()
        .map(|(dep, ver)| format!("[{dep} \"{ver}\"]"))
        .collect();
    format!(
        "(defproject {name} \"{version}\"\n  :description \"fixture\"\n  :dependencies [{}])\n",
        deps.join("\n                 ")
    )
}

pub fn sha(oid: Oid) -> Sha {
    Sha::from_bytes(oid.as_bytes()).unwrap()
}
