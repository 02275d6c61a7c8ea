// Shared benchmark helpers
// Functions here are used across different benchmark files
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::{Repository, Signature, Time};
use gitver::model::Sha;
use gitver::repository::facts::{DescriptorBlob, Fact};
use gitver::repository::pool::IndexedRepo;
use gitver::repository::RepoIndex;

pub fn sha(n: u32) -> Sha {
    let mut bytes = [0u8; 20];
    bytes[..4].copy_from_slice(&n.to_be_bytes());
    bytes[19] = 1;
    Sha(bytes)
}

/// Parent list of commit `i` in a history where every tenth commit merges
/// the previous side commit back in.
pub fn parents_of(i: u32) -> Vec<Sha> {
    match i {
        0 => vec![],
        i if i % 10 == 0 && i >= 2 => vec![sha(i - 1), sha(i - 2)],
        i if i % 10 == 9 && i >= 2 => vec![sha(i - 2)],
        i => vec![sha(i - 1)],
    }
}

/// An index over `num_commits` commits where the descriptor of `proj`
/// changes every `bump_every` commits.
pub fn generate_index(num_commits: u32, bump_every: u32) -> RepoIndex {
    let mut index = RepoIndex::new();
    let base = 1_700_000_000i64;
    for i in 0..num_commits {
        let commit = sha(i);
        let parents = parents_of(i);
        index.facts.insert(Fact::Commit { sha: commit, ctime: base + i as i64 * 60 });
        for (ordinal, parent) in parents.iter().enumerate() {
            index.facts.insert(Fact::CommitParent {
                child: commit,
                ordinal: ordinal as u32,
                parent: *parent,
            });
        }
        index.shabam.add(commit, &parents);
        index.facts.insert(Fact::CommitPath { commit, path: String::new() });
        index.facts.insert(Fact::CommitPath { commit, path: format!("src/m{}", i % 7) });

        if i % bump_every == 0 {
            let mut blob = sha(i / bump_every);
            blob.0[19] = 2;
            index.facts.insert(Fact::DescriptorBlob {
                blob,
                info: DescriptorBlob {
                    name: Some("proj/proj".into()),
                    version: Some(format!("1.{}.0", i / bump_every)),
                    snapshot_deps: Some(false),
                },
            });
            index.facts.insert(Fact::DescriptorPath { commit, path: String::new(), blob });
        }
    }
    if num_commits > 0 {
        index.facts.insert(Fact::Branch {
            name: "main".into(),
            tip: sha(num_commits - 1),
        });
    }
    index
}

pub fn indexed(name: &str, index: RepoIndex) -> IndexedRepo {
    IndexedRepo {
        name: name.to_string(),
        dir: PathBuf::from(name),
        index: Arc::new(index),
    }
}

/// A real repository at `repo_path` with `num_commits` linear commits
/// bumping `project.clj`
pub fn create_test_repo(repo_path: &Path, num_commits: usize) {
    let repo = Repository::init(repo_path).unwrap();

    let mut parent: Option<git2::Oid> = None;
    for i in 0..num_commits {
        let descriptor = format!("(defproject proj \"1.{i}.0\")\n");
        let blob = repo.blob(descriptor.as_bytes()).unwrap();
        let src = repo.blob(format!("(ns core) ; {i}").as_bytes()).unwrap();

        let mut src_tree = repo.treebuilder(None).unwrap();
        src_tree.insert("core.clj", src, 0o100644).unwrap();
        let src_tree = src_tree.write().unwrap();

        let mut root = repo.treebuilder(None).unwrap();
        root.insert("project.clj", blob, 0o100644).unwrap();
        root.insert("src", src_tree, 0o040000).unwrap();
        let tree = repo.find_tree(root.write().unwrap()).unwrap();

        let sig = Signature::new("Bench", "bench@example.com", &Time::new(1_700_000_000 + i as i64, 0)).unwrap();
        let parents: Vec<git2::Commit<'_>> = parent.iter().map(|p| repo.find_commit(*p).unwrap()).collect();
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
        let oid = repo
            .commit(None, &sig, &sig, &format!("commit {i}"), &tree, &parent_refs)
            .unwrap();
        repo.reference("refs/heads/main", oid, true, "bench").unwrap();
        parent = Some(oid);
    }
}
