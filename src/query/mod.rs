//! Newest-version query engine
//!
//! Answers "which commit holds the newest version of project X" over every
//! indexed repository, honouring repo/branch/path/version/snapshot
//! constraints. The answer is a set of frontier commits: touch points at
//! the maximal version with no other such touch point downstream of them.

mod table;

pub use table::write_candidates;

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::error::QueryError;
use crate::model::version::{format_version_with, DEFAULT_SHA_LENGTH};
use crate::model::{MavenVersion, Sha, VersionConstraint, VersionCoordinate};
use crate::repository::pool::IndexedRepo;
use crate::repository::TouchPoint;

/// Narrowing applied to a query. `None` fields are unconstrained.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub path: Option<String>,
    /// Maven range (`[1.0,2.0)`) or version prefix (`1.2`)
    pub version: Option<String>,
    pub allow_snapshots: bool,
}

/// One frontier commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub repo: String,
    pub path: String,
    pub project: String,
    pub version: String,
    pub branches: Vec<String>,
    pub ctime: i64,
    pub sha: Sha,
    pub derived: String,
    /// Later commits touching the path without a newer descriptor
    pub pending: usize,
}

impl Candidate {
    pub fn coordinate(&self) -> VersionCoordinate {
        VersionCoordinate::new(&self.project, &self.version, self.ctime, self.sha)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Newest {
    Found(Candidate),
    /// Several distinct version strings; sorted by repo, path and time
    Ambiguous(Vec<Candidate>),
    NotFound,
}

/// A touch point that survived filtering, with the branches that reach it
struct Reached<'r> {
    repo: &'r IndexedRepo,
    point: TouchPoint,
    version: MavenVersion,
    branches: Vec<String>,
}

pub struct QueryEngine<'a> {
    repos: &'a [IndexedRepo],
    sha_length: usize,
}

impl<'a> QueryEngine<'a> {
    pub fn new(repos: &'a [IndexedRepo]) -> Self {
        Self {
            repos,
            sha_length: DEFAULT_SHA_LENGTH,
        }
    }

    pub fn with_sha_length(mut self, sha_length: usize) -> Self {
        self.sha_length = sha_length;
        self
    }

    fn selected_repos(&self, constraints: &Constraints) -> impl Iterator<Item = &'a IndexedRepo> {
        self.repos
            .iter()
            .filter(move |r| constraints.repo.as_deref().is_none_or(|name| r.name == name))
    }

    /// Resolve a possibly partial project name: exact match, then artifact
    /// name, then substring.
    pub fn resolve_project(
        &self,
        query: &str,
        constraints: &Constraints,
    ) -> Result<Option<String>, QueryError> {
        let names: BTreeSet<&str> = self
            .selected_repos(constraints)
            .flat_map(|r| r.index.facts.project_names())
            .collect();

        if names.contains(query) {
            return Ok(Some(query.to_string()));
        }
        let by_artifact: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| name.rsplit('/').next() == Some(query))
            .collect();
        let by_substring: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| name.contains(query))
            .collect();

        for matches in [by_artifact, by_substring] {
            match matches.as_slice() {
                [] => continue,
                [one] => return Ok(Some(one.to_string())),
                many => {
                    return Err(QueryError::AmbiguousProject {
                        query: query.to_string(),
                        candidates: many.iter().map(|s| s.to_string()).collect(),
                    });
                }
            }
        }
        Ok(None)
    }

    pub fn newest(&self, project: &str, constraints: &Constraints) -> Result<Newest, QueryError> {
        let Some(project) = self.resolve_project(project, constraints)? else {
            tracing::debug!("no project matches {project:?}");
            return Ok(Newest::NotFound);
        };
        let version_filter = constraints
            .version
            .as_deref()
            .map(VersionConstraint::parse)
            .transpose()?;

        // Touch points reachable from a selected branch, filtered
        let mut reached: Vec<Reached<'a>> = Vec::new();
        for repo in self.selected_repos(constraints) {
            let facts = &repo.index.facts;
            let shabam = &repo.index.shabam;
            let tips: Vec<(String, Sha)> = facts
                .branch_tips()
                .into_iter()
                .filter(|(name, _)| constraints.branch.as_deref().is_none_or(|b| b == name.as_str()))
                .collect();
            if tips.is_empty() {
                continue;
            }

            for point in facts.touch_points(&project) {
                if constraints.path.as_deref().is_some_and(|p| p != point.path) {
                    continue;
                }
                let Some(version) = point.version.as_deref() else {
                    continue;
                };
                if point.snapshot_deps && !constraints.allow_snapshots {
                    continue;
                }
                if version_filter.as_ref().is_some_and(|f| !f.matches(version)) {
                    continue;
                }
                let branches: Vec<String> = tips
                    .iter()
                    .filter(|(_, tip)| shabam.reachable_from(tip, &point.commit))
                    .map(|(name, _)| name.clone())
                    .collect();
                if branches.is_empty() {
                    continue;
                }
                reached.push(Reached {
                    repo,
                    version: MavenVersion::parse(version),
                    point,
                    branches,
                });
            }
        }

        // Maximal version across every combination
        let Some(max) = reached.iter().map(|r| r.version.clone()).max() else {
            return Ok(Newest::NotFound);
        };
        reached.retain(|r| r.version == max);

        // Frontier per (repo, path)
        let mut groups: FxHashMap<(&str, &str), Vec<Sha>> = FxHashMap::default();
        for r in &reached {
            if !r.repo.index.facts.is_merge(&r.point.commit) {
                groups
                    .entry((r.repo.name.as_str(), r.point.path.as_str()))
                    .or_default()
                    .push(r.point.commit);
            }
        }
        let mut candidates: Vec<Candidate> = Vec::new();
        for r in &reached {
            let facts = &r.repo.index.facts;
            if facts.is_merge(&r.point.commit) {
                tracing::debug!("merge {} is never a frontier", r.point.commit.short(10));
                continue;
            }
            let Some(group) = groups.get(&(r.repo.name.as_str(), r.point.path.as_str())) else {
                continue;
            };
            if !r.repo.index.shabam.descendants_of(&r.point.commit, group).is_empty() {
                continue;
            }
            candidates.push(self.candidate(&project, r));
        }

        Ok(collapse(candidates))
    }

    fn candidate(&self, project: &str, r: &Reached<'_>) -> Candidate {
        let index = &r.repo.index;
        let touching = index.facts.commits_touching(&r.point.path);
        let tips: Vec<Sha> = r
            .branches
            .iter()
            .filter_map(|b| index.facts.branch_tip(b))
            .collect();
        let pending = index
            .shabam
            .descendants_of(&r.point.commit, touching)
            .into_iter()
            .filter(|c| tips.iter().any(|tip| index.shabam.reachable_from(tip, c)))
            .count();

        let version = r.point.version.clone().unwrap_or_default();
        Candidate {
            repo: r.repo.name.clone(),
            path: r.point.path.clone(),
            project: project.to_string(),
            derived: format_version_with(&version, r.point.ctime, &r.point.commit, self.sha_length),
            version,
            branches: r.branches.clone(),
            ctime: r.point.ctime,
            sha: r.point.commit,
            pending,
        }
    }
}

/// Merge candidates rendering to the same version string, then decide
fn collapse(candidates: Vec<Candidate>) -> Newest {
    let mut merged: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        match merged.iter_mut().find(|c| c.derived == candidate.derived) {
            Some(existing) => {
                for branch in candidate.branches {
                    if !existing.branches.contains(&branch) {
                        existing.branches.push(branch);
                    }
                }
                existing.branches.sort();
            }
            None => merged.push(candidate),
        }
    }

    merged.sort_by(|a, b| {
        (&a.repo, &a.path, a.ctime, a.sha).cmp(&(&b.repo, &b.path, b.ctime, b.sha))
    });
    match merged.len() {
        0 => Newest::NotFound,
        1 => merged.pop().map_or(Newest::NotFound, Newest::Found),
        _ => Newest::Ambiguous(merged),
    }
}

/// Newest version of `project` with the default sha length
pub fn newest(
    repos: &[IndexedRepo],
    project: &str,
    constraints: &Constraints,
) -> Result<Newest, QueryError> {
    QueryEngine::new(repos).newest(project, constraints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::repository::facts::{DescriptorBlob, Fact};
    use crate::repository::index::RepoIndex;

    fn sha(n: u8) -> Sha {
        Sha([n; 20])
    }

    /// Builds an index by hand: commits in parents-first order
    struct Builder {
        index: RepoIndex,
    }

    impl Builder {
        fn new() -> Self {
            Self { index: RepoIndex::new() }
        }

        fn commit(mut self, n: u8, parents: &[u8]) -> Self {
            let parents: Vec<Sha> = parents.iter().map(|p| sha(*p)).collect();
            self.index.facts.insert(Fact::Commit { sha: sha(n), ctime: 1_700_000_000 + n as i64 * 60 });
            for (ordinal, parent) in parents.iter().enumerate() {
                self.index.facts.insert(Fact::CommitParent {
                    child: sha(n),
                    ordinal: ordinal as u32,
                    parent: *parent,
                });
            }
            self.index.shabam.add(sha(n), &parents);
            self.index.facts.insert(Fact::CommitPath { commit: sha(n), path: "lib".into() });
            self
        }

        fn descriptor(mut self, n: u8, version: &str, snapshot_deps: bool) -> Self {
            let blob = Sha([n.wrapping_add(100); 20]);
            self.index.facts.insert(Fact::DescriptorBlob {
                blob,
                info: DescriptorBlob {
                    name: Some("org.example/widget".into()),
                    version: Some(version.into()),
                    snapshot_deps: Some(snapshot_deps),
                },
            });
            self.index.facts.insert(Fact::DescriptorPath { commit: sha(n), path: "lib".into(), blob });
            self
        }

        fn branch(mut self, name: &str, tip: u8) -> Self {
            self.index.facts.insert(Fact::Branch { name: name.into(), tip: sha(tip) });
            self
        }

        fn repo(self, name: &str) -> IndexedRepo {
            IndexedRepo {
                name: name.into(),
                dir: PathBuf::from(name),
                index: Arc::new(self.index),
            }
        }
    }

    fn found(result: Newest) -> Candidate {
        match result {
            Newest::Found(c) => c,
            other => panic!("expected a single candidate, got {other:?}"),
        }
    }

    #[test]
    fn test_linear_history_has_one_frontier() {
        let repo = Builder::new()
            .commit(1, &[]).descriptor(1, "1.0.0", false)
            .commit(2, &[1]).descriptor(2, "1.1.0", false)
            .commit(3, &[2]).descriptor(3, "1.2.0", false)
            .commit(4, &[3])
            .branch("main", 4)
            .repo("r");
        let repos = [repo];

        let c = found(newest(&repos, "org.example/widget", &Constraints::default()).unwrap());
        assert_eq!(c.sha, sha(3));
        assert_eq!(c.version, "1.2.0");
        assert_eq!(c.branches, vec!["main"]);
        assert_eq!(c.pending, 1);
        assert!(c.derived.starts_with("1.2.0-2023"));
        assert!(c.derived.ends_with("-g0303030"));
    }

    #[test]
    fn test_same_version_keeps_latest_commit() {
        let repo = Builder::new()
            .commit(1, &[]).descriptor(1, "2.0.0", false)
            .commit(2, &[1]).descriptor(2, "2.0.0", false)
            .branch("main", 2)
            .repo("r");
        let c = found(newest(&[repo], "widget", &Constraints::default()).unwrap());
        assert_eq!(c.sha, sha(2));
        assert_eq!(c.pending, 0);
    }

    #[test]
    fn test_merged_legs_are_ambiguous_and_merge_is_never_chosen() {
        // 1 -> 2 (leg a), 1 -> 3 (leg b), 4 merges both
        let repo = Builder::new()
            .commit(1, &[]).descriptor(1, "1.0.0", false)
            .commit(2, &[1]).descriptor(2, "1.1.0", false)
            .commit(3, &[1]).descriptor(3, "1.1.0", false)
            .commit(4, &[2, 3]).descriptor(4, "1.1.0", false)
            .branch("main", 4)
            .repo("r");

        match newest(&[repo], "widget", &Constraints::default()).unwrap() {
            Newest::Ambiguous(candidates) => {
                let shas: Vec<Sha> = candidates.iter().map(|c| c.sha).collect();
                assert_eq!(shas, vec![sha(2), sha(3)]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_dependencies_are_excluded_unless_allowed() {
        let repo = Builder::new()
            .commit(1, &[]).descriptor(1, "1.0.0", false)
            .commit(2, &[1]).descriptor(2, "1.1.0", true)
            .branch("main", 2)
            .repo("r");
        let repos = [repo];

        let strict = found(newest(&repos, "widget", &Constraints::default()).unwrap());
        assert_eq!(strict.version, "1.0.0");

        let relaxed = Constraints { allow_snapshots: true, ..Constraints::default() };
        let relaxed = found(newest(&repos, "widget", &relaxed).unwrap());
        assert_eq!(relaxed.version, "1.1.0");
    }

    #[test]
    fn test_version_prefix_and_range() {
        let repo = Builder::new()
            .commit(1, &[]).descriptor(1, "1.0.5", false)
            .commit(2, &[1]).descriptor(2, "1.1.0", false)
            .commit(3, &[2]).descriptor(3, "2.0.0", false)
            .branch("main", 3)
            .repo("r");
        let repos = [repo];

        let prefix = Constraints { version: Some("1.0".into()), ..Constraints::default() };
        assert_eq!(found(newest(&repos, "widget", &prefix).unwrap()).version, "1.0.5");

        let range = Constraints { version: Some("[1.0,2.0)".into()), ..Constraints::default() };
        assert_eq!(found(newest(&repos, "widget", &range).unwrap()).version, "1.1.0");

        let bad = Constraints { version: Some("[2.0,1.0]".into()), ..Constraints::default() };
        assert!(newest(&repos, "widget", &bad).is_err());
    }

    #[test]
    fn test_branch_constraint_and_unreachable_points() {
        // side holds a newer version than main
        let repo = Builder::new()
            .commit(1, &[]).descriptor(1, "1.0.0", false)
            .commit(2, &[1]).descriptor(2, "1.1.0", false)
            .branch("main", 1)
            .branch("side", 2)
            .repo("r");
        let repos = [repo];

        let any = found(newest(&repos, "widget", &Constraints::default()).unwrap());
        assert_eq!(any.branches, vec!["side"]);

        let main = Constraints { branch: Some("main".into()), ..Constraints::default() };
        let on_main = found(newest(&repos, "widget", &main).unwrap());
        assert_eq!(on_main.version, "1.0.0");

        let missing = Constraints { branch: Some("nope".into()), ..Constraints::default() };
        assert_eq!(newest(&repos, "widget", &missing).unwrap(), Newest::NotFound);
    }

    #[test]
    fn test_same_commit_on_two_branches_collapses() {
        let repo = Builder::new()
            .commit(1, &[]).descriptor(1, "1.0.0", false)
            .commit(2, &[1])
            .branch("main", 2)
            .branch("release", 1)
            .repo("r");
        let c = found(newest(&[repo], "widget", &Constraints::default()).unwrap());
        assert_eq!(c.branches, vec!["main", "release"]);
    }

    #[test]
    fn test_candidates_from_two_repositories_are_ambiguous() {
        let a = Builder::new().commit(1, &[]).descriptor(1, "1.0.0", false).branch("main", 1).repo("a");
        let b = Builder::new().commit(2, &[]).descriptor(2, "1.0.0", false).branch("main", 2).repo("b");
        let repos = [a, b];

        match newest(&repos, "widget", &Constraints::default()).unwrap() {
            Newest::Ambiguous(c) => assert_eq!(c.iter().map(|c| c.repo.as_str()).collect::<Vec<_>>(), ["a", "b"]),
            other => panic!("expected ambiguity, got {other:?}"),
        }

        let only_b = Constraints { repo: Some("b".into()), ..Constraints::default() };
        assert_eq!(found(newest(&repos, "widget", &only_b).unwrap()).sha, sha(2));
    }

    #[test]
    fn test_project_name_resolution() {
        let mut index = RepoIndex::new();
        for (n, name) in [(1u8, "org.example/widget"), (2, "org.example/widget-ui"), (3, "other/gadget")] {
            index.facts.insert(Fact::DescriptorBlob {
                blob: sha(n),
                info: DescriptorBlob {
                    name: Some(name.into()),
                    version: Some("1.0".into()),
                    snapshot_deps: Some(false),
                },
            });
        }
        let repos = [IndexedRepo { name: "r".into(), dir: PathBuf::from("r"), index: Arc::new(index) }];
        let engine = QueryEngine::new(&repos);
        let none = Constraints::default();

        assert_eq!(engine.resolve_project("org.example/widget", &none).unwrap().as_deref(), Some("org.example/widget"));
        assert_eq!(engine.resolve_project("widget", &none).unwrap().as_deref(), Some("org.example/widget"));
        assert_eq!(engine.resolve_project("gadg", &none).unwrap().as_deref(), Some("other/gadget"));
        assert_eq!(engine.resolve_project("zzz", &none).unwrap(), None);
        assert!(matches!(
            engine.resolve_project("org.example", &none),
            Err(QueryError::AmbiguousProject { .. })
        ));
    }

    #[test]
    fn test_unknown_project_is_not_found() {
        let repo = Builder::new().commit(1, &[]).descriptor(1, "1.0.0", false).branch("main", 1).repo("r");
        assert_eq!(newest(&[repo], "nothing-like-it", &Constraints::default()).unwrap(), Newest::NotFound);
    }
}
