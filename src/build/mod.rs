//! Collaborators around the build tool: stamping a working copy with its
//! derived version, rewriting descriptors, and building missing
//! git-versioned dependencies from the repository pool.

pub mod artifact;
pub mod resolve;
pub mod rewrite;
pub mod stamp;

pub use artifact::{ArtifactBuilder, CheckoutBuilder, StampedDescriptor};
pub use resolve::{CommandResolver, DependencyResolver};
pub use rewrite::Rewrite;
pub use stamp::{stamp_version, Stamp};

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{anyhow, bail, Result};

use crate::error::{Coordinate, ResolveError};
use crate::model::version::{format_version_with, release_version};
use crate::model::{parse_version, ProjectInfo, Sha};
use crate::query::{Candidate, Constraints, Newest, QueryEngine};
use crate::repository::pool::IndexedRepo;
use crate::repository::TouchPoint;

/// A commit to build, with the descriptor state in effect there
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub commit: Sha,
    pub ctime: i64,
    /// Directory of the descriptor
    pub path: String,
    /// Version declared by the descriptor at `commit`
    pub version: String,
}

impl BuildTarget {
    pub fn derived_version(&self, sha_length: usize) -> String {
        format_version_with(&self.version, self.ctime, &self.commit, sha_length)
    }
}

/// Find the repository and commit a git-derived coordinate was cut from.
///
/// The commit need not change the descriptor itself: the project's state
/// there is the latest descriptor change reachable from it whose declared
/// release matches the coordinate.
pub fn locate<'r>(repos: &'r [IndexedRepo], coordinate: &Coordinate) -> Option<(&'r IndexedRepo, BuildTarget)> {
    let parsed = parse_version(&coordinate.version)?;
    let project = coordinate.project_name();
    repos.iter().find_map(|repo| {
        let commits = repo.find_commits(&parsed);
        if commits.is_empty() {
            return None;
        }
        let shabam = &repo.index.shabam;
        let points = repo.index.facts.touch_points(&project);

        commits.iter().find_map(|commit| {
            let in_effect: Vec<&TouchPoint> = points
                .iter()
                .filter(|p| shabam.reachable_from(commit, &p.commit))
                .collect();
            in_effect
                .iter()
                .filter(|p| {
                    !in_effect
                        .iter()
                        .any(|q| q.path == p.path && shabam.is_ancestor(&p.commit, &q.commit))
                })
                .find_map(|p| {
                    let version = p.version.as_deref()?;
                    let release = format!("{}-", release_version(version));
                    coordinate.version.starts_with(&release).then(|| BuildTarget {
                        commit: *commit,
                        ctime: parsed.ctime,
                        path: p.path.clone(),
                        version: version.to_string(),
                    })
                })
                .map(|target| (repo, target))
        })
    })
}

/// Resolve dependencies, building each missing git-versioned artifact from
/// the pool and retrying. Returns the coordinates that were built.
pub fn build_deps(
    project_dir: &Path,
    resolver: &dyn DependencyResolver,
    builder: &dyn ArtifactBuilder,
    repos: &[IndexedRepo],
) -> Result<Vec<Coordinate>> {
    let mut built: Vec<Coordinate> = Vec::new();
    let mut attempted: BTreeSet<Coordinate> = BTreeSet::new();

    loop {
        let missing = match resolver.resolve(project_dir) {
            Ok(()) => return Ok(built),
            Err(ResolveError::MissingArtifact(missing)) => missing,
            Err(e) => return Err(e.into()),
        };
        if !attempted.insert(missing.clone()) {
            bail!("{missing} is still missing after building it");
        }
        if parse_version(&missing.version).is_none() {
            bail!("{missing} is missing and is not a git-derived version");
        }
        let (repo, target) = locate(repos, &missing)
            .ok_or_else(|| anyhow!("no indexed repository has a commit for {missing}"))?;
        tracing::info!("building {missing} from {} at {}", repo.name, target.commit.short(10));
        builder.build(repo, &target)?;
        built.push(missing);
    }
}

/// A dependency moving to a newer git-derived version
#[derive(Debug, Clone)]
pub struct DependencyUpdate {
    pub name: String,
    pub from: String,
    pub to: Candidate,
}

#[derive(Debug, Default)]
pub struct FreshenPlan {
    pub updates: Vec<DependencyUpdate>,
    pub current: Vec<String>,
    pub not_found: Vec<String>,
    pub ambiguous: Vec<(String, Vec<Candidate>)>,
}

impl FreshenPlan {
    pub fn rewrite(&self) -> Rewrite {
        Rewrite {
            project_version: None,
            dependencies: self
                .updates
                .iter()
                .map(|u| (u.name.clone(), u.to.derived.clone()))
                .collect(),
        }
    }
}

/// Look up the newest version of every git-versioned dependency
pub fn plan_freshen(
    project: &ProjectInfo,
    engine: &QueryEngine<'_>,
    allow_snapshots: bool,
) -> Result<FreshenPlan> {
    let constraints = Constraints {
        allow_snapshots,
        ..Constraints::default()
    };
    let mut plan = FreshenPlan::default();

    for dep in &project.dependencies {
        if parse_version(&dep.version).is_none() {
            continue;
        }
        if engine.resolve_project(&dep.name, &constraints)?.as_deref() != Some(dep.name.as_str()) {
            plan.not_found.push(dep.name.clone());
            continue;
        }
        match engine.newest(&dep.name, &constraints)? {
            Newest::Found(candidate) if candidate.derived == dep.version => {
                plan.current.push(dep.name.clone());
            }
            Newest::Found(candidate) => plan.updates.push(DependencyUpdate {
                name: dep.name.clone(),
                from: dep.version.clone(),
                to: candidate,
            }),
            Newest::Ambiguous(candidates) => plan.ambiguous.push((dep.name.clone(), candidates)),
            Newest::NotFound => plan.not_found.push(dep.name.clone()),
        }
    }
    Ok(plan)
}
