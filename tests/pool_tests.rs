mod common;

use common::{project_clj, TestRepo, T0};
use gitver::repository::importer::{ImportOutcome, NoopProgress};
use gitver::repository::RepoPool;
use tempfile::TempDir;

#[tokio::test]
async fn test_broken_repository_does_not_stop_the_pool() {
    let root = TempDir::new().unwrap();
    let alpha = TestRepo::in_dir(root.path(), "alpha");
    alpha.commit("main", &[], &[("project.clj", &project_clj("alpha", "1.0.0", &[]))], T0);
    let gamma = TestRepo::in_dir(root.path(), "gamma");
    gamma.commit("main", &[], &[("project.clj", &project_clj("gamma", "0.1.0", &[]))], T0);

    let broken = root.path().join("beta");
    std::fs::create_dir(&broken).unwrap();
    std::fs::write(broken.join(".git"), "not a gitfile\n").unwrap();
    std::fs::create_dir(root.path().join("plain-dir")).unwrap();

    let pool = RepoPool::new(root.path()).with_jobs(2);
    let reports = pool.import_all(&NoopProgress).await.unwrap();

    let names: Vec<&str> = reports.iter().map(|r| r.repo.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    assert!(reports[0].result.is_ok());
    assert!(reports[1].result.is_err());
    assert!(reports[2].result.is_ok());

    let indexed = pool.indexed(&NoopProgress).await.unwrap();
    assert_eq!(indexed.len(), 2);
    assert!(indexed
        .iter()
        .all(|repo| repo.index.facts.project_names().len() == 1));
}

#[tokio::test]
async fn test_second_pass_is_unchanged() {
    let root = TempDir::new().unwrap();
    let repo = TestRepo::in_dir(root.path(), "only");
    repo.commit("main", &[], &[("project.clj", &project_clj("only", "1.0.0", &[]))], T0);

    let pool = RepoPool::new(root.path());
    let first = pool.import_all(&NoopProgress).await.unwrap();
    assert!(first[0].result.as_ref().unwrap().outcome.is_changed());

    let second = pool.import_all(&NoopProgress).await.unwrap();
    let import = second[0].result.as_ref().unwrap();
    assert_eq!(import.outcome, ImportOutcome::Unchanged);
    assert_eq!(import.index.shabam.len(), 1);
}

#[tokio::test]
async fn test_fetch_failure_is_reported_per_repository() {
    let root = TempDir::new().unwrap();
    let local = TestRepo::in_dir(root.path(), "local");
    local.commit("main", &[], &[("project.clj", &project_clj("local", "1.0.0", &[]))], T0);
    let remote = TestRepo::in_dir(root.path(), "remote");
    remote.commit("main", &[], &[("project.clj", &project_clj("remote", "1.0.0", &[]))], T0);
    let missing = root.path().join("no-such-upstream");
    remote
        .repo
        .remote("origin", missing.to_str().unwrap())
        .unwrap();

    let pool = RepoPool::new(root.path()).with_fetch(true);
    let reports = pool.import_all(&NoopProgress).await.unwrap();

    assert_eq!(reports[0].repo.name, "local");
    assert!(reports[0].result.is_ok());
    assert_eq!(reports[1].repo.name, "remote");
    let err = reports[1].result.as_ref().unwrap_err();
    assert!(format!("{err:#}").contains("Failed to fetch"));
}
