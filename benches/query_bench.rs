// Newest-version query and import benchmarks

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use criterion::async_executor::AsyncExecutor;
use tokio::runtime::Runtime;

use gitver::query::{Constraints, QueryEngine};
use gitver::repository::importer::NoopProgress;
use gitver::repository::RepoPool;

mod common;

struct TokioExecutor(Runtime);

impl AsyncExecutor for TokioExecutor {
    fn block_on<T>(&self, future: impl std::future::Future<Output = T>) -> T {
        self.0.block_on(future)
    }
}

fn bench_newest(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_newest");
    for size in [1_000u32, 10_000, 50_000] {
        let repos = vec![common::indexed("bench", common::generate_index(size, 25))];

        group.bench_with_input(BenchmarkId::new("commits", size), &repos, |b, repos| {
            let engine = QueryEngine::new(repos);
            b.iter(|| black_box(engine.newest("proj", &Constraints::default()).unwrap()));
        });
    }
    group.finish();
}

fn bench_newest_with_prefix(c: &mut Criterion) {
    let repos = vec![common::indexed("bench", common::generate_index(10_000, 25))];
    let constraints = Constraints {
        version: Some("1.2".into()),
        ..Constraints::default()
    };
    c.bench_function("query_newest_prefix", |b| {
        let engine = QueryEngine::new(&repos);
        b.iter(|| black_box(engine.newest("proj", &constraints).unwrap()));
    });
}

fn bench_pool_import(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_import");
    group.sample_size(10);
    for num_commits in [50, 200] {
        group.bench_with_input(
            BenchmarkId::new("commits", num_commits),
            &num_commits,
            |b, &num_commits| {
                b.to_async(TokioExecutor(Runtime::new().unwrap())).iter(|| async move {
                    let root = tempfile::TempDir::new().unwrap();
                    common::create_test_repo(&root.path().join("repo"), num_commits);
                    let pool = RepoPool::new(root.path());
                    black_box(pool.import_all(&NoopProgress).await.unwrap())
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_newest, bench_newest_with_prefix, bench_pool_import);
criterion_main!(benches);
