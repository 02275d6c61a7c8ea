//! Command implementations behind the CLI
//!
//! Each command writes its user-facing output to the given sink and returns
//! whether it succeeded; hard failures are errors.

use std::fs;
use std::io::Write;

use anyhow::{bail, Context as _, Result};

use crate::build::{self, CheckoutBuilder, CommandResolver, StampedDescriptor};
use crate::config::Context;
use crate::model::descriptor::parse_descriptor;
use crate::model::parse_version;
use crate::query::{write_candidates, Constraints, Newest, QueryEngine};
use crate::repository::importer::{ImportOutcome, ProgressReporter};
use crate::repository::pool::{IndexedRepo, RepoPool};
use crate::util::{format_elapsed, format_timestamp, plural};

fn pool(ctx: &Context) -> RepoPool {
    RepoPool::new(&ctx.settings.repos_dir)
        .with_jobs(ctx.settings.jobs)
        .with_descriptor(&ctx.settings.descriptor)
        .with_fetch(ctx.settings.fetch)
}

async fn indexed(ctx: &Context, progress: &dyn ProgressReporter) -> Result<Vec<IndexedRepo>> {
    let repos = pool(ctx).indexed(progress).await?;
    if repos.is_empty() {
        tracing::warn!("no usable repositories under {}", ctx.settings.repos_dir.display());
    }
    Ok(repos)
}

/// Print the derived version of the project in the working directory
pub fn version(ctx: &Context, allow_dirty: bool, out: &mut dyn Write) -> Result<bool> {
    let stamp = build::stamp_version(
        &ctx.cwd,
        &ctx.settings.descriptor,
        allow_dirty,
        ctx.settings.sha_length,
    )?;
    writeln!(out, "{}", stamp.derived)?;
    Ok(true)
}

pub fn parse_version_cmd(input: &str, out: &mut dyn Write) -> Result<bool> {
    match parse_version(input) {
        Some(parsed) => {
            writeln!(out, "ctime: {} ({})", format_timestamp(parsed.ctime), parsed.ctime)?;
            writeln!(out, "sha:   {}", parsed.sha_prefix)?;
            Ok(true)
        }
        None => {
            writeln!(out, "{input} is not a git-derived version")?;
            Ok(false)
        }
    }
}

/// Refresh every index in the pool and report per repository
pub async fn import(ctx: &Context, progress: &dyn ProgressReporter, out: &mut dyn Write) -> Result<bool> {
    let reports = pool(ctx).import_all(progress).await?;
    let mut ok = true;
    for report in &reports {
        match &report.result {
            Ok(import) => match import.outcome {
                ImportOutcome::Unchanged => {
                    writeln!(out, "{}: unchanged ({})", report.repo.name, format_elapsed(import.elapsed))?;
                }
                ImportOutcome::Updated(summary) => writeln!(
                    out,
                    "{}: {}, {} ({})",
                    report.repo.name,
                    plural(summary.commits, "new commit"),
                    plural(summary.descriptors, "descriptor change"),
                    format_elapsed(import.elapsed)
                )?,
            },
            Err(e) => {
                ok = false;
                writeln!(out, "{}: FAILED: {e:#}", report.repo.name)?;
            }
        }
    }
    Ok(ok)
}

/// Print the newest version of `project`, or the candidate table
pub async fn newest(
    ctx: &Context,
    project: &str,
    constraints: &Constraints,
    progress: &dyn ProgressReporter,
    out: &mut dyn Write,
) -> Result<bool> {
    let repos = indexed(ctx, progress).await?;
    let engine = QueryEngine::new(&repos).with_sha_length(ctx.settings.sha_length);
    match engine.newest(project, constraints)? {
        Newest::Found(candidate) => {
            writeln!(out, "{}", candidate.derived)?;
            Ok(true)
        }
        Newest::Ambiguous(candidates) => {
            writeln!(out, "{project}: {} candidates, narrow with --repo, --branch or --path", candidates.len())?;
            write_candidates(out, &candidates)?;
            Ok(false)
        }
        Newest::NotFound => {
            writeln!(out, "{project}: no matching version found")?;
            Ok(false)
        }
    }
}

/// Stamp the descriptor with the derived version while `command` runs
pub fn wrap(ctx: &Context, allow_dirty: bool, command: &[String]) -> Result<bool> {
    let stamp = build::stamp_version(
        &ctx.cwd,
        &ctx.settings.descriptor,
        allow_dirty,
        ctx.settings.sha_length,
    )?;
    let _stamped = StampedDescriptor::apply(&stamp.descriptor, &stamp.derived)?;
    build::artifact::run_command(&ctx.cwd, command)?;
    Ok(true)
}

/// Move git-versioned dependencies of the current descriptor to their newest versions
pub async fn freshen(
    ctx: &Context,
    allow_snapshots: bool,
    progress: &dyn ProgressReporter,
    out: &mut dyn Write,
) -> Result<bool> {
    let path = ctx.descriptor_path();
    let text = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let project = parse_descriptor(&text).with_context(|| format!("Cannot parse {}", path.display()))?;

    let repos = indexed(ctx, progress).await?;
    let engine = QueryEngine::new(&repos).with_sha_length(ctx.settings.sha_length);
    let plan = build::plan_freshen(&project, &engine, allow_snapshots)?;

    if !plan.ambiguous.is_empty() {
        for (name, candidates) in &plan.ambiguous {
            writeln!(out, "{name}: ambiguous")?;
            write_candidates(out, candidates)?;
        }
        bail!("{} ambiguous, descriptor left unchanged", plural(plan.ambiguous.len(), "dependency"));
    }
    for name in &plan.not_found {
        writeln!(out, "{name}: not found in the pool")?;
    }
    if plan.updates.is_empty() {
        writeln!(out, "all git-versioned dependencies are current")?;
        return Ok(true);
    }

    let rewritten = plan.rewrite().apply(&text)?;
    fs::write(&path, rewritten).with_context(|| format!("Failed to write {}", path.display()))?;
    for update in &plan.updates {
        writeln!(out, "{}: {} -> {}", update.name, update.from, update.to.derived)?;
    }
    Ok(true)
}

/// Resolve dependencies, building missing git-versioned ones from the pool
pub async fn build_deps(ctx: &Context, progress: &dyn ProgressReporter, out: &mut dyn Write) -> Result<bool> {
    let resolver = CommandResolver::from_args(&ctx.settings.resolve_cmd)
        .context("resolve_cmd is empty")?;
    anyhow::ensure!(!ctx.settings.install_cmd.is_empty(), "install_cmd is empty");
    let builder = CheckoutBuilder {
        build_dir: ctx.settings.build_dir.clone(),
        descriptor: ctx.settings.descriptor.clone(),
        install_cmd: ctx.settings.install_cmd.clone(),
        sha_length: ctx.settings.sha_length,
    };

    let repos = indexed(ctx, progress).await?;
    let built = build::build_deps(&ctx.cwd, &resolver, &builder, &repos)?;
    for coordinate in &built {
        writeln!(out, "built {coordinate}")?;
    }
    writeln!(out, "dependencies resolved")?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_cmd() {
        let mut out = Vec::new();
        assert!(parse_version_cmd("widget-1.0.0-20240131_174502-g1a2b3c4.jar", &mut out).unwrap());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("2024-01-31 17:45 (1706723102)"));
        assert!(text.contains("sha:   1a2b3c4"));

        let mut out = Vec::new();
        assert!(!parse_version_cmd("1.0.0", &mut out).unwrap());
        assert_eq!(String::from_utf8(out).unwrap(), "1.0.0 is not a git-derived version\n");
    }
}
