use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gitver::cli::{Cli, Command};
use gitver::commands;
use gitver::config::{Context, Settings};
use gitver::repository::importer::VerboseProgress;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("GITVER_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<bool> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply(&mut settings);
    settings.validate()?;
    let cwd = std::env::current_dir().context("Could not determine current directory")?;
    let ctx = Context::new(settings, cwd);

    let progress = VerboseProgress::new(cli.verbose > 0 && io::stderr().is_terminal());
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let ok = match &cli.command {
        Command::Version { allow_dirty } => commands::version(&ctx, *allow_dirty, &mut out)?,
        Command::ParseVersion { version } => commands::parse_version_cmd(version, &mut out)?,
        Command::Import { .. } => commands::import(&ctx, &progress, &mut out).await?,
        Command::Newest { project, .. } => {
            let constraints = cli.command.constraints().unwrap_or_default();
            commands::newest(&ctx, project, &constraints, &progress, &mut out).await?
        }
        Command::Wrap { allow_dirty, command } => commands::wrap(&ctx, *allow_dirty, command)?,
        Command::Freshen { allow_snapshots } => {
            commands::freshen(&ctx, *allow_snapshots, &progress, &mut out).await?
        }
        Command::BuildDeps => commands::build_deps(&ctx, &progress, &mut out).await?,
    };
    out.flush()?;
    Ok(ok)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
