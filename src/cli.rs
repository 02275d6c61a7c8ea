use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Settings;
use crate::query::Constraints;

#[derive(Parser, Debug)]
#[command(name = "gitver", version, about = "Versions and dependencies derived from git history")]
pub struct Cli {
    /// Config file (default: <config dir>/gitver/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the repository pool
    #[arg(long, global = true, env = "GITVER_REPOS")]
    pub repos: Option<PathBuf>,

    /// Repositories imported in parallel
    #[arg(short, long, global = true, env = "GITVER_JOBS")]
    pub jobs: Option<usize>,

    /// More output (-v: progress and info, -vv: debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the derived version of the project in the current directory
    Version {
        /// Stamp even with uncommitted changes
        #[arg(long)]
        allow_dirty: bool,
    },
    /// Show the commit time and hash encoded in a version string
    ParseVersion { version: String },
    /// Bring every repository index in the pool up to date
    Import {
        /// Fetch all remotes first
        #[arg(long)]
        fetch: bool,
    },
    /// Find the newest version of a project
    Newest {
        /// Project name: group/artifact, artifact, or a unique fragment
        project: String,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        /// Directory of the descriptor inside the repository
        #[arg(long)]
        path: Option<String>,
        /// Maven range such as "[1.0,2.0)" or a version prefix
        #[arg(long)]
        version: Option<String>,
        /// Accept descriptors with snapshot dependencies
        #[arg(long)]
        allow_snapshots: bool,
    },
    /// Run a command with the descriptor stamped with the derived version
    Wrap {
        #[arg(long)]
        allow_dirty: bool,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Update git-versioned dependencies to their newest versions
    Freshen {
        #[arg(long)]
        allow_snapshots: bool,
    },
    /// Resolve dependencies, building missing git-versioned ones
    BuildDeps,
}

impl Cli {
    /// Apply command-line and environment overrides on top of `settings`
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(repos) = &self.repos {
            settings.repos_dir = repos.clone();
        }
        if let Some(jobs) = self.jobs {
            settings.jobs = jobs.max(1);
        }
        if let Command::Import { fetch: true } = self.command {
            settings.fetch = true;
        }
    }
}

impl Command {
    /// Query constraints of a `newest` invocation
    pub fn constraints(&self) -> Option<Constraints> {
        match self {
            Command::Newest {
                repo,
                branch,
                path,
                version,
                allow_snapshots,
                ..
            } => Some(Constraints {
                repo: repo.clone(),
                branch: branch.clone(),
                path: path.clone(),
                version: version.clone(),
                allow_snapshots: *allow_snapshots,
            }),
            _ => None,
        }
    }
}
