//! Git subprocess invocation
//!
//! History export, ref listing and fetches go through the `git` binary so the
//! exact on-disk state of the repository is what gets indexed.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::GitError;

/// Captured result of one git invocation
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl GitOutput {
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Non-empty stdout lines
    pub fn lines(&self) -> Vec<String> {
        self.stdout_str()
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()
    }
}

/// A branch ref as listed by `for-each-ref`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchTip {
    pub name: String,
    pub refname: String,
    pub sha: String,
}

/// Runs git commands in one directory
#[derive(Debug, Clone)]
pub struct Git {
    dir: PathBuf,
}

impl Git {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run git, treating any non-zero exit as an error
    pub fn run<I, S>(&self, args: I) -> Result<GitOutput, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run_allowing(args, &[0])
    }

    /// Run git, accepting the listed exit codes as success
    pub fn run_allowing<I, S>(&self, args: I, allowed: &[i32]) -> Result<GitOutput, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .collect();
        tracing::debug!(dir = %self.dir.display(), "git {}", args.join(" "));

        let output = Command::new("git")
            .args(&args)
            .current_dir(&self.dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output();

        let output = match output {
            Ok(o) => o,
            Err(e) => {
                return Err(GitError {
                    dir: self.dir.clone(),
                    args,
                    code: None,
                    stdout: String::new(),
                    stderr: format!("failed to spawn git: {e}"),
                });
            }
        };

        let result = GitOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        };
        match result.code {
            Some(code) if allowed.contains(&code) => Ok(result),
            code => Err(GitError {
                dir: self.dir.clone(),
                args,
                code,
                stdout: String::from_utf8_lossy(&result.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
            }),
        }
    }

    /// Current branch tips, local and remote.
    ///
    /// `refs/heads/x` is named `x`, `refs/remotes/origin/x` is named
    /// `origin/x`; symbolic `HEAD` refs are skipped.
    pub fn branch_tips(&self) -> Result<Vec<BranchTip>, GitError> {
        let out = self.run([
            "for-each-ref",
            "--format=%(objectname) %(objecttype) %(refname)",
            "refs/heads/",
            "refs/remotes/",
        ])?;
        let mut tips = Vec::new();
        for line in out.lines() {
            let mut parts = line.splitn(3, ' ');
            let (Some(sha), Some(kind), Some(refname)) = (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            if kind != "commit" || refname.ends_with("/HEAD") {
                continue;
            }
            let name = refname
                .strip_prefix("refs/heads/")
                .or_else(|| refname.strip_prefix("refs/remotes/"))
                .unwrap_or(refname);
            tips.push(BranchTip {
                name: name.to_string(),
                refname: refname.to_string(),
                sha: sha.to_string(),
            });
        }
        Ok(tips)
    }

    pub fn fetch_all(&self) -> Result<(), GitError> {
        self.run(["fetch", "--all", "--quiet", "--prune"]).map(|_| ())
    }

    /// Read a blob's raw content
    pub fn cat_blob(&self, sha: &str) -> Result<Vec<u8>, GitError> {
        self.run(["cat-file", "blob", sha]).map(|o| o.stdout)
    }

    /// Absolute path of the enclosing work tree
    pub fn toplevel(&self) -> Result<PathBuf, GitError> {
        let out = self.run(["rev-parse", "--show-toplevel"])?;
        Ok(PathBuf::from(out.stdout_str().trim()))
    }

    /// Path of the git control directory
    pub fn git_dir(&self) -> Result<PathBuf, GitError> {
        let out = self.run(["rev-parse", "--absolute-git-dir"])?;
        Ok(PathBuf::from(out.stdout_str().trim()))
    }

    /// Latest commit touching `path`, as (sha, committer time)
    pub fn last_commit_touching(&self, path: &Path) -> Result<Option<(String, i64)>, GitError> {
        let out = self.run([
            OsStr::new("log"),
            OsStr::new("-1"),
            OsStr::new("--format=%H %ct"),
            OsStr::new("--"),
            path.as_os_str(),
        ])?;
        Ok(out.lines().first().and_then(|line| {
            let (sha, ctime) = line.split_once(' ')?;
            Some((sha.to_string(), ctime.trim().parse().ok()?))
        }))
    }
}
