//! Git utilities for githooks.
//!
//! [`GitCommands`] is the small set of git operations branch publishing
//! needs. [`SystemGit`] implements it by shelling out to `git` with a
//! per-command timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Default timeout for git operations in seconds
const DEFAULT_GIT_TIMEOUT_SECS: u64 = 30;

/// Environment variable overriding the git timeout.
pub const GIT_TIMEOUT_ENV: &str = "GITHOOKS_GIT_TIMEOUT_SECS";

#[derive(Error, Debug)]
pub enum GitError {
    #[error("Failed to run git: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },
    #[error("git {command} timed out after {}s", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },
    #[error("git {command} exited with code {}: {}", output.exit_code, output.stderr.trim())]
    Command { command: String, output: GitOutput },
}

pub type Result<T> = std::result::Result<T, GitError>;

/// Captured result of one git invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, for message matching.
    pub fn combined(&self) -> String {
        let mut combined = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&self.stderr);
        }
        combined
    }
}

/// Git operations used by branch publishing.
///
/// Commands that git itself can reject return their [`GitOutput`] so the
/// caller can classify the failure; `Err` means git could not be run at all.
#[async_trait]
pub trait GitCommands: Send + Sync {
    /// Whether `refs/heads/<branch>` exists locally.
    async fn local_branch_exists(&self, branch: &str) -> Result<bool>;

    /// Create and check out `branch`, starting at `base` or the current HEAD.
    async fn create_branch(&self, branch: &str, base: Option<&str>) -> Result<GitOutput>;

    async fn checkout(&self, branch: &str) -> Result<GitOutput>;

    /// `git push -u <remote> <branch>`.
    async fn push_branch(&self, remote: &str, branch: &str) -> Result<GitOutput>;

    /// Read-only query of the remote for `branch`.
    async fn remote_branch_exists(&self, remote: &str, branch: &str) -> Result<bool>;
}

/// Parse a timeout override, falling back to the default.
fn parse_git_timeout(value: Option<&str>) -> Duration {
    value
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(DEFAULT_GIT_TIMEOUT_SECS))
}

/// Get the configured git timeout duration
pub fn git_timeout_from_env() -> Duration {
    parse_git_timeout(std::env::var(GIT_TIMEOUT_ENV).ok().as_deref())
}

/// Whether `ls-remote --heads` output lists `branch`.
pub fn ls_remote_lists_branch(stdout: &str, branch: &str) -> bool {
    let wanted = format!("refs/heads/{branch}");
    stdout
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|reference| reference == wanted)
}

/// [`GitCommands`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct SystemGit {
    repo_dir: PathBuf,
    timeout: Duration,
}

impl SystemGit {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            timeout: git_timeout_from_env(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run git with `args` and capture its output.
    pub async fn run(&self, args: &[&str]) -> Result<GitOutput> {
        let command_line = args.join(" ");
        debug!(dir = %self.repo_dir.display(), "git {}", command_line);

        let mut command = Command::new("git");
        command
            .args(args)
            .current_dir(&self.repo_dir)
            // Never block on a credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| GitError::Spawn { source })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| GitError::Spawn { source })?,
            Err(_) => {
                return Err(GitError::Timeout {
                    command: command_line,
                    timeout: self.timeout,
                });
            }
        };

        Ok(GitOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Run git and turn a non-zero exit into an error.
    async fn run_checked(&self, args: &[&str]) -> Result<GitOutput> {
        let output = self.run(args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(GitError::Command {
                command: args.join(" "),
                output,
            })
        }
    }

    /// Check if the directory is inside a git work tree.
    pub async fn is_git_repo(&self) -> bool {
        matches!(self.run(&["rev-parse", "--git-dir"]).await, Ok(o) if o.success())
    }

    /// Get the current git branch.
    pub async fn current_branch(&self) -> Option<String> {
        let output = self.run(&["rev-parse", "--abbrev-ref", "HEAD"]).await.ok()?;
        output
            .success()
            .then(|| output.stdout.trim().to_string())
    }
}

#[async_trait]
impl GitCommands for SystemGit {
    async fn local_branch_exists(&self, branch: &str) -> Result<bool> {
        let reference = format!("refs/heads/{branch}");
        let output = self
            .run(&["rev-parse", "--verify", "--quiet", &reference])
            .await?;
        Ok(output.success())
    }

    async fn create_branch(&self, branch: &str, base: Option<&str>) -> Result<GitOutput> {
        match base {
            Some(base) => self.run(&["checkout", "-b", branch, base]).await,
            None => self.run(&["checkout", "-b", branch]).await,
        }
    }

    async fn checkout(&self, branch: &str) -> Result<GitOutput> {
        self.run(&["checkout", branch]).await
    }

    async fn push_branch(&self, remote: &str, branch: &str) -> Result<GitOutput> {
        self.run(&["push", "-u", remote, branch]).await
    }

    async fn remote_branch_exists(&self, remote: &str, branch: &str) -> Result<bool> {
        let output = self
            .run_checked(&["ls-remote", "--heads", remote, branch])
            .await?;
        Ok(ls_remote_lists_branch(&output.stdout, branch))
    }
}
