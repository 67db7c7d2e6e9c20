//! `githooks publish`: create a branch and push it, retrying transient
//! failures and probing the remote when every attempt failed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;

use githooks_common::{CancellationToken, GithooksConfig, INTERRUPTED_EXIT_CODE};
use githooks_publish::{
    AttemptOutcome, BranchPublisher, PublishError, PublishOutcome, PublishStatus, PublisherOptions,
    RetryPolicy,
};
use githooks_utils_git::SystemGit;

/// Create a branch if needed and push it.
#[derive(Debug, Parser)]
pub struct PublishCli {
    /// Branch to publish
    pub branch: String,

    /// Remote to push to (default: from config, else origin)
    #[arg(long, value_name = "NAME")]
    pub remote: Option<String>,

    /// Branch to create the new branch from (default: current HEAD)
    #[arg(long, value_name = "BRANCH")]
    pub base: Option<String>,

    /// Maximum push attempts
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: Option<u32>,

    /// Delay before the second attempt in milliseconds, doubled afterwards
    #[arg(long, value_name = "MS")]
    pub base_delay_ms: Option<u64>,

    /// Disable random jitter on retry delays
    #[arg(long)]
    pub no_jitter: bool,

    /// Run as if started in DIR
    #[arg(short = 'C', value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Print the outcome as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl PublishCli {
    fn options(&self, config: &GithooksConfig) -> PublisherOptions {
        let mut publish = config.publish.clone();
        if let Some(base) = &self.base {
            publish.root_branch = Some(base.clone());
        }
        if let Some(max_attempts) = self.max_attempts {
            publish.max_attempts = max_attempts;
        }
        if let Some(delay) = self.base_delay_ms {
            publish.base_delay_ms = delay;
        }

        let mut options = PublisherOptions::from_config(&publish);
        if self.no_jitter {
            options.retry = options.retry.without_jitter();
        }
        options
    }

    pub async fn run(
        self,
        config: &GithooksConfig,
        cwd: &Path,
        cancel: &CancellationToken,
    ) -> Result<i32> {
        let repo_dir = match &self.dir {
            Some(dir) => cwd.join(dir),
            None => cwd.to_path_buf(),
        };

        let git = SystemGit::new(&repo_dir);
        if !git.is_git_repo().await {
            bail!("{} is not inside a git repository", repo_dir.display());
        }

        let remote = self
            .remote
            .clone()
            .unwrap_or_else(|| config.publish.remote.clone());
        let options = self.options(config);
        let publisher = BranchPublisher::new(git, options);

        let outcome = match publisher.publish(&self.branch, &remote, cancel).await {
            Ok(outcome) => outcome,
            Err(PublishError::Cancelled) => {
                eprintln!("githooks: publish of {} interrupted", self.branch);
                return Ok(INTERRUPTED_EXIT_CODE);
            }
            Err(e) => return Err(e.into()),
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else {
            print_outcome(&outcome, &publisher.options().retry);
        }

        Ok(if outcome.is_success() { 0 } else { 1 })
    }
}

fn print_outcome(outcome: &PublishOutcome, policy: &RetryPolicy) {
    for attempt in &outcome.attempts {
        let delay = if attempt.delay_before_ms > 0 {
            format!(
                " after {:.1}s",
                Duration::from_millis(attempt.delay_before_ms).as_secs_f64()
            )
        } else {
            String::new()
        };
        let result = match attempt.outcome {
            AttemptOutcome::Success => "ok",
            AttemptOutcome::TransientFailure => "transient failure",
            AttemptOutcome::FatalFailure => "fatal failure",
        };
        eprintln!(
            "attempt {}/{}{}: {}",
            attempt.attempt_number, policy.max_attempts, delay, result
        );
        if let Some(error) = &attempt.error {
            for line in error.trim_end().lines() {
                eprintln!("    | {}", line);
            }
        }
    }

    match outcome.final_status {
        PublishStatus::Success => {
            println!("Published {} to {}", outcome.branch_name, outcome.remote)
        }
        PublishStatus::VerifiedDespiteError => println!(
            "Published {} to {} (push reported errors, branch confirmed on remote)",
            outcome.branch_name, outcome.remote
        ),
        PublishStatus::Failed => eprintln!(
            "Failed to publish {} to {}: {}",
            outcome.branch_name,
            outcome.remote,
            outcome.last_error.as_deref().unwrap_or("unknown error")
        ),
    }
}
