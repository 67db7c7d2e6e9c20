//! Branch publishing.
//!
//! Creates a branch locally when it is missing and pushes it, retrying
//! transient failures. When every attempt fails transiently the remote is
//! probed: a push that timed out on our side may still have landed.

use githooks_common::{CancellationToken, PublishConfig};
use githooks_utils_git::{GitCommands, GitError, GitOutput};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::{ErrorClass, ErrorSignal, classify, classify_io};
use crate::retry::{ProbeResult, RetryAttempt, RetryFailure, RetryPolicy, retry_with_verification};
use crate::{PublishError, Result};

/// Push output meaning the remote already has what we tried to send.
const ALREADY_PUBLISHED_MARKERS: &[&str] = &["already exists", "up-to-date", "up to date"];

/// Final state of a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Success,
    /// Every push reported a transient error but the branch is on the remote.
    VerifiedDespiteError,
    Failed,
}

impl PublishStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, PublishStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Success => "success",
            PublishStatus::VerifiedDespiteError => "verified despite error",
            PublishStatus::Failed => "failed",
        }
    }
}

/// What happened when publishing one branch.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub branch_name: String,
    pub remote: String,
    pub final_status: PublishStatus,
    pub succeeded_on_attempt: Option<u32>,
    pub attempts: Vec<RetryAttempt>,
    pub probe: ProbeResult,
    /// Message of the last failed attempt.
    pub last_error: Option<String>,
    /// Classification of the last failed attempt.
    pub last_error_class: Option<ErrorClass>,
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        self.final_status.is_success()
    }

    pub fn verified_by_probe(&self) -> bool {
        self.final_status == PublishStatus::VerifiedDespiteError
    }
}

/// Publisher settings.
#[derive(Debug, Clone)]
pub struct PublisherOptions {
    /// Branch new branches start from; `None` means the current HEAD.
    pub root_branch: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self::from_config(&PublishConfig::default())
    }
}

impl PublisherOptions {
    pub fn from_config(config: &PublishConfig) -> Self {
        Self {
            root_branch: config.root_branch.clone(),
            retry: RetryPolicy::from_config(config),
        }
    }
}

/// Creates and pushes branches through a [`GitCommands`] implementation.
pub struct BranchPublisher<G: GitCommands> {
    git: G,
    options: PublisherOptions,
}

impl<G: GitCommands> BranchPublisher<G> {
    pub fn new(git: G, options: PublisherOptions) -> Self {
        Self { git, options }
    }

    pub fn git(&self) -> &G {
        &self.git
    }

    pub fn options(&self) -> &PublisherOptions {
        &self.options
    }

    /// Create `branch` if needed and push it to `remote`.
    ///
    /// A failed publish is reported through [`PublishOutcome::final_status`];
    /// `Err` means the branch name was rejected up front or the run was
    /// cancelled.
    pub async fn publish(
        &self,
        branch: &str,
        remote: &str,
        cancel: &CancellationToken,
    ) -> Result<PublishOutcome> {
        validate_branch_name(branch)?;
        info!(branch, remote, "Publishing branch");

        let verified = retry_with_verification(
            &self.options.retry,
            cancel,
            PublishError::class,
            |attempt| {
                debug!(attempt, branch, "Publish attempt");
                self.attempt(branch, remote)
            },
            || self.probe(branch, remote),
        )
        .await;

        let probe = verified.probe;
        let report = verified.report;
        let succeeded_on_attempt = report.succeeded_on_attempt();

        let (final_status, last_error) = match report.result {
            Ok(()) => (PublishStatus::Success, None),
            Err(RetryFailure::Cancelled) => return Err(PublishError::Cancelled),
            Err(RetryFailure::Exhausted(e)) if probe == ProbeResult::Found => {
                (PublishStatus::VerifiedDespiteError, Some(e))
            }
            Err(RetryFailure::Exhausted(e)) | Err(RetryFailure::Fatal(e)) => {
                (PublishStatus::Failed, Some(e))
            }
        };

        match final_status {
            PublishStatus::Success => info!(branch, remote, "Branch published"),
            PublishStatus::VerifiedDespiteError => info!(
                branch,
                remote, "Push reported errors but the branch is on the remote"
            ),
            PublishStatus::Failed => warn!(
                branch,
                remote,
                error = %last_error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                "Failed to publish branch"
            ),
        }

        Ok(PublishOutcome {
            branch_name: branch.to_string(),
            remote: remote.to_string(),
            final_status,
            succeeded_on_attempt,
            attempts: report.attempts,
            probe,
            last_error_class: last_error.as_ref().map(PublishError::class),
            last_error: last_error.map(|e| e.to_string()),
        })
    }

    /// One full attempt: make sure the branch exists locally, then push.
    async fn attempt(&self, branch: &str, remote: &str) -> Result<()> {
        self.ensure_local_branch(branch).await?;

        let output = self
            .git
            .push_branch(remote, branch)
            .await
            .map_err(|e| from_git_error("push", e))?;

        if output.success() {
            return Ok(());
        }
        if already_published(&output) {
            info!(branch, remote, "Remote already has the branch");
            return Ok(());
        }
        Err(from_output("push", &output))
    }

    /// Check out `branch`, creating it from the root branch when absent.
    async fn ensure_local_branch(&self, branch: &str) -> Result<()> {
        let exists = self
            .git
            .local_branch_exists(branch)
            .await
            .map_err(|e| from_git_error("rev-parse", e))?;

        let (step, output) = if exists {
            debug!(branch, "Branch exists locally, checking out");
            ("checkout", self.git.checkout(branch).await)
        } else {
            debug!(
                branch,
                base = self.options.root_branch.as_deref().unwrap_or("HEAD"),
                "Creating branch"
            );
            (
                "checkout -b",
                self.git
                    .create_branch(branch, self.options.root_branch.as_deref())
                    .await,
            )
        };

        let output = output.map_err(|e| from_git_error(step, e))?;
        if output.success() {
            Ok(())
        } else {
            Err(from_output(step, &output))
        }
    }

    async fn probe(&self, branch: &str, remote: &str) -> bool {
        match self.git.remote_branch_exists(remote, branch).await {
            Ok(found) => {
                debug!(branch, remote, found, "Remote probe");
                found
            }
            Err(e) => {
                warn!(branch, remote, error = %e, "Remote probe failed");
                false
            }
        }
    }
}

/// Reject names git would misread as options or refuse outright.
pub fn validate_branch_name(branch: &str) -> Result<()> {
    let invalid = branch.is_empty()
        || branch.starts_with('-')
        || branch.starts_with('/')
        || branch.ends_with('/')
        || branch.ends_with(".lock")
        || branch.contains("..")
        || branch.contains("@{")
        || branch
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(c));

    if invalid {
        Err(PublishError::InvalidBranch(branch.to_string()))
    } else {
        Ok(())
    }
}

fn already_published(output: &GitOutput) -> bool {
    let combined = output.combined().to_lowercase();
    ALREADY_PUBLISHED_MARKERS.iter().any(|m| combined.contains(m))
}

fn from_output(step: &str, output: &GitOutput) -> PublishError {
    let combined = output.combined();
    let class = classify(&ErrorSignal::Output {
        exit_code: output.exit_code,
        output: &combined,
    });
    let message = format!(
        "git {} exited with code {}: {}",
        step,
        output.exit_code,
        combined.trim()
    );
    PublishError::classified(class, message)
}

fn from_git_error(step: &str, error: GitError) -> PublishError {
    let class = match &error {
        GitError::Spawn { source } => classify_io(source),
        GitError::Timeout { .. } => ErrorClass::Transient,
        GitError::Command { output, .. } => {
            return from_output(step, output);
        }
    };
    PublishError::classified(class, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_branch_name() {
        assert!(validate_branch_name("feature/login").is_ok());
        assert!(validate_branch_name("release-1.2").is_ok());

        for bad in ["", "-f", "a b", "a..b", "a~1", "topic.lock", "a:b", "/x", "x/", "a@{0}"] {
            assert!(
                matches!(validate_branch_name(bad), Err(PublishError::InvalidBranch(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_already_published() {
        let output = GitOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: "Everything up-to-date\n".to_string(),
        };
        assert!(already_published(&output));

        let output = GitOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: "! [rejected] main -> main (fetch first)".to_string(),
        };
        assert!(!already_published(&output));
    }

    #[test]
    fn test_git_errors_are_classified() {
        let timeout = GitError::Timeout {
            command: "push -u origin x".to_string(),
            timeout: std::time::Duration::from_secs(30),
        };
        assert_eq!(from_git_error("push", timeout).class(), ErrorClass::Transient);

        let missing = GitError::Spawn {
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "git"),
        };
        assert_eq!(from_git_error("push", missing).class(), ErrorClass::Fatal);

        let refused = GitOutput {
            exit_code: 128,
            stdout: String::new(),
            stderr: "ssh: connect to host example.com port 22: Connection refused".to_string(),
        };
        let err = from_output("push", &refused);
        assert!(matches!(err, PublishError::Transient(_)));
        assert!(err.to_string().contains("Connection refused"));
    }
}
