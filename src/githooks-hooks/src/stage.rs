//! Git lifecycle stages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::HookError;

/// A point in Git's lifecycle at which hooks may run.
///
/// The directory holding a stage's hooks is named after [`Stage::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    ApplypatchMsg,
    PreApplypatch,
    PostApplypatch,
    PreCommit,
    PreMergeCommit,
    PrepareCommitMsg,
    CommitMsg,
    PostCommit,
    PreRebase,
    PostCheckout,
    PostMerge,
    PrePush,
    PreReceive,
    Update,
    ProcReceive,
    PostReceive,
    PostUpdate,
    ReferenceTransaction,
    PushToCheckout,
    PreAutoGc,
    PostRewrite,
    SendemailValidate,
}

impl Stage {
    /// Every stage, in Git's documentation order.
    pub const ALL: &'static [Stage] = &[
        Stage::ApplypatchMsg,
        Stage::PreApplypatch,
        Stage::PostApplypatch,
        Stage::PreCommit,
        Stage::PreMergeCommit,
        Stage::PrepareCommitMsg,
        Stage::CommitMsg,
        Stage::PostCommit,
        Stage::PreRebase,
        Stage::PostCheckout,
        Stage::PostMerge,
        Stage::PrePush,
        Stage::PreReceive,
        Stage::Update,
        Stage::ProcReceive,
        Stage::PostReceive,
        Stage::PostUpdate,
        Stage::ReferenceTransaction,
        Stage::PushToCheckout,
        Stage::PreAutoGc,
        Stage::PostRewrite,
        Stage::SendemailValidate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ApplypatchMsg => "applypatch-msg",
            Stage::PreApplypatch => "pre-applypatch",
            Stage::PostApplypatch => "post-applypatch",
            Stage::PreCommit => "pre-commit",
            Stage::PreMergeCommit => "pre-merge-commit",
            Stage::PrepareCommitMsg => "prepare-commit-msg",
            Stage::CommitMsg => "commit-msg",
            Stage::PostCommit => "post-commit",
            Stage::PreRebase => "pre-rebase",
            Stage::PostCheckout => "post-checkout",
            Stage::PostMerge => "post-merge",
            Stage::PrePush => "pre-push",
            Stage::PreReceive => "pre-receive",
            Stage::Update => "update",
            Stage::ProcReceive => "proc-receive",
            Stage::PostReceive => "post-receive",
            Stage::PostUpdate => "post-update",
            Stage::ReferenceTransaction => "reference-transaction",
            Stage::PushToCheckout => "push-to-checkout",
            Stage::PreAutoGc => "pre-auto-gc",
            Stage::PostRewrite => "post-rewrite",
            Stage::SendemailValidate => "sendemail-validate",
        }
    }

    /// Stages for which Git writes data to the hook's standard input.
    ///
    /// The dispatcher reads that data once and replays it to every hook in
    /// the chain.
    pub fn receives_stdin(&self) -> bool {
        matches!(
            self,
            Stage::PrePush
                | Stage::PreReceive
                | Stage::PostReceive
                | Stage::ReferenceTransaction
                | Stage::PostRewrite
        )
    }

    /// Whether a non-zero exit from this stage can stop the Git operation.
    ///
    /// Informational stages (post-*) cannot reject anything; Git ignores
    /// their exit code.
    pub fn can_reject(&self) -> bool {
        !matches!(
            self,
            Stage::PostApplypatch
                | Stage::PostCommit
                | Stage::PostCheckout
                | Stage::PostMerge
                | Stage::PostReceive
                | Stage::PostUpdate
                | Stage::PostRewrite
                | Stage::ReferenceTransaction
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == wanted)
            .ok_or_else(|| HookError::UnknownStage(wanted.to_string()))
    }
}
