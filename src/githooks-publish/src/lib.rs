//! Resilient branch publishing for githooks.
//!
//! - [`classify`]: transient vs fatal error classification
//! - [`retry`]: exponential backoff with an existence probe
//! - [`publisher`]: create-and-push of a branch on top of both

pub mod classify;
pub mod publisher;
pub mod retry;

pub use classify::{ErrorClass, ErrorSignal};
pub use publisher::{BranchPublisher, PublishOutcome, PublishStatus, PublisherOptions};
pub use retry::{
    AttemptOutcome, ProbeResult, RetryAttempt, RetryFailure, RetryPolicy, RetryReport,
    VerifiedReport, retry, retry_with_verification,
};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("Transient publish error: {0}")]
    Transient(String),
    #[error("Fatal publish error: {0}")]
    Fatal(String),
    #[error("Invalid branch name: '{0}'")]
    InvalidBranch(String),
    #[error("Publish cancelled")]
    Cancelled,
}

impl PublishError {
    pub fn classified(class: ErrorClass, message: impl Into<String>) -> Self {
        match class {
            ErrorClass::Transient => PublishError::Transient(message.into()),
            ErrorClass::Fatal => PublishError::Fatal(message.into()),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            PublishError::Transient(_) => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }
}

pub type Result<T> = std::result::Result<T, PublishError>;
