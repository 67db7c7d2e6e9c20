//! Git hook dispatch for githooks.
//!
//! Hooks live in one directory per lifecycle stage and run in file name
//! order:
//!
//! - [`HookLoader`] finds the hooks of a stage and sniffs their interpreters
//! - [`Executor`] runs one hook as a child process
//! - [`Dispatcher`] runs a whole stage under an [`ExecutionPolicy`]
//!
//! # Example
//!
//! ```rust,ignore
//! use githooks_hooks::{Dispatcher, Executor, HookInvocation, HookLoader, Stage};
//! use githooks_common::{CancellationToken, ExecutionPolicy};
//!
//! let dispatcher = Dispatcher::new(HookLoader::new(".githooks"), Executor::new());
//! let report = dispatcher
//!     .dispatch(
//!         Stage::PreCommit,
//!         ExecutionPolicy::Strict,
//!         &HookInvocation::new(),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! std::process::exit(report.exit_code);
//! ```

pub mod dispatcher;
pub mod executor;
pub mod loader;
pub mod spec;
pub mod stage;

pub use dispatcher::{DispatchPhase, DispatchReport, Dispatcher, HookWarning};
pub use executor::{Executor, ExecutorOptions, HookRunner, ResolvedCommand};
pub use githooks_common::{ExecutionPolicy, OutputMode};
pub use loader::{Discovery, HookLoader};
pub use spec::{ExecutionResult, HookInvocation, HookSpec, HookStatus, Interpreter};
pub use stage::Stage;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HookError {
    #[error("Hooks root not found: {}", root.display())]
    Discovery { root: PathBuf },
    #[error("Failed to read hook directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unknown hook stage: {0}")]
    UnknownStage(String),
    #[error("No interpreter for hook {hook}: {interpreter}")]
    InterpreterNotFound { hook: String, interpreter: String },
    #[error("Hook {hook} failed with exit code {exit_code}")]
    HookFailure { hook: String, exit_code: i32 },
    #[error("Dispatch cancelled{}", hook.as_ref().map(|h| format!(" while running {h}")).unwrap_or_default())]
    Cancelled { hook: Option<String> },
}

pub type Result<T> = std::result::Result<T, HookError>;
