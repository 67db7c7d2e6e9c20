//! Stage dispatch.
//!
//! Runs every enabled hook of a stage in order and folds the results into a
//! single exit code according to the [`ExecutionPolicy`].

use githooks_common::truncate::{TRUNCATION_MARKER, truncate_first_line};
use githooks_common::{CancellationToken, ExecutionPolicy};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::executor::{Executor, HookRunner};
use crate::loader::HookLoader;
use crate::spec::{ExecutionResult, HookInvocation, HookSpec};
use crate::{HookError, Result, Stage};

/// Characters of hook output quoted in a warning.
const WARNING_DETAIL_CHARS: usize = 120;

/// Where a dispatch currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Idle,
    Loading,
    /// Running the enabled hook at this index.
    Running(usize),
    /// A strict run stopped at a failing hook.
    Aborted,
    Completed,
}

impl DispatchPhase {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_advance_to(&self, next: DispatchPhase) -> bool {
        use DispatchPhase::*;
        match (*self, next) {
            (Idle, Loading) => true,
            (Loading, Running(0)) | (Loading, Completed) => true,
            (Running(i), Running(j)) => j == i + 1,
            (Running(_), Aborted) | (Running(_), Completed) => true,
            (Aborted, Completed) => true,
            _ => false,
        }
    }
}

/// A non-strict failure that was reported but did not stop the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookWarning {
    pub hook: String,
    pub exit_code: i32,
    pub message: String,
}

impl HookWarning {
    fn from_result(result: &ExecutionResult) -> Self {
        let mut message = format!(
            "hook {} {} (exit code {})",
            result.spec.filename,
            result.status.as_str(),
            result.exit_code
        );
        let output = result
            .truncated_output
            .strip_prefix(TRUNCATION_MARKER)
            .unwrap_or(&result.truncated_output);
        let first_line = truncate_first_line(output, WARNING_DETAIL_CHARS);
        if !first_line.is_empty() {
            message.push_str(": ");
            message.push_str(&first_line);
        }

        Self {
            hook: result.spec.filename.clone(),
            exit_code: result.exit_code,
            message,
        }
    }
}

/// Outcome of dispatching one stage.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub stage: Stage,
    pub policy: ExecutionPolicy,
    /// Number of hook files found, disabled ones included.
    pub discovered: usize,
    pub disabled: Vec<HookSpec>,
    /// One result per hook that was started, in run order.
    pub results: Vec<ExecutionResult>,
    /// Enabled hooks never started because a strict run aborted.
    pub skipped: Vec<HookSpec>,
    pub warnings: Vec<HookWarning>,
    /// File name of the hook that aborted a strict run.
    pub aborted_by: Option<String>,
    /// Exit code handed back to Git.
    pub exit_code: i32,
}

impl DispatchReport {
    fn new(stage: Stage, policy: ExecutionPolicy) -> Self {
        Self {
            stage,
            policy,
            discovered: 0,
            disabled: Vec::new(),
            results: Vec::new(),
            skipped: Vec::new(),
            warnings: Vec::new(),
            aborted_by: None,
            exit_code: 0,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn was_aborted(&self) -> bool {
        self.aborted_by.is_some()
    }

    /// The failure that aborted a strict run, as an error.
    pub fn failure(&self) -> Option<HookError> {
        self.aborted_by.as_ref().map(|hook| HookError::HookFailure {
            hook: hook.clone(),
            exit_code: self.exit_code,
        })
    }

    /// File names of the hooks that ran, in order.
    pub fn executed(&self) -> Vec<&str> {
        self.results
            .iter()
            .map(|r| r.spec.filename.as_str())
            .collect()
    }
}

/// Runs the hooks of a stage through a [`HookRunner`].
pub struct Dispatcher<R: HookRunner = Executor> {
    loader: HookLoader,
    runner: R,
}

impl Dispatcher<Executor> {
    /// Dispatcher that spawns real processes.
    pub fn with_executor(loader: HookLoader, executor: Executor) -> Self {
        Self::new(loader, executor)
    }
}

impl<R: HookRunner> Dispatcher<R> {
    pub fn new(loader: HookLoader, runner: R) -> Self {
        Self { loader, runner }
    }

    pub fn loader(&self) -> &HookLoader {
        &self.loader
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Dispatch `stage` under `policy`.
    ///
    /// Hook failures never surface as `Err`; they are folded into the
    /// report's exit code. Errors are reserved for discovery problems and
    /// cancellation.
    pub async fn dispatch(
        &self,
        stage: Stage,
        policy: ExecutionPolicy,
        invocation: &HookInvocation,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport> {
        let mut phase = DispatchPhase::Idle;
        let mut report = DispatchReport::new(stage, policy);

        advance(&mut phase, DispatchPhase::Loading);
        let discovery = self.loader.discover(stage)?;
        report.discovered = discovery.len();
        report.disabled = discovery.disabled().cloned().collect();
        info!(stage = %stage, policy = %policy, "{}", discovery.summary());

        for spec in &report.disabled {
            debug!("Skipping disabled hook {}", spec.filename);
        }

        let enabled: Vec<&HookSpec> = discovery.enabled().collect();
        if enabled.is_empty() {
            advance(&mut phase, DispatchPhase::Completed);
            return Ok(report);
        }

        for (index, spec) in enabled.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(HookError::Cancelled {
                    hook: Some(spec.filename.clone()),
                });
            }

            advance(&mut phase, DispatchPhase::Running(index));
            let result = self.runner.run_hook(spec, invocation, cancel).await?;

            if result.success() {
                report.results.push(result);
                continue;
            }

            match policy {
                ExecutionPolicy::NonStrict => {
                    let warning = HookWarning::from_result(&result);
                    warn!("{}", warning.message);
                    report.warnings.push(warning);
                    report.results.push(result);
                }
                ExecutionPolicy::Strict => {
                    warn!(
                        "Hook {} failed with exit code {}; aborting {}",
                        spec.filename, result.exit_code, stage
                    );
                    report.exit_code = result.exit_code;
                    report.aborted_by = Some(spec.filename.clone());
                    report.results.push(result);
                    report.skipped = enabled[index + 1..].iter().map(|s| (*s).clone()).collect();
                    for skipped in &report.skipped {
                        debug!(
                            "Skipping {} due to earlier failure of {}",
                            skipped.filename, spec.filename
                        );
                    }
                    advance(&mut phase, DispatchPhase::Aborted);
                    break;
                }
            }
        }

        advance(&mut phase, DispatchPhase::Completed);
        Ok(report)
    }
}

fn advance(phase: &mut DispatchPhase, next: DispatchPhase) {
    debug_assert!(
        phase.can_advance_to(next),
        "illegal dispatch transition {:?} -> {:?}",
        phase,
        next
    );
    trace!(from = ?phase, to = ?next, "Dispatch phase");
    *phase = next;
}
