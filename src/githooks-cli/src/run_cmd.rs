//! `githooks run`: dispatch every hook of a stage.
//!
//! This is what the per-stage shim in `.git/hooks` calls, forwarding Git's
//! own arguments after `--`. The process exit code is the dispatcher's.

use std::ffi::OsString;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use githooks_common::{
    CancellationToken, ExecutionPolicy, GithooksConfig, INTERRUPTED_EXIT_CODE, OutputMode,
};
use githooks_hooks::{
    DispatchReport, Dispatcher, Executor, ExecutorOptions, HookError, HookInvocation, HookLoader,
    HookStatus, Stage,
};

/// Run every hook of a stage.
#[derive(Debug, Parser)]
pub struct RunCli {
    /// Lifecycle stage to dispatch (e.g. pre-commit, commit-msg)
    pub stage: Stage,

    /// Stop at the first failing hook and exit with its code
    #[arg(long, conflicts_with = "non_strict")]
    pub strict: bool,

    /// Run every hook; failures become warnings and the exit code is 0
    #[arg(long)]
    pub non_strict: bool,

    /// Directory holding one sub-directory of hooks per stage
    #[arg(long, value_name = "DIR")]
    pub hooks_root: Option<PathBuf>,

    /// Capture hook output and print it with the summary
    #[arg(long, conflicts_with = "inherit")]
    pub capture: bool,

    /// Let hooks write directly to the terminal
    #[arg(long)]
    pub inherit: bool,

    /// Kill a hook that runs longer than this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print the dispatch report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Arguments forwarded verbatim to every hook
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<OsString>,
}

impl RunCli {
    fn policy(&self, config: &GithooksConfig) -> ExecutionPolicy {
        if self.strict {
            ExecutionPolicy::Strict
        } else if self.non_strict {
            ExecutionPolicy::NonStrict
        } else {
            config.dispatch.policy
        }
    }

    fn output_mode(&self, config: &GithooksConfig) -> OutputMode {
        if self.capture {
            OutputMode::Capture
        } else if self.inherit {
            OutputMode::Inherit
        } else {
            config.dispatch.output
        }
    }

    pub async fn run(
        self,
        config: &GithooksConfig,
        cwd: &Path,
        cancel: &CancellationToken,
    ) -> Result<i32> {
        let stage = self.stage;
        let policy = self.policy(config);

        let mut dispatch = config.dispatch.clone();
        dispatch.output = self.output_mode(config);
        if let Some(secs) = self.timeout {
            dispatch.hook_timeout_secs = Some(secs);
        }
        let hooks_root = match &self.hooks_root {
            Some(root) => cwd.join(root),
            None => dispatch.resolve_hooks_root(cwd),
        };

        if policy.is_strict() && !stage.can_reject() {
            warn!(
                "{} cannot stop the Git operation; strict policy only stops the hook chain",
                stage
            );
        }

        let loader = HookLoader::new(&hooks_root);
        let mut invocation = HookInvocation::new().with_args(self.args.clone());
        if stage.receives_stdin()
            && !std::io::stdin().is_terminal()
            && has_enabled_hooks(&loader, stage)
        {
            let Some(input) = read_hook_input(tokio::io::stdin(), cancel).await? else {
                eprintln!("githooks: {} interrupted while reading hook input", stage);
                return Ok(INTERRUPTED_EXIT_CODE);
            };
            debug!(bytes = input.len(), "Replaying stdin to every hook");
            invocation = invocation.with_stdin(input);
        }

        let executor = Executor::with_options(ExecutorOptions::from_config(&dispatch));
        let dispatcher = Dispatcher::new(loader, executor);

        let report = match dispatcher.dispatch(stage, policy, &invocation, cancel).await {
            Ok(report) => report,
            Err(HookError::Cancelled { hook }) => {
                eprintln!(
                    "githooks: {} interrupted{}",
                    stage,
                    hook.map(|h| format!(" while running {}", h))
                        .unwrap_or_default()
                );
                return Ok(INTERRUPTED_EXIT_CODE);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to dispatch {}", stage));
            }
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report, dispatch.output)?;
        }

        Ok(report.exit_code)
    }
}

/// Whether `stage` has anything to feed. Discovery errors are left for the
/// dispatcher to report.
fn has_enabled_hooks(loader: &HookLoader, stage: Stage) -> bool {
    loader
        .discover(stage)
        .map(|discovery| discovery.enabled().next().is_some())
        .unwrap_or(true)
}

/// Read all of Git's input for the hooks. `None` when cancelled first.
async fn read_hook_input<R>(mut reader: R, cancel: &CancellationToken) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut input = Vec::new();
    tokio::select! {
        _ = cancel.cancelled() => Ok(None),
        read = reader.read_to_end(&mut input) => {
            read.context("Failed to read hook input from stdin")?;
            Ok(Some(input))
        }
    }
}

/// Human summary on stderr, where Git shows hook output.
fn print_report(report: &DispatchReport, output: OutputMode) -> Result<()> {
    if report.discovered == 0 {
        return Ok(());
    }

    let mut err = std::io::stderr().lock();
    writeln!(
        err,
        "githooks {} ({}): {} hook{} found, {} skipped (disabled)",
        report.stage,
        report.policy,
        report.discovered,
        if report.discovered == 1 { "" } else { "s" },
        report.disabled.len()
    )?;

    for result in &report.results {
        let label = match result.status {
            HookStatus::Passed => "ok".to_string(),
            HookStatus::Failed => format!("FAILED (exit {})", result.exit_code),
            other => format!("FAILED ({}, exit {})", other.as_str(), result.exit_code),
        };
        writeln!(
            err,
            "  {:<40} {} [{}ms]",
            result.spec.filename, label, result.duration_ms
        )?;

        let show_output = !result.success() || output == OutputMode::Capture;
        if show_output && !result.truncated_output.trim().is_empty() {
            for line in result.truncated_output.trim_end().lines() {
                writeln!(err, "    | {}", line)?;
            }
        }
    }

    for spec in &report.skipped {
        writeln!(err, "  {:<40} skipped due to earlier failure", spec.filename)?;
    }
    for spec in &report.disabled {
        writeln!(err, "  {:<40} disabled", spec.filename)?;
    }

    if let Some(hook) = &report.aborted_by {
        writeln!(
            err,
            "githooks: {} aborted by {} (exit {})",
            report.stage, hook, report.exit_code
        )?;
    } else if !report.warnings.is_empty() {
        writeln!(
            err,
            "githooks: {} finished with {} warning{}",
            report.stage,
            report.warnings.len(),
            if report.warnings.len() == 1 { "" } else { "s" }
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_read_hook_input_reads_until_eof() {
        let (mut writer, reader) = tokio::io::duplex(64);
        writer.write_all(b"old new refs/heads/main\n").await.unwrap();
        drop(writer);

        let input = read_hook_input(reader, &CancellationToken::new()).await.unwrap();
        assert_eq!(input.as_deref(), Some(&b"old new refs/heads/main\n"[..]));
    }

    #[tokio::test]
    async fn test_read_hook_input_stops_on_cancel() {
        let (_writer, reader) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let input = tokio::time::timeout(Duration::from_secs(5), read_hook_input(reader, &cancel))
            .await
            .unwrap()
            .unwrap();
        assert!(input.is_none());
    }
}
