//! Hook executor for running a single hook as a child process.

use std::collections::HashMap;
use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use std::process::{ExitStatus, Output, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use githooks_common::truncate::truncate_keep_tail;
use githooks_common::{CancellationToken, DispatchConfig, OutputMode};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::spec::{ExecutionResult, HookInvocation, HookSpec, HookStatus, Interpreter};
use crate::{HookError, Result};

/// Runs one hook. The dispatcher only talks to hooks through this trait.
#[async_trait]
pub trait HookRunner: Send + Sync {
    /// Run `spec` to completion.
    ///
    /// Hook failures, missing interpreters and spawn errors are all reported
    /// through the returned [`ExecutionResult`]. The only error is
    /// [`HookError::Cancelled`].
    async fn run_hook(
        &self,
        spec: &HookSpec,
        invocation: &HookInvocation,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult>;
}

/// Executor settings.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub output: OutputMode,
    pub max_output_chars: usize,
    pub timeout: Option<Duration>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

impl ExecutorOptions {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            output: config.output,
            max_output_chars: config.max_output_chars,
            timeout: config.hook_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Program and leading arguments used to start a hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

/// Executor for running hooks.
pub struct Executor {
    options: ExecutorOptions,
    /// Interpreter lookups, shared across the hooks of one dispatch.
    interpreters: Mutex<HashMap<Interpreter, Option<PathBuf>>>,
}

impl Executor {
    pub fn new() -> Self {
        Self::with_options(ExecutorOptions::default())
    }

    pub fn with_options(options: ExecutorOptions) -> Self {
        Self {
            options,
            interpreters: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.options.output = output;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Decide how to start `spec`.
    ///
    /// Native binaries, and executable scripts with a shebang on Unix, are
    /// started directly. Other scripts go through the interpreter named by
    /// their shebang, which receives the hook path as its first argument. An
    /// executable script without a shebang is run by `sh`, as Git does.
    pub fn resolve_command(&self, spec: &HookSpec) -> Result<ResolvedCommand> {
        if runs_natively(spec) {
            return Ok(ResolvedCommand {
                program: spec.path.clone(),
                args: Vec::new(),
            });
        }

        let interpreter = match &spec.interpreter {
            Interpreter::None if spec.is_executable => Interpreter::Sh,
            Interpreter::None => {
                return Err(HookError::InterpreterNotFound {
                    hook: spec.filename.clone(),
                    interpreter: "none (no shebang and not executable)".to_string(),
                });
            }
            other => other.clone(),
        };

        let program = {
            let mut cache = self.interpreters.lock();
            cache
                .entry(interpreter.clone())
                .or_insert_with(|| locate_interpreter(&interpreter))
                .clone()
        };

        match program {
            Some(program) => Ok(ResolvedCommand {
                program,
                args: vec![script_argument(spec, &interpreter)],
            }),
            None => Err(HookError::InterpreterNotFound {
                hook: spec.filename.clone(),
                interpreter: interpreter.to_string(),
            }),
        }
    }

    /// Run one hook and wait for it.
    pub async fn execute(
        &self,
        spec: &HookSpec,
        invocation: &HookInvocation,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        if cancel.is_cancelled() {
            return Err(HookError::Cancelled {
                hook: Some(spec.filename.clone()),
            });
        }

        let start = Instant::now();

        let resolved = match self.resolve_command(spec) {
            Ok(resolved) => resolved,
            Err(e) => {
                error!("Hook {} cannot run: {}", spec.filename, e);
                return Ok(ExecutionResult::not_run(
                    spec,
                    HookStatus::InterpreterNotFound,
                    elapsed_ms(start),
                    e.to_string(),
                ));
            }
        };

        debug!("Executing hook {}: {:?}", spec.filename, resolved);

        let mut command = Command::new(&resolved.program);
        command.args(&resolved.args).args(&invocation.args);
        for (key, value) in invocation.env_for(spec) {
            command.env(key, value);
        }

        command.stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });
        match self.options.output {
            OutputMode::Capture => {
                command.stdout(Stdio::piped());
                command.stderr(Stdio::piped());
            }
            OutputMode::Inherit => {
                command.stdout(Stdio::inherit());
                command.stderr(Stdio::inherit());
            }
        }
        // Dropping the wait future on cancellation or timeout kills the hook.
        command.kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let status = if e.kind() == std::io::ErrorKind::NotFound {
                    HookStatus::InterpreterNotFound
                } else {
                    HookStatus::SpawnFailed
                };
                error!(
                    "Hook {} execution error ({}): {}",
                    spec.filename,
                    resolved.program.display(),
                    e
                );
                return Ok(ExecutionResult::not_run(
                    spec,
                    status,
                    elapsed_ms(start),
                    format!("{}: {}", resolved.program.display(), e),
                ));
            }
        };

        if let (Some(input), Some(mut stdin)) = (invocation.stdin.clone(), child.stdin.take()) {
            let hook = spec.filename.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&input).await {
                    // A hook that ignores its input closes the pipe early.
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        debug!("Failed to write stdin to hook {}: {}", hook, e);
                    }
                }
            });
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Hook {} cancelled after {}ms", spec.filename, elapsed_ms(start));
                return Err(HookError::Cancelled {
                    hook: Some(spec.filename.clone()),
                });
            }
            outcome = wait_with_timeout(self.options.timeout, child.wait_with_output()) => outcome,
        };

        let duration_ms = elapsed_ms(start);
        let result = match outcome {
            WaitOutcome::Exited(output) => {
                let exit_code = exit_code(&output.status);
                let combined = combine_output(&output);
                let truncated = truncate_keep_tail(&combined, self.options.max_output_chars);
                if exit_code == 0 {
                    info!(
                        "Hook {} completed successfully in {}ms",
                        spec.filename, duration_ms
                    );
                } else {
                    debug!(
                        "Hook {} exited with code {} after {}ms",
                        spec.filename, exit_code, duration_ms
                    );
                }
                ExecutionResult::completed(spec, exit_code, duration_ms, truncated.into_owned())
            }
            WaitOutcome::TimedOut(limit) => {
                error!("Hook {} timed out after {}s", spec.filename, limit.as_secs_f64());
                ExecutionResult::not_run(
                    spec,
                    HookStatus::TimedOut,
                    duration_ms,
                    format!("hook timed out after {}s", limit.as_secs_f64()),
                )
            }
            WaitOutcome::Failed(e) => {
                error!("Hook {} wait error: {}", spec.filename, e);
                ExecutionResult::not_run(spec, HookStatus::SpawnFailed, duration_ms, e.to_string())
            }
        };

        Ok(result)
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HookRunner for Executor {
    async fn run_hook(
        &self,
        spec: &HookSpec,
        invocation: &HookInvocation,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        self.execute(spec, invocation, cancel).await
    }
}

enum WaitOutcome {
    Exited(Output),
    TimedOut(Duration),
    Failed(std::io::Error),
}

async fn wait_with_timeout<F>(timeout: Option<Duration>, wait: F) -> WaitOutcome
where
    F: Future<Output = std::io::Result<Output>>,
{
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, wait).await {
            Ok(result) => result,
            Err(_) => return WaitOutcome::TimedOut(limit),
        },
        None => wait.await,
    };

    match result {
        Ok(output) => WaitOutcome::Exited(output),
        Err(e) => WaitOutcome::Failed(e),
    }
}

fn runs_natively(spec: &HookSpec) -> bool {
    if spec.is_binary {
        return spec.is_executable;
    }
    // Windows has no shebang support.
    cfg!(unix) && spec.is_executable && spec.interpreter.is_some()
}

/// Hook path as handed to the interpreter.
fn script_argument(spec: &HookSpec, interpreter: &Interpreter) -> OsString {
    if cfg!(windows) && matches!(interpreter, Interpreter::Sh | Interpreter::Bash) {
        // Git Bash expects forward slashes.
        OsString::from(spec.path.to_string_lossy().replace('\\', "/"))
    } else {
        spec.path.clone().into_os_string()
    }
}

/// Find the program for `interpreter` on this machine.
fn locate_interpreter(interpreter: &Interpreter) -> Option<PathBuf> {
    let found = match interpreter {
        Interpreter::Sh => which::which("sh").ok(),
        Interpreter::Bash => locate_bash(),
        Interpreter::Python => first_on_path(&["python3", "python"]),
        Interpreter::Node => first_on_path(&["node", "nodejs"]),
        Interpreter::Other(program) => which::which(program).ok(),
        Interpreter::None => None,
    };
    debug!(interpreter = %interpreter, found = ?found, "Interpreter lookup");
    found
}

fn first_on_path(candidates: &[&str]) -> Option<PathBuf> {
    candidates.iter().find_map(|c| which::which(c).ok())
}

/// Bash, trying the usual install locations before settling for `sh`.
fn locate_bash() -> Option<PathBuf> {
    bash_install_locations()
        .into_iter()
        .find(|p| p.is_file())
        .or_else(|| which::which("bash").ok())
        .or_else(|| {
            ["/bin/bash", "/usr/bin/bash", "/usr/local/bin/bash"]
                .iter()
                .map(PathBuf::from)
                .find(|p| p.is_file())
        })
        .or_else(|| which::which("sh").ok())
}

#[cfg(windows)]
fn bash_install_locations() -> Vec<PathBuf> {
    let mut locations = vec![
        PathBuf::from(r"C:\Program Files\Git\bin\bash.exe"),
        PathBuf::from(r"C:\ProgramData\chocolatey\bin\bash.exe"),
    ];
    if let Some(home) = dirs::home_dir() {
        locations.push(home.join(r"scoop\apps\git\current\bin\bash.exe"));
    }
    locations
}

#[cfg(not(windows))]
fn bash_install_locations() -> Vec<PathBuf> {
    Vec::new()
}

fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

fn combine_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let mut combined = stdout.into_owned();
    if !stderr.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str("[stderr]\n");
        combined.push_str(&stderr);
    }
    combined
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Stage;
    use crate::loader::HookLoader;
    use crate::spec::{INTERPRETER_NOT_FOUND_EXIT_CODE, TIMEOUT_EXIT_CODE};
    use githooks_common::truncate::TRUNCATION_MARKER;
    use std::path::Path;
    use tempfile::TempDir;

    fn make_spec(root: &Path, name: &str, body: &str, executable: bool) -> HookSpec {
        let dir = root.join("pre-commit");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = if executable { 0o755 } else { 0o644 };
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        }
        #[cfg(not(unix))]
        let _ = executable;

        HookLoader::new(root)
            .discover(Stage::PreCommit)
            .unwrap()
            .specs
            .into_iter()
            .find(|s| s.filename == name)
            .unwrap()
    }

    #[tokio::test]
    #[cfg_attr(windows, ignore = "Unix shell commands not available on Windows")]
    async fn test_passing_hook_output_is_captured() {
        let root = TempDir::new().unwrap();
        let spec = make_spec(root.path(), "a.hook", "#!/bin/sh\necho hello\n", true);

        let result = Executor::new()
            .execute(&spec, &HookInvocation::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.success());
        assert_eq!(result.status, HookStatus::Passed);
        assert_eq!(result.truncated_output.trim(), "hello");
    }

    #[tokio::test]
    #[cfg_attr(windows, ignore = "Unix shell commands not available on Windows")]
    async fn test_exit_code_is_propagated() {
        let root = TempDir::new().unwrap();
        let spec = make_spec(
            root.path(),
            "a.hook",
            "#!/bin/sh\necho 'spelling mistake' >&2\nexit 3\n",
            true,
        );

        let result = Executor::new()
            .execute(&spec, &HookInvocation::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.exit_code, 3);
        assert_eq!(result.status, HookStatus::Failed);
        assert!(result.truncated_output.contains("spelling mistake"));
    }

    #[tokio::test]
    #[cfg_attr(windows, ignore = "Unix shell commands not available on Windows")]
    async fn test_non_executable_hook_runs_through_interpreter() {
        let root = TempDir::new().unwrap();
        let spec = make_spec(root.path(), "a.hook", "#!/bin/sh\necho via-sh\n", false);

        let executor = Executor::new();
        let resolved = executor.resolve_command(&spec).unwrap();
        assert_ne!(resolved.program, spec.path);
        assert_eq!(resolved.args, vec![spec.path.clone().into_os_string()]);

        let result = executor
            .execute(&spec, &HookInvocation::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.truncated_output.trim(), "via-sh");
    }

    #[tokio::test]
    #[cfg_attr(windows, ignore = "Unix shell commands not available on Windows")]
    async fn test_executable_without_shebang_falls_back_to_sh() {
        let root = TempDir::new().unwrap();
        let spec = make_spec(root.path(), "a.hook", "echo hi\nexit 0\n", true);
        assert_eq!(spec.interpreter, Interpreter::None);

        let executor = Executor::new();
        let resolved = executor.resolve_command(&spec).unwrap();
        assert_ne!(resolved.program, spec.path);
        assert_eq!(resolved.args, vec![spec.path.clone().into_os_string()]);

        let result = executor
            .execute(&spec, &HookInvocation::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.status, HookStatus::Passed);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.truncated_output.trim(), "hi");
    }

    #[test]
    fn test_native_binary_starts_directly() {
        let spec = HookSpec {
            stage: Stage::PreCommit,
            filename: "a.hook".to_string(),
            path: PathBuf::from("/hooks/pre-commit/a.hook"),
            is_executable: true,
            is_disabled: false,
            interpreter: Interpreter::None,
            is_binary: true,
        };

        let resolved = Executor::new().resolve_command(&spec).unwrap();
        assert_eq!(resolved.program, spec.path);
        assert!(resolved.args.is_empty());
    }

    #[tokio::test]
    #[cfg_attr(windows, ignore = "Unix permissions not available on Windows")]
    async fn test_no_shebang_and_not_executable_is_interpreter_not_found() {
        let root = TempDir::new().unwrap();
        let spec = make_spec(root.path(), "a.hook", "echo nothing\n", false);

        let result = Executor::new()
            .execute(&spec, &HookInvocation::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, HookStatus::InterpreterNotFound);
        assert_eq!(result.exit_code, INTERPRETER_NOT_FOUND_EXIT_CODE);
    }

    #[tokio::test]
    #[cfg_attr(windows, ignore = "Unix permissions not available on Windows")]
    async fn test_unknown_interpreter_is_interpreter_not_found() {
        let root = TempDir::new().unwrap();
        let spec = make_spec(
            root.path(),
            "a.hook",
            "#!/usr/bin/env githooks-no-such-interpreter\n",
            false,
        );

        let err = Executor::new().resolve_command(&spec).unwrap_err();
        assert!(matches!(err, HookError::InterpreterNotFound { .. }));

        let result = Executor::new()
            .execute(&spec, &HookInvocation::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.exit_code, INTERPRETER_NOT_FOUND_EXIT_CODE);
        assert!(!result.status.hook_ran());
    }

    #[tokio::test]
    #[cfg_attr(windows, ignore = "Unix shell commands not available on Windows")]
    async fn test_args_env_and_stdin_are_forwarded() {
        let root = TempDir::new().unwrap();
        let spec = make_spec(
            root.path(),
            "a.hook",
            "#!/bin/sh\necho \"arg=$1\"\necho \"stage=$GITHOOKS_STAGE\"\ncat\n",
            true,
        );

        let invocation = HookInvocation::new()
            .with_args([".git/COMMIT_EDITMSG"])
            .with_stdin("refs/heads/main abc refs/heads/main def\n");

        let result = Executor::new()
            .execute(&spec, &invocation, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.success());
        assert!(result.truncated_output.contains("arg=.git/COMMIT_EDITMSG"));
        assert!(result.truncated_output.contains("stage=pre-commit"));
        assert!(result.truncated_output.contains("refs/heads/main abc"));
    }

    #[tokio::test]
    #[cfg_attr(windows, ignore = "Unix shell commands not available on Windows")]
    async fn test_output_is_tail_truncated() {
        let root = TempDir::new().unwrap();
        let spec = make_spec(
            root.path(),
            "a.hook",
            "#!/bin/sh\ni=0\nwhile [ $i -lt 200 ]; do echo \"line $i\"; i=$((i+1)); done\necho last-line\n",
            true,
        );

        let executor = Executor::with_options(ExecutorOptions {
            max_output_chars: 100,
            ..ExecutorOptions::default()
        });
        let result = executor
            .execute(&spec, &HookInvocation::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.truncated_output.starts_with(TRUNCATION_MARKER));
        assert!(result.truncated_output.trim_end().ends_with("last-line"));
    }

    #[tokio::test]
    #[cfg_attr(windows, ignore = "Unix shell commands not available on Windows")]
    async fn test_inherit_mode_captures_nothing() {
        let root = TempDir::new().unwrap();
        let spec = make_spec(root.path(), "a.hook", "#!/bin/sh\ntrue\n", true);

        let result = Executor::new()
            .with_output(OutputMode::Inherit)
            .execute(&spec, &HookInvocation::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.success());
        assert!(result.truncated_output.is_empty());
    }

    #[tokio::test]
    #[cfg_attr(windows, ignore = "Unix shell commands not available on Windows")]
    async fn test_timeout_kills_hook() {
        let root = TempDir::new().unwrap();
        let spec = make_spec(root.path(), "a.hook", "#!/bin/sh\nsleep 10\n", true);

        let start = Instant::now();
        let result = Executor::new()
            .with_timeout(Duration::from_millis(200))
            .execute(&spec, &HookInvocation::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, HookStatus::TimedOut);
        assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    #[cfg_attr(windows, ignore = "Unix shell commands not available on Windows")]
    async fn test_cancellation_interrupts_wait() {
        let root = TempDir::new().unwrap();
        let spec = make_spec(root.path(), "a.hook", "#!/bin/sh\nsleep 10\n", true);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = Executor::new()
            .execute(&spec, &HookInvocation::new(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, HookError::Cancelled { .. }));
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
