//! Hook specifications and execution results.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Stage;

/// Exit code reported when a hook has no usable interpreter.
pub const INTERPRETER_NOT_FOUND_EXIT_CODE: i32 = 127;

/// Exit code reported when a hook could not be spawned for another reason.
pub const SPAWN_FAILED_EXIT_CODE: i32 = 126;

/// Exit code reported when a hook was killed after exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Interpreter named by a hook's shebang line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "program")]
pub enum Interpreter {
    /// POSIX shell (`sh`, `dash`).
    Sh,
    /// Bash; falls back to `sh` when bash is missing.
    Bash,
    /// Python (`python3`, then `python`).
    Python,
    /// Node.js.
    Node,
    /// Any other program named by the shebang.
    Other(String),
    /// No shebang at all.
    None,
}

impl Interpreter {
    /// Parse the first line of a file.
    ///
    /// Handles both `#!/bin/bash` and `#!/usr/bin/env python3` forms,
    /// including `env -S`.
    pub fn from_shebang(first_line: &str) -> Self {
        let Some(rest) = first_line.trim_end().strip_prefix("#!") else {
            return Interpreter::None;
        };

        let mut parts = rest.split_whitespace();
        let Some(first) = parts.next() else {
            return Interpreter::None;
        };

        let program = if program_name(first) == "env" {
            match parts.find(|p| !p.starts_with('-')) {
                Some(p) => program_name(p),
                None => return Interpreter::None,
            }
        } else {
            program_name(first)
        };

        Self::from_program(program)
    }

    fn from_program(program: &str) -> Self {
        match program {
            "sh" | "dash" => Interpreter::Sh,
            "bash" => Interpreter::Bash,
            "node" | "nodejs" => Interpreter::Node,
            p if p.starts_with("python") => Interpreter::Python,
            p => Interpreter::Other(p.to_string()),
        }
    }

    /// Whether a shebang was present.
    pub fn is_some(&self) -> bool {
        !matches!(self, Interpreter::None)
    }
}

impl fmt::Display for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interpreter::Sh => f.write_str("sh"),
            Interpreter::Bash => f.write_str("bash"),
            Interpreter::Python => f.write_str("python"),
            Interpreter::Node => f.write_str("node"),
            Interpreter::Other(p) => f.write_str(p),
            Interpreter::None => f.write_str("none"),
        }
    }
}

/// Strip directories and a Windows `.exe` suffix from a shebang program.
fn program_name(path: &str) -> &str {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    name.strip_suffix(".exe").unwrap_or(name)
}

/// One discovered hook file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookSpec {
    /// Stage directory the hook was found in.
    pub stage: Stage,
    /// File name, the ordering key.
    pub filename: String,
    /// Absolute path to the file.
    pub path: PathBuf,
    /// Whether the file carries an execute bit (always true on Windows).
    pub is_executable: bool,
    /// Whether the file name carries the disabled suffix.
    pub is_disabled: bool,
    /// Interpreter sniffed from the shebang.
    pub interpreter: Interpreter,
    /// Whether the file starts with a native executable header (ELF, Mach-O, PE).
    pub is_binary: bool,
}

impl HookSpec {
    /// Hook name without the `.hook` / `.hook.disabled` suffix.
    pub fn name(&self) -> &str {
        let name = self
            .filename
            .strip_suffix(crate::loader::DISABLED_SUFFIX)
            .unwrap_or(&self.filename);
        name.strip_suffix(crate::loader::HOOK_SUFFIX).unwrap_or(name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Arguments and input forwarded to every hook of a stage.
///
/// Mirrors what Git passes to the stage's hook natively.
#[derive(Debug, Clone, Default)]
pub struct HookInvocation {
    /// Positional arguments (e.g. the commit message file for commit-msg).
    pub args: Vec<OsString>,
    /// Standard input replayed to each hook, for stages that receive it.
    pub stdin: Option<Vec<u8>>,
    /// Extra environment variables.
    pub environment: HashMap<String, String>,
}

impl HookInvocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Environment for one hook: the invocation's own variables plus
    /// `GITHOOKS_STAGE` and `GITHOOKS_HOOK`.
    pub fn env_for(&self, spec: &HookSpec) -> HashMap<String, String> {
        let mut env = self.environment.clone();
        env.insert("GITHOOKS_STAGE".to_string(), spec.stage.as_str().to_string());
        env.insert("GITHOOKS_HOOK".to_string(), spec.filename.clone());
        env
    }
}

/// How a hook run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookStatus {
    /// Hook exited 0.
    Passed,
    /// Hook ran and reported failure.
    Failed,
    /// No interpreter could be found for the hook.
    InterpreterNotFound,
    /// The process could not be started.
    SpawnFailed,
    /// The hook exceeded its timeout and was killed.
    TimedOut,
}

impl HookStatus {
    /// Whether the hook itself ran to completion (as opposed to "could not run").
    pub fn hook_ran(&self) -> bool {
        matches!(self, HookStatus::Passed | HookStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HookStatus::Passed => "passed",
            HookStatus::Failed => "failed",
            HookStatus::InterpreterNotFound => "interpreter not found",
            HookStatus::SpawnFailed => "could not start",
            HookStatus::TimedOut => "timed out",
        }
    }
}

/// Result of running one hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub spec: HookSpec,
    pub status: HookStatus,
    pub exit_code: i32,
    pub duration_ms: u64,
    /// Captured output, tail-truncated. Empty when output was inherited.
    pub truncated_output: String,
}

impl ExecutionResult {
    /// Result for a hook that ran and exited with `exit_code`.
    pub fn completed(
        spec: &HookSpec,
        exit_code: i32,
        duration_ms: u64,
        output: impl Into<String>,
    ) -> Self {
        Self {
            spec: spec.clone(),
            status: if exit_code == 0 {
                HookStatus::Passed
            } else {
                HookStatus::Failed
            },
            exit_code,
            duration_ms,
            truncated_output: output.into(),
        }
    }

    /// Result for a hook that could not be run to completion.
    pub fn not_run(
        spec: &HookSpec,
        status: HookStatus,
        duration_ms: u64,
        message: impl Into<String>,
    ) -> Self {
        let exit_code = match status {
            HookStatus::InterpreterNotFound => INTERPRETER_NOT_FOUND_EXIT_CODE,
            HookStatus::TimedOut => TIMEOUT_EXIT_CODE,
            _ => SPAWN_FAILED_EXIT_CODE,
        };
        Self {
            spec: spec.clone(),
            status,
            exit_code,
            duration_ms,
            truncated_output: message.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(filename: &str) -> HookSpec {
        HookSpec {
            stage: Stage::PreCommit,
            filename: filename.to_string(),
            path: PathBuf::from("/hooks/pre-commit").join(filename),
            is_executable: true,
            is_disabled: filename.ends_with(".disabled"),
            interpreter: Interpreter::Sh,
            is_binary: false,
        }
    }

    #[test]
    fn test_shebang_direct_paths() {
        assert_eq!(Interpreter::from_shebang("#!/bin/sh"), Interpreter::Sh);
        assert_eq!(Interpreter::from_shebang("#!/bin/bash -e"), Interpreter::Bash);
        assert_eq!(Interpreter::from_shebang("#!/usr/bin/python3"), Interpreter::Python);
        assert_eq!(
            Interpreter::from_shebang("#!/usr/local/bin/ruby"),
            Interpreter::Other("ruby".to_string())
        );
    }

    #[test]
    fn test_shebang_env_forms() {
        assert_eq!(Interpreter::from_shebang("#!/usr/bin/env python"), Interpreter::Python);
        assert_eq!(Interpreter::from_shebang("#!/usr/bin/env node"), Interpreter::Node);
        assert_eq!(Interpreter::from_shebang("#! /usr/bin/env bash"), Interpreter::Bash);
        assert_eq!(
            Interpreter::from_shebang("#!/usr/bin/env -S python3 -u"),
            Interpreter::Python
        );
        assert_eq!(Interpreter::from_shebang("#!/usr/bin/env"), Interpreter::None);
    }

    #[test]
    fn test_shebang_windows_paths() {
        assert_eq!(
            Interpreter::from_shebang(r"#!C:\Git\bin\bash.exe"),
            Interpreter::Bash
        );
    }

    #[test]
    fn test_no_shebang() {
        assert_eq!(Interpreter::from_shebang("echo hi"), Interpreter::None);
        assert_eq!(Interpreter::from_shebang(""), Interpreter::None);
        assert_eq!(Interpreter::from_shebang("#!"), Interpreter::None);
        assert!(!Interpreter::None.is_some());
    }

    #[test]
    fn test_spec_name_strips_suffixes() {
        assert_eq!(spec("10-lint.hook").name(), "10-lint");
        assert_eq!(spec("20-spell.hook.disabled").name(), "20-spell");
    }

    #[test]
    fn test_invocation_env_includes_stage_and_hook() {
        let invocation = HookInvocation::new().with_env("CI", "1");
        let env = invocation.env_for(&spec("a.hook"));
        assert_eq!(env.get("GITHOOKS_STAGE").map(String::as_str), Some("pre-commit"));
        assert_eq!(env.get("GITHOOKS_HOOK").map(String::as_str), Some("a.hook"));
        assert_eq!(env.get("CI").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_result_constructors() {
        let ok = ExecutionResult::completed(&spec("a.hook"), 0, 5, "");
        assert!(ok.success());
        assert_eq!(ok.status, HookStatus::Passed);

        let failed = ExecutionResult::completed(&spec("a.hook"), 3, 5, "nope");
        assert_eq!(failed.status, HookStatus::Failed);
        assert!(failed.status.hook_ran());

        let missing =
            ExecutionResult::not_run(&spec("a.hook"), HookStatus::InterpreterNotFound, 0, "");
        assert_eq!(missing.exit_code, INTERPRETER_NOT_FOUND_EXIT_CODE);
        assert!(!missing.status.hook_ran());

        let slow = ExecutionResult::not_run(&spec("a.hook"), HookStatus::TimedOut, 0, "");
        assert_eq!(slow.exit_code, TIMEOUT_EXIT_CODE);
    }
}
