//! Dispatch policy types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the dispatcher reacts to a hook that exits non-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPolicy {
    /// The first failing hook aborts the chain and its exit code is returned.
    Strict,
    /// Every hook runs; failures become warnings and the dispatcher exits 0.
    #[default]
    NonStrict,
}

impl ExecutionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPolicy::Strict => "strict",
            ExecutionPolicy::NonStrict => "non-strict",
        }
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, ExecutionPolicy::Strict)
    }
}

impl fmt::Display for ExecutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ExecutionPolicy::Strict),
            "non-strict" | "non_strict" | "nonstrict" => Ok(ExecutionPolicy::NonStrict),
            other => Err(format!(
                "unknown execution policy '{}' (expected 'strict' or 'non-strict')",
                other
            )),
        }
    }
}

/// Whether hook output goes straight to the terminal or is captured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Capture stdout and stderr into the execution result.
    #[default]
    Capture,
    /// Let the hook write to the dispatcher's own stdio.
    Inherit,
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "capture" => Ok(OutputMode::Capture),
            "inherit" => Ok(OutputMode::Inherit),
            other => Err(format!(
                "unknown output mode '{}' (expected 'capture' or 'inherit')",
                other
            )),
        }
    }
}
