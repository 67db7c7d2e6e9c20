//! `githooks list`: show the hooks a stage would run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use githooks_common::GithooksConfig;
use githooks_hooks::{HookLoader, HookSpec, Stage};

/// List the hooks of a stage.
#[derive(Debug, Parser)]
pub struct ListCli {
    /// Lifecycle stage to inspect
    pub stage: Stage,

    /// Directory holding one sub-directory of hooks per stage
    #[arg(long, value_name = "DIR")]
    pub hooks_root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct ListOutput<'a> {
    stage: Stage,
    hooks_root: &'a Path,
    total: usize,
    disabled: usize,
    hooks: &'a [HookSpec],
}

impl ListCli {
    pub fn run(self, config: &GithooksConfig, cwd: &Path) -> Result<i32> {
        let hooks_root = match &self.hooks_root {
            Some(root) => cwd.join(root),
            None => config.dispatch.resolve_hooks_root(cwd),
        };

        let discovery = HookLoader::new(&hooks_root)
            .discover(self.stage)
            .with_context(|| format!("Failed to list {} hooks", self.stage))?;

        if self.json {
            let output = ListOutput {
                stage: self.stage,
                hooks_root: &hooks_root,
                total: discovery.len(),
                disabled: discovery.disabled_count(),
                hooks: &discovery.specs,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(0);
        }

        if discovery.is_empty() {
            println!(
                "No {} hooks in {}",
                self.stage,
                hooks_root.join(self.stage.as_str()).display()
            );
            return Ok(0);
        }

        println!("{:<4} {:<40} {:<10} STATE", "#", "HOOK", "RUNS WITH");
        for (index, spec) in discovery.specs.iter().enumerate() {
            let state = if spec.is_disabled {
                "disabled"
            } else if spec.is_executable {
                "enabled"
            } else {
                "enabled (not executable)"
            };
            let runs_with = if spec.is_binary {
                "binary".to_string()
            } else if !spec.interpreter.is_some() && spec.is_executable {
                "sh".to_string()
            } else {
                spec.interpreter.to_string()
            };
            println!(
                "{:<4} {:<40} {:<10} {}",
                index + 1,
                spec.filename,
                runs_with,
                state
            );
        }
        println!();
        println!("{}", discovery.summary());

        Ok(0)
    }
}
