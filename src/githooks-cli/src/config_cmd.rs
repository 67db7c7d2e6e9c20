//! `githooks config`: print the effective configuration.

use anyhow::Result;
use clap::Parser;

use githooks_common::GithooksConfig;

/// Show the effective configuration after files and environment overrides.
#[derive(Debug, Parser)]
pub struct ConfigCli {
    /// Output as JSON instead of TOML
    #[arg(long)]
    pub json: bool,
}

impl ConfigCli {
    pub fn run(self, config: &GithooksConfig) -> Result<i32> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(config)?);
        } else {
            print!("{}", toml::to_string_pretty(config)?);
        }
        Ok(0)
    }
}
