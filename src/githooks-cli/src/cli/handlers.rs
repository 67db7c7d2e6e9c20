//! Command dispatch.

use anyhow::{Context, Result};

use githooks_common::{GithooksConfig, install_interrupt_handler};

use super::args::{Cli, Commands};

/// Dispatch a CLI command to its handler and return the process exit code.
pub async fn dispatch_command(cli: Cli) -> Result<i32> {
    let cwd = std::env::current_dir().context("Failed to determine the current directory")?;
    let config = GithooksConfig::resolve(cli.config.as_deref(), &cwd)
        .context("Failed to load githooks configuration")?;

    match cli.command {
        Commands::Run(run_cli) => {
            let cancel = install_interrupt_handler();
            run_cli.run(&config, &cwd, &cancel).await
        }
        Commands::List(list_cli) => list_cli.run(&config, &cwd),
        Commands::Publish(publish_cli) => {
            let cancel = install_interrupt_handler();
            publish_cli.run(&config, &cwd, &cancel).await
        }
        Commands::Config(config_cli) => config_cli.run(&config),
    }
}
