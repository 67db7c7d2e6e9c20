//! githooks - main entry point.

use clap::Parser;

use githooks_cli::cli::{Cli, dispatch_command};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let env_level = std::env::var("GITHOOKS_LOG_LEVEL").ok();
    let log_level = cli.effective_log_level(env_level.as_deref());

    // Diagnostics go to stderr so hook and JSON output on stdout stay clean.
    tracing_subscriber::fmt()
        .with_env_filter(log_level.as_filter_str())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let code = match dispatch_command(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };

    std::process::exit(code);
}
