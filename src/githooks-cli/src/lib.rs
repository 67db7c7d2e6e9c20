//! githooks command line.
//!
//! - `cli/` - argument parsing and dispatch
//! - `*_cmd.rs` - individual command implementations

pub mod cli;
pub mod config_cmd;
pub mod list_cmd;
pub mod publish_cmd;
pub mod run_cmd;
