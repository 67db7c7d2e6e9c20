//! Common utilities shared across githooks crates.
//!
//! - [`config`]: layered TOML configuration for dispatch and publishing
//! - [`policy`]: execution policy and output mode shared by config and dispatcher
//! - [`cancel`]: interrupt handling that feeds a [`CancellationToken`]
//! - [`truncate`]: output truncation for hook reports

pub mod cancel;
pub mod config;
pub mod policy;
pub mod truncate;

pub use cancel::{INTERRUPTED_EXIT_CODE, install_interrupt_handler, sleep_or_cancel};
pub use config::{ConfigError, DispatchConfig, GithooksConfig, PublishConfig};
pub use policy::{ExecutionPolicy, OutputMode};
pub use tokio_util::sync::CancellationToken;
