//! Interrupt handling.
//!
//! Both suspension points of the core (waiting on a hook process and sleeping
//! between publish attempts) observe a [`CancellationToken`]. This module wires
//! Ctrl+C to that token instead of letting the default handler kill the
//! process while a hook is half way through editing the index.

use std::sync::atomic::{AtomicU32, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Exit code reported when a run is cancelled by an interrupt (128 + SIGINT).
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Number of interrupts after which we stop waiting for a graceful shutdown.
const MAX_RAPID_SIGNALS: u32 = 3;

static SIGNAL_COUNT: AtomicU32 = AtomicU32::new(0);

/// Install a Ctrl+C listener and return the token it cancels.
///
/// The first interrupt cancels the token so the running hook is killed and the
/// retry loop stops sleeping. Repeated interrupts force an immediate exit in
/// case cleanup itself is stuck.
///
/// Must be called from inside a tokio runtime.
pub fn install_interrupt_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for interrupt signal: {}", e);
                return;
            }

            let count = SIGNAL_COUNT.fetch_add(1, Ordering::SeqCst) + 1;
            if count >= MAX_RAPID_SIGNALS {
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }

            if trigger.is_cancelled() {
                debug!("Interrupt received again ({}), already cancelling", count);
            } else {
                warn!("Interrupt received, cancelling current operation");
                trigger.cancel();
            }
        }
    });

    token
}

/// Sleep for `duration` unless the token is cancelled first.
///
/// Returns `true` if the full duration elapsed and `false` if the sleep was cut
/// short by cancellation.
pub async fn sleep_or_cancel(duration: std::time::Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_cancel_completes() {
        let token = CancellationToken::new();
        let start = tokio::time::Instant::now();
        assert!(sleep_or_cancel(Duration::from_secs(5), &token).await);
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_cancel_interrupted() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = tokio::time::Instant::now();
        assert!(!sleep_or_cancel(Duration::from_secs(60), &token).await);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_sleep_or_cancel_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(!sleep_or_cancel(Duration::from_secs(60), &token).await);
    }
}
