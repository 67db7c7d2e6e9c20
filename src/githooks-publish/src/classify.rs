//! Error classification.
//!
//! Decides whether a failed git operation is worth retrying. Only a known set
//! of network and server conditions is [`ErrorClass::Transient`]; anything
//! unrecognised is [`ErrorClass::Fatal`].

use std::io;

use regex::Regex;
use serde::Serialize;

/// Whether an error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Fatal,
}

impl ErrorClass {
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

/// Raw failure as observed by the caller.
#[derive(Debug, Clone, Copy)]
pub enum ErrorSignal<'a> {
    /// A process that exited with `exit_code` and wrote `output`.
    Output { exit_code: i32, output: &'a str },
    /// A free-form message.
    Text(&'a str),
    /// An I/O error from the operating system.
    Io(&'a io::Error),
}

/// Lowercased fragments marking a transient failure.
const TRANSIENT_PATTERNS: &[&str] = &[
    "connection reset",
    "connection refused",
    "connection timed out",
    "timed out",
    "timeout",
    "network is unreachable",
    "network unreachable",
    "no route to host",
    "temporary failure in name resolution",
    "temporary failure",
    "ssh_exchange_identification",
    "kex_exchange_identification",
    "banner exchange",
    "rate limit",
    "too many requests",
];

lazy_static::lazy_static! {
    /// HTTP 429 and 5xx as git and curl report them, e.g.
    /// `The requested URL returned error: 503` or `HTTP 502 curl 22`.
    static ref HTTP_RETRYABLE_STATUS: Option<Regex> = Regex::new(
        r"(?i)(?:\bhttp(?:/[\d.]+)?|returned error:?|status(?: code)?:?)\s*(?:429|5\d\d)\b"
    )
    .ok();
}

/// Classify an error signal.
pub fn classify(signal: &ErrorSignal<'_>) -> ErrorClass {
    match signal {
        ErrorSignal::Output { output, .. } => classify_text(output),
        ErrorSignal::Text(text) => classify_text(text),
        ErrorSignal::Io(err) => classify_io(err),
    }
}

/// Classify a message by the transient patterns.
pub fn classify_text(text: &str) -> ErrorClass {
    let lower = text.to_lowercase();
    if TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p)) {
        return ErrorClass::Transient;
    }

    let retryable_status = HTTP_RETRYABLE_STATUS
        .as_ref()
        .is_some_and(|re| re.is_match(text));
    if retryable_status {
        ErrorClass::Transient
    } else {
        ErrorClass::Fatal
    }
}

/// Classify an I/O error by kind, then by message.
pub fn classify_io(err: &io::Error) -> ErrorClass {
    match err.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::TimedOut
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable => ErrorClass::Transient,
        _ => classify_text(&err.to_string()),
    }
}
