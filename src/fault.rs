//! Structured failure records.
//!
//! Every fault caught at an event-handler boundary is funnelled through a
//! single [`FaultSink`] so that one connection's failure never takes down
//! the accept loop or other sessions. An early client disconnect is normal
//! teardown, not a fault, and never reaches the sink.

use std::fmt;
use std::panic::Location;

/// How loudly a fault should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warn,
    Error,
}

/// What went wrong, independent of how it is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// First packet did not parse as an HTTP request with a usable Host.
    MalformedRequest,
    /// Upstream connect timed out or was refused.
    UpstreamConnectFailure,
    /// An established upstream socket failed mid-relay.
    UpstreamRuntimeError,
}

/// A single caught fault: message, origin in the source, severity.
#[derive(Debug, Clone)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    pub origin: &'static Location<'static>,
    pub severity: Severity,
}

impl Fault {
    #[track_caller]
    pub fn malformed_request(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::MalformedRequest,
            message: message.into(),
            origin: Location::caller(),
            severity: Severity::Warn,
        }
    }

    #[track_caller]
    pub fn upstream_connect(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::UpstreamConnectFailure,
            message: message.into(),
            origin: Location::caller(),
            severity: Severity::Error,
        }
    }

    #[track_caller]
    pub fn upstream_runtime(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::UpstreamRuntimeError,
            message: message.into(),
            origin: Location::caller(),
            severity: Severity::Error,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:?}] {} [{}:{}]",
            self.kind,
            self.message,
            self.origin.file(),
            self.origin.line()
        )
    }
}

/// Destination for fault records. Implementations must not panic;
/// recording happens inside event handlers.
pub trait FaultSink: Send + Sync {
    fn record(&self, fault: Fault);
}

/// Production sink backed by the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl FaultSink for LogSink {
    fn record(&self, fault: Fault) {
        match fault.severity {
            Severity::Warn => {
                tracing::warn!(kind = ?fault.kind, origin = %fault.origin, "{}", fault.message)
            }
            Severity::Error => {
                tracing::error!(kind = ?fault.kind, origin = %fault.origin, "{}", fault.message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_message_and_origin() {
        let fault = Fault::malformed_request("first line unparseable");
        let text = fault.to_string();

        assert!(text.contains("MalformedRequest"));
        assert!(text.contains("first line unparseable"));
        assert!(text.contains("fault.rs"));
    }
}
