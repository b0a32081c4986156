use std::sync::Arc;
use std::time::{Duration, Instant};

use flock_http::HttpTransportErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// A response arrived with this status.
    Status(u16),
    /// The request failed before a response arrived.
    Transport(HttpTransportErrorKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: Arc<str>,
    pub passed: bool,
}

/// Result of one executed request step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub step: Arc<str>,
    pub kind: OutcomeKind,
    pub started_at: Instant,
    pub finished_at: Instant,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub checks: Vec<CheckResult>,
}

impl RequestOutcome {
    /// `None` when the finish instant precedes the start instant.
    pub fn latency(&self) -> Option<Duration> {
        self.finished_at.checked_duration_since(self.started_at)
    }

    pub fn status(&self) -> Option<u16> {
        match self.kind {
            OutcomeKind::Status(s) => Some(s),
            OutcomeKind::Transport(_) => None,
        }
    }

    pub fn transport_error(&self) -> Option<HttpTransportErrorKind> {
        match self.kind {
            OutcomeKind::Status(_) => None,
            OutcomeKind::Transport(kind) => Some(kind),
        }
    }

    /// Transport failures and statuses >= 400.
    pub fn is_error(&self) -> bool {
        match self.kind {
            OutcomeKind::Status(s) => s >= 400,
            OutcomeKind::Transport(_) => true,
        }
    }
}
