#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more thresholds failed.
    ThresholdsFailed = 11,

    /// Invalid CLI/plan input (bad flags, unreadable plan, invalid durations, thresholds, templates).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, worker panics).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_verdict(verdict: &flock_core::Verdict) -> Self {
        if verdict.is_pass() {
            Self::Success
        } else {
            Self::ThresholdsFailed
        }
    }
}
