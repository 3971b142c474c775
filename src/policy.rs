use std::time::{Duration, Instant};

/// Timeout applied when none is configured, or when zero is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Per-call settings for admin commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminPolicy {
    pub timeout: Duration,
}

impl Default for AdminPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl AdminPolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            self.timeout
        }
    }

    /// Absolute deadline for a call starting now. Computed once per call
    /// and passed unchanged to every blocking read and write.
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.effective_timeout()
    }
}
