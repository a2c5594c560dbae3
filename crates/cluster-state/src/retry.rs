//! Bounded retry of conditional-write sequences.

use std::time::Duration;

use crate::error::{ErrorKind, OpResult};

/// How often a read-check-write sequence is re-run after losing a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy. At least one attempt is always made.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// The attempt limit.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `attempt` until it does not report `ConditionFailed`.
    ///
    /// Every other outcome, including `Unavailable`, is returned as is.
    /// Running out of attempts yields `ErrorKind::Conflict`.
    pub(crate) fn run<T>(
        &self,
        operation: &str,
        mut attempt: impl FnMut() -> OpResult<T>,
    ) -> OpResult<T> {
        for n in 1..=self.max_attempts {
            match attempt() {
                Err(ErrorKind::ConditionFailed) => {
                    tracing::debug!(operation, attempt = n, "Lost conditional write race");
                    if n < self.max_attempts && !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff);
                    }
                }
                outcome => return outcome,
            }
        }
        Err(ErrorKind::Conflict(format!(
            "{operation}: state kept changing after {} attempts",
            self.max_attempts
        )))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::ZERO)
    }
}
