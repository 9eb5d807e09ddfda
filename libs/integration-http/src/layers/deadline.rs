use std::time::Duration;

use tokio::time::Instant;

use crate::error::HttpError;

/// Per-call deadline, carried through the stack as a request extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallDeadline {
    at: Instant,
    budget: Duration,
}

impl CallDeadline {
    /// Deadline `budget` from now
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        let now = Instant::now();
        Self {
            at: now.checked_add(budget).unwrap_or(now + crate::config::MAX_BACKOFF),
            budget,
        }
    }

    #[must_use]
    pub fn at(&self) -> Instant {
        self.at
    }

    #[must_use]
    pub fn budget(&self) -> Duration {
        self.budget
    }

    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Whether a wait of `wait` starting now still ends before the deadline.
    #[must_use]
    pub fn admits(&self, wait: Duration) -> bool {
        Instant::now()
            .checked_add(wait)
            .is_some_and(|end| end < self.at)
    }

    /// The error reported when the budget runs out
    #[must_use]
    pub fn exceeded(&self) -> HttpError {
        HttpError::DeadlineExceeded(self.budget)
    }
}
