//! Budgets that bound a reduction run.
//!
//! A [`ReductionLimit`] stops the search once a wall-clock deadline passes
//! or a maximum number of oracle invocations has been spent. Tripping a
//! limit is not a failure: the engine keeps the smallest interesting
//! configuration found so far and reports the reason in its statistics.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::time::{Duration, Instant};

/// Why a reduction stopped before reaching 1-minimality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// The wall-clock deadline expired.
    DeadlineExpired,
    /// The oracle invocation budget ran out.
    TestBudgetExhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeadlineExpired => write!(f, "deadline expired"),
            Self::TestBudgetExhausted => write!(f, "maximum number of tests performed"),
        }
    }
}

/// Deadline and/or test-count budget shared by all probe workers.
#[derive(Debug, Default)]
pub struct ReductionLimit {
    deadline: Option<Instant>,
    tests_left: Option<AtomicIsize>,
}

impl ReductionLimit {
    /// A limit that never trips.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop once `deadline` from now has elapsed.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(Instant::now() + deadline);
        self
    }

    /// Stop after `max_tests` oracle invocations.
    #[must_use]
    pub fn with_max_tests(mut self, max_tests: usize) -> Self {
        self.tests_left = Some(AtomicIsize::new(
            isize::try_from(max_tests).unwrap_or(isize::MAX),
        ));
        self
    }

    /// Claim budget for one oracle invocation.
    ///
    /// # Errors
    ///
    /// Returns the [`StopReason`] once the budget is spent; every later call
    /// fails with the same reason.
    pub fn admit(&self) -> Result<(), StopReason> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(StopReason::DeadlineExpired);
            }
        }
        if let Some(tests_left) = &self.tests_left {
            if tests_left.fetch_sub(1, Ordering::Relaxed) <= 0 {
                return Err(StopReason::TestBudgetExhausted);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_always_admits() {
        let limit = ReductionLimit::new();
        for _ in 0..1000 {
            assert!(limit.admit().is_ok());
        }
    }

    #[test]
    fn test_budget_is_exact() {
        let limit = ReductionLimit::new().with_max_tests(3);
        assert!(limit.admit().is_ok());
        assert!(limit.admit().is_ok());
        assert!(limit.admit().is_ok());
        assert_eq!(limit.admit(), Err(StopReason::TestBudgetExhausted));
        assert_eq!(limit.admit(), Err(StopReason::TestBudgetExhausted));
    }

    #[test]
    fn elapsed_deadline_rejects() {
        let limit = ReductionLimit::new().with_deadline(Duration::ZERO);
        assert_eq!(limit.admit(), Err(StopReason::DeadlineExpired));
    }
}
