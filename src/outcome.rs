//! Test outcomes.
//!
//! [`Verdict`] is the two-valued answer of the oracle and the only thing the
//! outcome cache is allowed to store. [`Outcome`] extends it with
//! [`Outcome::Cancelled`], which exists solely between the scheduler and the
//! oracle adapter: a cancelled probe has no verdict and must leave no trace.

use serde::Serialize;
use std::fmt;

/// Interestingness of a candidate configuration, as decided by the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Verdict {
    /// The candidate still exhibits the property under reduction.
    Interesting,
    /// The candidate lost the property.
    Uninteresting,
}

impl Verdict {
    /// True for [`Verdict::Interesting`].
    #[must_use]
    pub const fn is_interesting(self) -> bool {
        matches!(self, Self::Interesting)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interesting => write!(f, "interesting"),
            Self::Uninteresting => write!(f, "uninteresting"),
        }
    }
}

/// Result of a single probe as observed by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The oracle reported the candidate interesting.
    Interesting,
    /// The oracle reported the candidate uninteresting.
    Uninteresting,
    /// The probe was preempted before the oracle produced an answer.
    Cancelled,
}

impl Outcome {
    /// The cacheable verdict, if the probe ran to completion.
    #[must_use]
    pub const fn verdict(self) -> Option<Verdict> {
        match self {
            Self::Interesting => Some(Verdict::Interesting),
            Self::Uninteresting => Some(Verdict::Uninteresting),
            Self::Cancelled => None,
        }
    }
}

impl From<Verdict> for Outcome {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Interesting => Self::Interesting,
            Verdict::Uninteresting => Self::Uninteresting,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interesting => write!(f, "interesting"),
            Self::Uninteresting => write!(f, "uninteresting"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_has_no_verdict() {
        assert_eq!(Outcome::Interesting.verdict(), Some(Verdict::Interesting));
        assert_eq!(
            Outcome::Uninteresting.verdict(),
            Some(Verdict::Uninteresting)
        );
        assert_eq!(Outcome::Cancelled.verdict(), None);
    }

    #[test]
    fn verdict_round_trips_through_outcome() {
        for verdict in [Verdict::Interesting, Verdict::Uninteresting] {
            assert_eq!(Outcome::from(verdict).verdict(), Some(verdict));
        }
    }
}
