//! Chunk index orderings for the reduction loops.
//!
//! The engine enumerates subset and complement candidates in a configurable
//! order before handing them to the scheduler. The scheduler itself is
//! oblivious to the strategy; it only sees the final candidate list.

use std::str::FromStr;

/// Order in which chunk indices are probed within one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexOrder {
    /// `0, 1, .., n-1`.
    #[default]
    Forward,
    /// `n-1, n-2, .., 0`.
    Backward,
    /// No indices at all. The corresponding loop is bypassed.
    Skip,
}

impl IndexOrder {
    /// The probe order for `n` chunks.
    #[must_use]
    pub fn indices(self, n: usize) -> Vec<usize> {
        match self {
            Self::Forward => (0..n).collect(),
            Self::Backward => (0..n).rev().collect(),
            Self::Skip => Vec::new(),
        }
    }

    /// True if this order never yields an index.
    #[must_use]
    pub const fn is_skip(self) -> bool {
        matches!(self, Self::Skip)
    }
}

impl FromStr for IndexOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "forward" => Ok(Self::Forward),
            "backward" => Ok(Self::Backward),
            "skip" => Ok(Self::Skip),
            other => Err(format!(
                "unknown iteration order '{other}'; valid orders: forward, backward, skip"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_counts_up() {
        assert_eq!(IndexOrder::Forward.indices(4), vec![0, 1, 2, 3]);
    }

    #[test]
    fn backward_counts_down() {
        assert_eq!(IndexOrder::Backward.indices(4), vec![3, 2, 1, 0]);
    }

    #[test]
    fn skip_yields_nothing() {
        assert!(IndexOrder::Skip.indices(4).is_empty());
        assert!(IndexOrder::Skip.is_skip());
    }

    #[test]
    fn parses_known_names() {
        assert_eq!("forward".parse::<IndexOrder>().unwrap(), IndexOrder::Forward);
        assert_eq!(
            "BACKWARD".parse::<IndexOrder>().unwrap(),
            IndexOrder::Backward
        );
        assert_eq!("skip".parse::<IndexOrder>().unwrap(), IndexOrder::Skip);
        assert!("random".parse::<IndexOrder>().is_err());
    }
}
