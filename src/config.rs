//! Unit configurations and chunk arithmetic.
//!
//! A [`Configuration`] is an ordered sub-sequence of the original input's
//! atomic units, identified by their positions in the input. All reduction
//! state is expressed in these index sequences; the actual test content is
//! only materialised when a candidate is handed to the oracle.

use std::fmt;

/// Opaque unit identifier. The position of the atom in the original input.
pub type Unit = usize;

/// An ordered, duplicate-free sub-sequence of the input units.
///
/// Configurations are immutable once built. The unit order always matches
/// the order of the original input, so set operations reduce to ordered
/// merges and filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Configuration {
    units: Vec<Unit>,
}

impl Configuration {
    /// Wrap an ordered unit sequence.
    #[must_use]
    pub fn new(units: Vec<Unit>) -> Self {
        debug_assert!(units.windows(2).all(|w| w[0] < w[1]), "units out of order");
        Self { units }
    }

    /// The full universe `0..len`.
    #[must_use]
    pub fn full(len: usize) -> Self {
        Self {
            units: (0..len).collect(),
        }
    }

    /// The empty configuration.
    #[must_use]
    pub fn empty() -> Self {
        Self { units: Vec::new() }
    }

    /// The units of this configuration, in input order.
    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// True if no units remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Partition into `n` contiguous non-empty chunks.
    ///
    /// The split is balanced: each chunk gets `len / n` units and the first
    /// `len % n` chunks get one extra. Given the same configuration and `n`
    /// the partition is always the same.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero or greater than the number of units.
    #[must_use]
    pub fn split(&self, n: usize) -> Vec<Configuration> {
        assert!(n >= 1 && n <= self.units.len(), "split arity out of range");

        let base = self.units.len() / n;
        let extra = self.units.len() % n;

        let mut chunks = Vec::with_capacity(n);
        let mut start = 0;
        for i in 0..n {
            let size = base + usize::from(i < extra);
            chunks.push(Self::new(self.units[start..start + size].to_vec()));
            start += size;
        }
        chunks
    }

    /// Everything except the chunk at `skip`. Chunk order is preserved, so
    /// the result is again a valid configuration.
    #[must_use]
    pub fn complement_of(chunks: &[Configuration], skip: usize) -> Configuration {
        let units = chunks
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != skip)
            .flat_map(|(_, chunk)| chunk.units.iter().copied())
            .collect();
        Self { units }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, unit) in self.units.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{unit}")?;
        }
        write!(f, "]")
    }
}

/// Next granularity after a fruitless iteration: `min(factor * n, len)`.
#[must_use]
pub fn increase_granularity(n: usize, len: usize, factor: usize) -> usize {
    (factor * n).min(len)
}
