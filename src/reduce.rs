//! The minimising delta-debugging engine.
//!
//! Shrinks an interesting configuration to a 1-minimal one: removing any
//! single unit of the result makes it uninteresting.
//!
//! # Algorithm
//!
//! 1. Partition the working configuration into `n` contiguous chunks.
//! 2. Race the subset candidates (each chunk alone). A winner becomes the
//!    new working configuration and granularity restarts at 2.
//! 3. Otherwise race the complement candidates (the configuration minus one
//!    chunk). A winner removes that chunk and coarsens granularity by one
//!    factor step.
//! 4. If neither loop wins, multiply `n` by the split factor and try again;
//!    once the finest split finds nothing removable, the configuration is
//!    1-minimal.
//!
//! The subset and complement loops can be swapped or merged into a single
//! combined race. After a complement win the next iteration's complement
//! loop starts at the chunk that followed the removed one, so consecutive
//! removals of neighbouring chunks stay cheap.
//!
//! Every configuration the engine adopts was just verified interesting, so
//! interestingness is an invariant of the working configuration from the
//! initial check to the returned result.

use crate::cache::OutcomeCache;
use crate::config::{increase_granularity, Configuration};
use crate::error::ReduceError;
use crate::limit::{ReductionLimit, StopReason};
use crate::order::IndexOrder;
use crate::outcome::Verdict;
use crate::scheduler::{Probe, ProbeId, ProbeKind, Scheduler};
use crate::tester::{CancelToken, Oracle};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

// ============================================================================
// Options
// ============================================================================

/// Tuning knobs of the reduction loop.
#[derive(Debug, Clone)]
pub struct ReduceOptions {
    /// Probe subsets before complements. Swapped by `--complement-first`.
    pub subset_first: bool,
    /// Merge both loops into a single race per iteration.
    pub combine_loops: bool,
    /// Probe order within the subset loop.
    pub subset_order: IndexOrder,
    /// Probe order within the complement loop.
    pub complement_order: IndexOrder,
    /// Granularity multiplier used for splitting and escalation.
    pub split_factor: usize,
    /// Number of chunks the first iteration splits into.
    pub initial_granularity: usize,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            subset_first: true,
            combine_loops: false,
            subset_order: IndexOrder::Forward,
            complement_order: IndexOrder::Forward,
            split_factor: 2,
            initial_granularity: 2,
        }
    }
}

impl ReduceOptions {
    /// Reject option combinations under which the engine cannot make
    /// progress.
    ///
    /// # Errors
    ///
    /// Returns [`ReduceError::InvalidOptions`] for a split factor or initial
    /// granularity below 2, or when both loops are skipped (no probe would
    /// ever run).
    pub fn validate(&self) -> Result<(), ReduceError> {
        if self.split_factor < 2 {
            return Err(ReduceError::InvalidOptions(format!(
                "split factor must be at least 2, got {}",
                self.split_factor
            )));
        }
        if self.initial_granularity < 2 {
            return Err(ReduceError::InvalidOptions(format!(
                "initial granularity must be at least 2, got {}",
                self.initial_granularity
            )));
        }
        if self.subset_order.is_skip() && self.complement_order.is_skip() {
            return Err(ReduceError::InvalidOptions(
                "both the subset and the complement loop are skipped; no probes would ever run"
                    .to_owned(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Results
// ============================================================================

/// Counters describing a finished reduction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReduceStats {
    /// Outer iterations performed.
    pub runs: usize,
    /// Candidate probes enumerated across all races.
    pub candidates: usize,
    /// Oracle invocations, including the initial check.
    pub oracle_calls: usize,
    /// Probes resolved from the outcome cache.
    pub cache_hits: usize,
    /// Unit count of the initial configuration.
    pub initial_units: usize,
    /// Unit count of the result.
    pub final_units: usize,
    /// Set when a reduction limit ended the run before 1-minimality.
    pub stopped: Option<StopReason>,
}

impl fmt::Display for ReduceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} units in {} runs ({} oracle calls, {} cache hits)",
            self.initial_units, self.final_units, self.runs, self.oracle_calls, self.cache_hits,
        )?;
        if let Some(reason) = self.stopped {
            write!(f, "; stopped early: {reason}")?;
        }
        Ok(())
    }
}

/// A finished reduction: the smallest interesting configuration found plus
/// the counters that produced it.
#[derive(Debug)]
pub struct Reduction {
    /// The reduced configuration. 1-minimal unless the run stopped early or
    /// a loop was skipped.
    pub config: Configuration,
    /// Run statistics.
    pub stats: ReduceStats,
}

enum Win {
    Subset(usize),
    Complement(usize),
}

// ============================================================================
// Engine
// ============================================================================

/// The reduction engine. Owns the oracle, the shared outcome cache, and the
/// probe scheduler; `ddmin` drives them until the working configuration is
/// 1-minimal.
pub struct Reducer {
    oracle: Arc<dyn Oracle>,
    cache: Arc<OutcomeCache>,
    scheduler: Scheduler,
    options: ReduceOptions,
    limit: Option<ReductionLimit>,
}

impl Reducer {
    /// Assemble an engine, validating `options`.
    ///
    /// # Errors
    ///
    /// Returns [`ReduceError::InvalidOptions`] if the options are rejected.
    pub fn new(
        oracle: Arc<dyn Oracle>,
        cache: Arc<OutcomeCache>,
        scheduler: Scheduler,
        options: ReduceOptions,
    ) -> Result<Self, ReduceError> {
        options.validate()?;
        Ok(Self {
            oracle,
            cache,
            scheduler,
            options,
            limit: None,
        })
    }

    /// Bound the run with a deadline and/or test budget.
    #[must_use]
    pub fn with_limit(mut self, limit: ReductionLimit) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reduce `initial` to a 1-minimal interesting configuration.
    ///
    /// # Errors
    ///
    /// - [`ReduceError::EmptyInput`] if `initial` has no units.
    /// - [`ReduceError::InitialUninteresting`] if the oracle rejects the
    ///   unreduced input.
    pub fn ddmin(&self, initial: Configuration) -> Result<Reduction, ReduceError> {
        if initial.is_empty() {
            return Err(ReduceError::EmptyInput);
        }

        let mut stats = ReduceStats {
            initial_units: initial.len(),
            ..ReduceStats::default()
        };

        // One up-front oracle call establishes the precondition every later
        // step relies on.
        stats.oracle_calls += 1;
        let check = ProbeId::check();
        let outcome = self.oracle.run(&initial, &check, &CancelToken::new());
        match outcome.verdict() {
            Some(Verdict::Interesting) => self.cache.insert(&initial, Verdict::Interesting),
            _ => return Err(ReduceError::InitialUninteresting),
        }
        self.oracle.promote(&check);

        if initial.len() < 2 {
            info!("test case is minimal already");
            stats.final_units = initial.len();
            return Ok(Reduction {
                config: initial,
                stats,
            });
        }

        let mut config = initial;
        let mut granularity = self.options.initial_granularity;
        let mut offset = 0usize;
        let mut run: u32 = 1;

        loop {
            stats.runs += 1;
            let n = granularity.min(config.len()).max(1);
            let chunks = config.split(n);
            info!(run, "trying {}", chunk_sizes(&chunks));

            let (winner, stopped) = self.run_phases(run, &chunks, offset, &mut stats);

            match winner {
                Some(Win::Subset(chunk)) => {
                    config = chunks[chunk].clone();
                    info!(run, units = config.len(), "reduced to subset");
                    debug!(config = %config, "new configuration");
                    granularity = 2;
                    offset = 0;
                }
                Some(Win::Complement(chunk)) => {
                    config = Configuration::complement_of(&chunks, chunk);
                    info!(run, units = config.len(), "reduced to complement");
                    debug!(config = %config, "new configuration");
                    granularity = (n + 1).saturating_sub(self.options.split_factor).max(2);
                    // Next iteration starts removing at the chunk that
                    // followed the one just removed.
                    offset = chunk;
                }
                None => {
                    if stopped.is_none() {
                        if n >= config.len() {
                            info!("done");
                            break;
                        }
                        let next = increase_granularity(n, config.len(), self.options.split_factor);
                        offset = offset * next / n;
                        granularity = next;
                        info!(granularity = next, "increasing granularity");
                    }
                }
            }

            if let Some(reason) = stopped {
                info!(%reason, "reduction stopped early");
                stats.stopped = Some(reason);
                break;
            }
            if config.is_empty() {
                info!("done");
                break;
            }
            run += 1;
        }

        stats.final_units = config.len();
        Ok(Reduction { config, stats })
    }

    fn run_phases(
        &self,
        run: u32,
        chunks: &[Configuration],
        offset: usize,
        stats: &mut ReduceStats,
    ) -> (Option<Win>, Option<StopReason>) {
        if self.options.combine_loops {
            let subsets = self.subset_probes(run, chunks);
            let complements = self.complement_probes(run, chunks, offset);
            let mut probes = Vec::with_capacity(subsets.len() + complements.len());
            if self.options.subset_first {
                probes.extend(subsets);
                probes.extend(complements);
            } else {
                probes.extend(complements);
                probes.extend(subsets);
            }
            return self.race(&probes, stats);
        }

        let order = if self.options.subset_first {
            [true, false]
        } else {
            [false, true]
        };
        for subset_phase in order {
            let probes = if subset_phase {
                self.subset_probes(run, chunks)
            } else {
                self.complement_probes(run, chunks, offset)
            };
            let (win, stopped) = self.race(&probes, stats);
            if win.is_some() || stopped.is_some() {
                return (win, stopped);
            }
        }
        (None, None)
    }

    fn race(&self, probes: &[Probe], stats: &mut ReduceStats) -> (Option<Win>, Option<StopReason>) {
        if probes.is_empty() {
            return (None, None);
        }
        stats.candidates += probes.len();
        let out = self
            .scheduler
            .race(probes, &self.oracle, &self.cache, self.limit.as_ref());
        stats.oracle_calls += out.oracle_calls;
        stats.cache_hits += out.cache_hits;

        let win = out.winner.map(|index| {
            let probe = &probes[index];
            self.oracle.promote(&probe.id);
            match probe.id.kind() {
                ProbeKind::Subset(chunk) => Win::Subset(chunk),
                ProbeKind::Complement(chunk) => Win::Complement(chunk),
                ProbeKind::Check => unreachable!("check probes are never raced"),
            }
        });
        (win, out.stopped)
    }

    fn subset_probes(&self, run: u32, chunks: &[Configuration]) -> Vec<Probe> {
        if chunks.len() < 2 {
            // The only chunk is the whole working configuration;
            // re-testing it cannot reduce anything.
            return Vec::new();
        }
        self.options
            .subset_order
            .indices(chunks.len())
            .into_iter()
            .map(|i| Probe::new(ProbeId::subset(run, i), chunks[i].clone()))
            .collect()
    }

    fn complement_probes(&self, run: u32, chunks: &[Configuration], offset: usize) -> Vec<Probe> {
        let n = chunks.len();
        self.options
            .complement_order
            .indices(n)
            .into_iter()
            .map(|j| {
                let i = (j + offset) % n;
                Probe::new(
                    ProbeId::complement(run, i),
                    Configuration::complement_of(chunks, i),
                )
            })
            .collect()
    }
}

fn chunk_sizes(chunks: &[Configuration]) -> String {
    chunks
        .iter()
        .map(|c| c.len().to_string())
        .collect::<Vec<_>>()
        .join(" + ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tester::FnOracle;

    fn reducer(
        oracle: Arc<dyn Oracle>,
        scheduler: Scheduler,
        options: ReduceOptions,
    ) -> Reducer {
        Reducer::new(oracle, Arc::new(OutcomeCache::config()), scheduler, options)
            .expect("valid options")
    }

    fn contains_all(config: &Configuration, needed: &[usize]) -> bool {
        needed.iter().all(|u| config.units().contains(u))
    }

    #[test]
    fn classic_two_unit_failure_reduces_exactly() {
        // Interesting iff both unit 2 and unit 5 are present.
        let oracle: Arc<dyn Oracle> = Arc::new(FnOracle::new(|config: &Configuration| {
            if contains_all(config, &[2, 5]) {
                Verdict::Interesting
            } else {
                Verdict::Uninteresting
            }
        }));
        let reducer = reducer(oracle, Scheduler::Sequential, ReduceOptions::default());

        let result = reducer.ddmin(Configuration::full(8)).unwrap();
        assert_eq!(result.config.units(), &[2, 5]);
        assert_eq!(result.stats.initial_units, 8);
        assert_eq!(result.stats.final_units, 2);
        assert!(result.stats.stopped.is_none());
    }

    #[test]
    fn always_interesting_input_reduces_to_empty() {
        let oracle: Arc<dyn Oracle> =
            Arc::new(FnOracle::new(|_: &Configuration| Verdict::Interesting));
        let reducer = reducer(oracle, Scheduler::Sequential, ReduceOptions::default());

        let result = reducer.ddmin(Configuration::full(3)).unwrap();
        assert!(result.config.is_empty());
    }

    #[test]
    fn singleton_input_returns_after_the_initial_check() {
        let oracle = Arc::new(FnOracle::new(|_: &Configuration| Verdict::Interesting));
        let dyn_oracle: Arc<dyn Oracle> = oracle.clone();
        let reducer = reducer(dyn_oracle, Scheduler::Sequential, ReduceOptions::default());

        let result = reducer.ddmin(Configuration::full(1)).unwrap();
        assert_eq!(result.config.units(), &[0]);
        assert_eq!(result.stats.oracle_calls, 1);
        assert_eq!(oracle.calls(), 1);
        assert_eq!(result.stats.runs, 0);
    }

    #[test]
    fn uninteresting_input_is_an_error() {
        let oracle: Arc<dyn Oracle> =
            Arc::new(FnOracle::new(|_: &Configuration| Verdict::Uninteresting));
        let reducer = reducer(oracle, Scheduler::Sequential, ReduceOptions::default());

        assert!(matches!(
            reducer.ddmin(Configuration::full(4)),
            Err(ReduceError::InitialUninteresting)
        ));
    }

    #[test]
    fn empty_input_is_an_error() {
        let oracle: Arc<dyn Oracle> =
            Arc::new(FnOracle::new(|_: &Configuration| Verdict::Interesting));
        let reducer = reducer(oracle, Scheduler::Sequential, ReduceOptions::default());

        assert!(matches!(
            reducer.ddmin(Configuration::empty()),
            Err(ReduceError::EmptyInput)
        ));
    }

    #[test]
    fn skipping_both_loops_is_rejected() {
        let oracle: Arc<dyn Oracle> =
            Arc::new(FnOracle::new(|_: &Configuration| Verdict::Interesting));
        let options = ReduceOptions {
            subset_order: IndexOrder::Skip,
            complement_order: IndexOrder::Skip,
            ..ReduceOptions::default()
        };
        assert!(matches!(
            Reducer::new(
                oracle,
                Arc::new(OutcomeCache::config()),
                Scheduler::Sequential,
                options
            ),
            Err(ReduceError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_budget_stops_with_best_so_far() {
        // Only the full input is interesting, so nothing ever reduces and
        // the budget runs out while escalating granularity.
        let oracle: Arc<dyn Oracle> = Arc::new(FnOracle::new(|config: &Configuration| {
            if config.len() == 8 {
                Verdict::Interesting
            } else {
                Verdict::Uninteresting
            }
        }));
        let reducer = reducer(oracle, Scheduler::Sequential, ReduceOptions::default())
            .with_limit(ReductionLimit::new().with_max_tests(3));

        let result = reducer.ddmin(Configuration::full(8)).unwrap();
        assert_eq!(result.stats.stopped, Some(StopReason::TestBudgetExhausted));
        assert_eq!(result.config.len(), 8);
        // The initial check does not consume test budget.
        assert_eq!(result.stats.oracle_calls, 1 + 3);
    }

    #[test]
    fn complement_first_finds_the_same_minimum_here() {
        let oracle: Arc<dyn Oracle> = Arc::new(FnOracle::new(|config: &Configuration| {
            if contains_all(config, &[2, 5]) {
                Verdict::Interesting
            } else {
                Verdict::Uninteresting
            }
        }));
        let options = ReduceOptions {
            subset_first: false,
            ..ReduceOptions::default()
        };
        let reducer = reducer(oracle, Scheduler::Sequential, options);

        let result = reducer.ddmin(Configuration::full(8)).unwrap();
        assert_eq!(result.config.units(), &[2, 5]);
    }

    #[test]
    fn stats_render_a_summary_line() {
        let stats = ReduceStats {
            runs: 3,
            candidates: 12,
            oracle_calls: 9,
            cache_hits: 2,
            initial_units: 8,
            final_units: 2,
            stopped: None,
        };
        assert_eq!(
            stats.to_string(),
            "8 -> 2 units in 3 runs (9 oracle calls, 2 cache hits)"
        );
    }
}
