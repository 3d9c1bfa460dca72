//! Probe scheduling: racing candidate configurations against the oracle.
//!
//! The engine hands the scheduler an ordered list of candidate probes; the
//! scheduler answers with the *first* probe, in candidate order, whose
//! verdict is interesting. Sequential mode simply walks the list. Parallel
//! mode dispatches up to `jobs` probes concurrently while preserving the
//! same answer.
//!
//! # Order-deterministic winner
//!
//! Verdicts can arrive in any order, but the race must be reproducible and
//! must match the sequential reduction path. The rule: when an interesting
//! verdict arrives for the probe at index `w`, every running probe with an
//! index above `w` is cancelled (it can no longer win) and every probe below
//! `w` is awaited. If one of those also turns out interesting it becomes
//! the new candidate winner and the rule applies again. The reported winner
//! is therefore always the lowest-index interesting probe, for any
//! concurrency level and any deterministic oracle.
//!
//! # Cache discipline
//!
//! The coordinator performs every cache lookup and insert itself; workers
//! only ever run the oracle. A cached verdict resolves a probe without
//! consuming budget, cancelled probes publish nothing, and once the race
//! resolves no further entry is written.

use crate::cache::OutcomeCache;
use crate::config::Configuration;
use crate::limit::{ReductionLimit, StopReason};
use crate::outcome::Outcome;
use crate::tester::{CancelToken, Oracle};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{debug, warn};

// ============================================================================
// Probe identity
// ============================================================================

/// What a probe tests relative to the current chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    /// The initial interestingness check of the unreduced input.
    Check,
    /// A single chunk on its own.
    Subset(usize),
    /// Everything except a single chunk.
    Complement(usize),
}

/// Hierarchical probe identifier: the iteration number plus the probe kind.
///
/// The slash-joined rendering (`r3/c5`) names the probe's workspace
/// directory, so ids are unique per probe across a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeId {
    run: u32,
    kind: ProbeKind,
}

impl ProbeId {
    /// Id of the initial interestingness check.
    #[must_use]
    pub const fn check() -> Self {
        Self {
            run: 0,
            kind: ProbeKind::Check,
        }
    }

    /// Id of the subset probe for chunk `chunk` in iteration `run`.
    #[must_use]
    pub const fn subset(run: u32, chunk: usize) -> Self {
        Self {
            run,
            kind: ProbeKind::Subset(chunk),
        }
    }

    /// Id of the complement probe for chunk `chunk` in iteration `run`.
    #[must_use]
    pub const fn complement(run: u32, chunk: usize) -> Self {
        Self {
            run,
            kind: ProbeKind::Complement(chunk),
        }
    }

    /// The probe kind.
    #[must_use]
    pub const fn kind(&self) -> ProbeKind {
        self.kind
    }

    /// Workspace path of this probe relative to the session root.
    #[must_use]
    pub fn rel_path(&self) -> PathBuf {
        let leaf = match self.kind {
            ProbeKind::Check => "check".to_owned(),
            ProbeKind::Subset(chunk) => format!("s{chunk}"),
            ProbeKind::Complement(chunk) => format!("c{chunk}"),
        };
        [format!("r{}", self.run), leaf].iter().collect()
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ProbeKind::Check => write!(f, "r{} / check", self.run),
            ProbeKind::Subset(chunk) => write!(f, "r{} / s{chunk}", self.run),
            ProbeKind::Complement(chunk) => write!(f, "r{} / c{chunk}", self.run),
        }
    }
}

/// One candidate in a race.
#[derive(Debug, Clone)]
pub struct Probe {
    /// Identifier, also naming the probe workspace.
    pub id: ProbeId,
    /// The candidate configuration.
    pub config: Arc<Configuration>,
}

impl Probe {
    /// Wrap a candidate configuration.
    #[must_use]
    pub fn new(id: ProbeId, config: Configuration) -> Self {
        Self {
            id,
            config: Arc::new(config),
        }
    }
}

// ============================================================================
// Race results
// ============================================================================

/// What a race produced.
#[derive(Debug, Default)]
pub struct RaceOutcome {
    /// Index into the candidate list of the lowest interesting probe.
    pub winner: Option<usize>,
    /// Oracle invocations performed (cache hits excluded).
    pub oracle_calls: usize,
    /// Probes resolved from the cache.
    pub cache_hits: usize,
    /// Set when a reduction limit stopped the race before completion.
    pub stopped: Option<StopReason>,
}

// ============================================================================
// Scheduler
// ============================================================================

/// Sequential or parallel probe executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduler {
    /// Evaluate probes one at a time, in candidate order.
    Sequential,
    /// Race up to `jobs` probes concurrently.
    Parallel {
        /// Concurrency bound. Must be at least 1.
        jobs: usize,
    },
}

impl Scheduler {
    /// Evaluate `probes` in candidate order and return the lowest-index
    /// interesting one, consulting and feeding `cache` along the way.
    ///
    /// `limit` is charged once per oracle invocation; when it trips, no
    /// further probes are dispatched, probes already running are awaited,
    /// and the race reports the stop reason.
    #[must_use]
    pub fn race(
        &self,
        probes: &[Probe],
        oracle: &Arc<dyn Oracle>,
        cache: &OutcomeCache,
        limit: Option<&ReductionLimit>,
    ) -> RaceOutcome {
        match *self {
            Self::Sequential => race_sequential(probes, oracle, cache, limit),
            Self::Parallel { jobs } => race_parallel(jobs.max(1), probes, oracle, cache, limit),
        }
    }
}

fn race_sequential(
    probes: &[Probe],
    oracle: &Arc<dyn Oracle>,
    cache: &OutcomeCache,
    limit: Option<&ReductionLimit>,
) -> RaceOutcome {
    let mut out = RaceOutcome::default();

    for (index, probe) in probes.iter().enumerate() {
        if let Some(verdict) = cache.lookup(&probe.config) {
            debug!(probe = %probe.id, %verdict, "cache hit");
            out.cache_hits += 1;
            if verdict.is_interesting() {
                out.winner = Some(index);
                return out;
            }
            continue;
        }

        if let Some(limit) = limit {
            if let Err(reason) = limit.admit() {
                out.stopped = Some(reason);
                return out;
            }
        }

        out.oracle_calls += 1;
        let outcome = oracle.run(&probe.config, &probe.id, &CancelToken::new());
        debug!(probe = %probe.id, %outcome, "tested");
        if let Some(verdict) = outcome.verdict() {
            cache.insert(&probe.config, verdict);
            if verdict.is_interesting() {
                out.winner = Some(index);
                return out;
            }
        }
    }

    out
}

fn race_parallel(
    jobs: usize,
    probes: &[Probe],
    oracle: &Arc<dyn Oracle>,
    cache: &OutcomeCache,
    limit: Option<&ReductionLimit>,
) -> RaceOutcome {
    let mut out = RaceOutcome::default();
    let (tx, rx) = mpsc::channel::<(usize, Outcome)>();

    // Candidate index -> (cancellation flag, worker handle).
    let mut running: HashMap<usize, (CancelToken, thread::JoinHandle<()>)> = HashMap::new();
    // Configurations currently being tested. A later candidate with an
    // identical configuration cannot win (the in-flight one has the lower
    // index and, by determinism, the same verdict), so it is skipped rather
    // than tested twice.
    let mut in_flight: HashMap<Vec<crate::config::Unit>, usize> = HashMap::new();
    let mut next = 0;
    // Lowest candidate index known to be interesting. Once set, nothing new
    // is dispatched: everything above it cannot win and everything below it
    // is already in flight or resolved.
    let mut bound: Option<usize> = None;
    let mut stopped = false;

    loop {
        while bound.is_none() && !stopped && running.len() < jobs && next < probes.len() {
            let probe = &probes[next];

            if let Some(verdict) = cache.lookup(&probe.config) {
                debug!(probe = %probe.id, %verdict, "cache hit");
                out.cache_hits += 1;
                if verdict.is_interesting() {
                    bound = Some(next);
                }
                next += 1;
                continue;
            }

            if in_flight.contains_key(probe.config.units()) {
                debug!(probe = %probe.id, "identical configuration already in flight");
                next += 1;
                continue;
            }

            if let Some(limit) = limit {
                if let Err(reason) = limit.admit() {
                    out.stopped = Some(reason);
                    stopped = true;
                    break;
                }
            }

            out.oracle_calls += 1;
            let token = CancelToken::new();
            let worker_index = next;
            let worker_oracle = Arc::clone(oracle);
            let worker_probe = probe.clone();
            let worker_token = token.clone();
            let worker_tx = tx.clone();
            let handle = thread::Builder::new()
                .name(format!("probe-{worker_index}"))
                .spawn(move || {
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        worker_oracle.run(&worker_probe.config, &worker_probe.id, &worker_token)
                    }))
                    .unwrap_or_else(|_| {
                        warn!(probe = %worker_probe.id, "probe worker crashed; treating as uninteresting");
                        Outcome::Uninteresting
                    });
                    let _ = worker_tx.send((worker_index, outcome));
                })
                .expect("failed to spawn probe worker");
            running.insert(next, (token, handle));
            in_flight.insert(probe.config.units().to_vec(), next);
            next += 1;
        }

        if let Some(winner) = bound {
            for (&index, (token, _)) in &running {
                if index > winner {
                    token.cancel();
                }
            }
        }

        if running.is_empty() && (bound.is_some() || stopped || next >= probes.len()) {
            break;
        }

        let (index, outcome) = rx.recv().expect("probe worker hung up without a verdict");
        if let Some((_, handle)) = running.remove(&index) {
            let _ = handle.join();
        }
        in_flight.remove(probes[index].config.units());
        debug!(probe = %probes[index].id, %outcome, "verdict");

        if let Some(verdict) = outcome.verdict() {
            cache.insert(&probes[index].config, verdict);
            if verdict.is_interesting() && bound.map_or(true, |winner| index < winner) {
                bound = Some(index);
            }
        }
    }

    out.winner = bound;
    out
}
