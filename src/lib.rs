//! Whittle: a parallel minimising delta-debugging test case reducer.
//!
//! Given an input split into atomic units (lines, characters, or any
//! caller-supplied tokens) and an oracle that decides whether a candidate
//! sub-sequence is still *interesting* (reproduces a crash, trips an
//! assertion), whittle shrinks the input to a 1-minimal witness: removing
//! any single remaining unit makes it uninteresting.
//!
//! # Architecture
//!
//! - [`reduce::Reducer`] runs the minimisation loop: split the working
//!   configuration into chunks, probe subsets and complements, escalate
//!   granularity on a miss, stop at 1-minimality.
//! - [`scheduler::Scheduler`] evaluates each iteration's candidate list,
//!   sequentially or as a parallel race whose winner is always the
//!   lowest-index interesting candidate, so parallel runs reproduce the
//!   sequential reduction path.
//! - [`cache::OutcomeCache`] shares every verdict across all workers, keyed
//!   by configuration identity or candidate content.
//! - [`tester::SubprocessTest`] adapts an external tester executable: exit
//!   code 0 marks a candidate interesting.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use whittle::{
//!     Configuration, FnOracle, OutcomeCache, ReduceOptions, Reducer, Scheduler, Verdict,
//! };
//!
//! // Interesting iff units 3 and 6 are both present.
//! let oracle = Arc::new(FnOracle::new(|config: &Configuration| {
//!     if [3, 6].iter().all(|u| config.units().contains(u)) {
//!         Verdict::Interesting
//!     } else {
//!         Verdict::Uninteresting
//!     }
//! }));
//!
//! let reducer = Reducer::new(
//!     oracle,
//!     Arc::new(OutcomeCache::config()),
//!     Scheduler::Sequential,
//!     ReduceOptions::default(),
//! )
//! .unwrap();
//!
//! let result = reducer.ddmin(Configuration::full(8)).unwrap();
//! assert_eq!(result.config.units(), &[3, 6]);
//! ```

pub mod atoms;
pub mod cache;
pub mod config;
pub mod error;
pub mod limit;
pub mod order;
pub mod outcome;
pub mod reduce;
pub mod scheduler;
pub mod tester;

pub use atoms::{split_atoms, Atom};
pub use cache::OutcomeCache;
pub use config::{Configuration, Unit};
pub use error::ReduceError;
pub use limit::{ReductionLimit, StopReason};
pub use order::IndexOrder;
pub use outcome::{Outcome, Verdict};
pub use reduce::{ReduceOptions, ReduceStats, Reducer, Reduction};
pub use scheduler::{Probe, ProbeId, ProbeKind, Scheduler};
pub use tester::{
    CancelToken, CleanupPolicy, ConcatTestBuilder, FnOracle, Oracle, SubprocessTest,
};
