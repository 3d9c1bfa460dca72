//! End-to-end reduction scenarios driven through in-process oracles.

use std::sync::Arc;
use std::time::Duration;
use whittle::{
    Configuration, FnOracle, IndexOrder, Oracle, OutcomeCache, ReduceOptions, Reducer, Scheduler,
    Verdict,
};

fn reducer_with(
    oracle: Arc<dyn Oracle>,
    cache: OutcomeCache,
    scheduler: Scheduler,
    options: ReduceOptions,
) -> Reducer {
    Reducer::new(oracle, Arc::new(cache), scheduler, options).expect("valid options")
}

fn contains_all(config: &Configuration, needed: &[usize]) -> bool {
    needed.iter().all(|u| config.units().contains(u))
}

/// Classic two-defect input: interesting iff units 2 and 5 are both present.
fn zeller_oracle() -> Arc<dyn Oracle> {
    Arc::new(FnOracle::new(|config: &Configuration| {
        if contains_all(config, &[2, 5]) {
            Verdict::Interesting
        } else {
            Verdict::Uninteresting
        }
    }))
}

#[test]
fn zeller_reduces_to_both_defect_units_for_every_strategy() {
    let orders = [IndexOrder::Forward, IndexOrder::Backward];
    let schedulers = [
        Scheduler::Sequential,
        Scheduler::Parallel { jobs: 4 },
    ];

    for subset_order in orders {
        for complement_order in orders {
            for subset_first in [true, false] {
                for combine_loops in [true, false] {
                    for scheduler in schedulers {
                        let options = ReduceOptions {
                            subset_first,
                            combine_loops,
                            subset_order,
                            complement_order,
                            ..ReduceOptions::default()
                        };
                        let reducer = reducer_with(
                            zeller_oracle(),
                            OutcomeCache::config(),
                            scheduler,
                            options.clone(),
                        );
                        let result = reducer.ddmin(Configuration::full(8)).unwrap();
                        assert_eq!(
                            result.config.units(),
                            &[2, 5],
                            "strategy {options:?} / {scheduler:?} found a different minimum"
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn zeller_converges_with_the_subset_loop_skipped() {
    let options = ReduceOptions {
        subset_order: IndexOrder::Skip,
        ..ReduceOptions::default()
    };
    let reducer = reducer_with(
        zeller_oracle(),
        OutcomeCache::config(),
        Scheduler::Sequential,
        options,
    );
    let result = reducer.ddmin(Configuration::full(8)).unwrap();
    assert_eq!(result.config.units(), &[2, 5]);
}

#[test]
fn prefix_sensitive_oracle_keeps_three_units() {
    // Interesting iff at least three units survive and the first one is
    // unit 0. Several 1-minima exist; any of them is acceptable.
    let oracle: Arc<dyn Oracle> = Arc::new(FnOracle::new(|config: &Configuration| {
        if config.len() >= 3 && config.units().first() == Some(&0) {
            Verdict::Interesting
        } else {
            Verdict::Uninteresting
        }
    }));
    let reducer = reducer_with(
        oracle.clone(),
        OutcomeCache::config(),
        Scheduler::Sequential,
        ReduceOptions::default(),
    );

    let result = reducer.ddmin(Configuration::full(8)).unwrap();
    assert_eq!(result.config.len(), 3);
    assert_eq!(result.config.units()[0], 0);

    // 1-minimality: dropping any single unit loses the property.
    for &unit in result.config.units() {
        let smaller: Vec<usize> = result
            .config
            .units()
            .iter()
            .copied()
            .filter(|&u| u != unit)
            .collect();
        let smaller = Configuration::new(smaller);
        assert!(
            !(smaller.len() >= 3 && smaller.units().first() == Some(&0)),
            "result is not 1-minimal: removing {unit} keeps it interesting"
        );
    }
}

#[test]
fn parallel_race_with_skewed_latencies_matches_sequential() {
    // Probes whose first unit is low finish late, inviting the race to
    // report a fast high-index candidate. The winner must still be the
    // lowest-index interesting candidate, and the overall result must be
    // identical to the sequential run.
    fn skewed_oracle() -> Arc<dyn Oracle> {
        Arc::new(FnOracle::new(|config: &Configuration| {
            if let Some(&first) = config.units().first() {
                std::thread::sleep(Duration::from_millis(25 * (first as u64 % 4)));
            }
            if config.units().contains(&4) {
                Verdict::Interesting
            } else {
                Verdict::Uninteresting
            }
        }))
    }

    let sequential = reducer_with(
        skewed_oracle(),
        OutcomeCache::config(),
        Scheduler::Sequential,
        ReduceOptions::default(),
    )
    .ddmin(Configuration::full(16))
    .unwrap();

    let parallel = reducer_with(
        skewed_oracle(),
        OutcomeCache::config(),
        Scheduler::Parallel { jobs: 8 },
        ReduceOptions::default(),
    )
    .ddmin(Configuration::full(16))
    .unwrap();

    assert_eq!(sequential.config.units(), &[4]);
    assert_eq!(parallel.config.units(), sequential.config.units());
}

#[test]
fn content_cache_deduplicates_identical_renderings() {
    // Four identical atoms; every configuration of equal size renders to
    // the same bytes. The oracle is content-deterministic: interesting iff
    // at least two atoms survive.
    fn size_oracle() -> Arc<FnOracle<impl Fn(&Configuration) -> Verdict + Send + Sync>> {
        Arc::new(FnOracle::new(|config: &Configuration| {
            if config.len() >= 2 {
                Verdict::Interesting
            } else {
                Verdict::Uninteresting
            }
        }))
    }

    let atoms = Arc::new(vec!["x".to_owned(); 4]);
    let builder = Arc::new(whittle::ConcatTestBuilder::new(Arc::clone(&atoms)));

    let content_oracle = size_oracle();
    let content_run = Reducer::new(
        content_oracle.clone(),
        Arc::new(OutcomeCache::content(builder)),
        Scheduler::Sequential,
        ReduceOptions::default(),
    )
    .unwrap()
    .ddmin(Configuration::full(4))
    .unwrap();

    let config_oracle = size_oracle();
    let config_run = Reducer::new(
        config_oracle.clone(),
        Arc::new(OutcomeCache::config()),
        Scheduler::Sequential,
        ReduceOptions::default(),
    )
    .unwrap()
    .ddmin(Configuration::full(4))
    .unwrap();

    assert_eq!(content_run.config.len(), 2);
    assert_eq!(config_run.config.len(), 2);

    // Distinct unit sets with identical content share one oracle call under
    // content keying, so the content run needs strictly fewer calls.
    assert_eq!(content_oracle.calls(), 3);
    assert_eq!(config_oracle.calls(), 4);
}

#[test]
fn a_shared_cache_makes_a_replay_run_nearly_free() {
    let cache = Arc::new(OutcomeCache::config());
    let first_oracle = Arc::new(FnOracle::new(|config: &Configuration| {
        if contains_all(config, &[2, 5]) {
            Verdict::Interesting
        } else {
            Verdict::Uninteresting
        }
    }));

    let first = Reducer::new(
        first_oracle.clone(),
        Arc::clone(&cache),
        Scheduler::Sequential,
        ReduceOptions::default(),
    )
    .unwrap()
    .ddmin(Configuration::full(8))
    .unwrap();
    assert!(first.stats.oracle_calls > 1);

    // Same oracle, same cache: every probe of the replay is a cache hit.
    // Only the up-front interestingness check runs again.
    let second = Reducer::new(
        first_oracle,
        cache,
        Scheduler::Sequential,
        ReduceOptions::default(),
    )
    .unwrap()
    .ddmin(Configuration::full(8))
    .unwrap();
    assert_eq!(second.config.units(), first.config.units());
    assert_eq!(second.stats.oracle_calls, 1);
    assert!(second.stats.cache_hits > 0);
}

#[test]
fn reduction_shrinks_monotonically() {
    // Record every adopted configuration size via an oracle that tracks the
    // largest interesting candidate it has blessed after the initial check.
    let oracle: Arc<dyn Oracle> = Arc::new(FnOracle::new(|config: &Configuration| {
        if contains_all(config, &[1, 6]) {
            Verdict::Interesting
        } else {
            Verdict::Uninteresting
        }
    }));
    let reducer = reducer_with(
        oracle,
        OutcomeCache::config(),
        Scheduler::Parallel { jobs: 2 },
        ReduceOptions::default(),
    );
    let result = reducer.ddmin(Configuration::full(12)).unwrap();
    assert!(result.stats.final_units <= result.stats.initial_units);
    assert_eq!(result.config.units(), &[1, 6]);
}
