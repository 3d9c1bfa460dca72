//! Outcome caching across the whole search.
//!
//! Every verdict the oracle produces is remembered so that no configuration
//! is ever tested twice, and so that one worker's answer spares all others.
//! A single cache value is shared by every probe worker; lookups and inserts
//! are safe from any thread.
//!
//! Two keying schemes are supported:
//!
//! - **Config keying** hashes the unit sequence itself. Cheap, and exact by
//!   construction.
//! - **Content keying** digests the serialised candidate, the same bytes the
//!   oracle would see. Distinct unit sets that render to identical content
//!   share one entry, at the cost of serialising on every lookup.
//!
//! Entries are monotone. The oracle is required to be deterministic, so a
//! key is only ever associated with one verdict; an insert that contradicts
//! an existing entry is logged and ignored, and the first verdict stands.

use crate::config::{Configuration, Unit};
use crate::outcome::Verdict;
use crate::tester::ConcatTestBuilder;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

type ContentKey = [u8; 32];

/// Memoises oracle verdicts for previously seen candidates.
pub enum OutcomeCache {
    /// Caching disabled. Lookups always miss, inserts are dropped.
    Disabled,
    /// Keyed by the unit sequence of the candidate.
    Config(Mutex<HashMap<Box<[Unit]>, Verdict>>),
    /// Keyed by a digest of the serialised candidate.
    Content {
        builder: Arc<ConcatTestBuilder>,
        entries: Mutex<HashMap<ContentKey, Verdict>>,
    },
}

impl OutcomeCache {
    /// A cache that never hits.
    #[must_use]
    pub fn disabled() -> Self {
        Self::Disabled
    }

    /// Config-identity keying.
    #[must_use]
    pub fn config() -> Self {
        Self::Config(Mutex::new(HashMap::new()))
    }

    /// Content keying. `builder` must be the same serialiser the oracle
    /// uses, otherwise hits and misses would not line up with what the
    /// tester actually observed.
    #[must_use]
    pub fn content(builder: Arc<ConcatTestBuilder>) -> Self {
        Self::Content {
            builder,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up the verdict of a previously tested configuration.
    #[must_use]
    pub fn lookup(&self, config: &Configuration) -> Option<Verdict> {
        match self {
            Self::Disabled => None,
            Self::Config(entries) => entries.lock().get(config.units()).copied(),
            Self::Content { builder, entries } => entries
                .lock()
                .get(&content_key(builder, config))
                .copied(),
        }
    }

    /// Record a verdict. Idempotent; a contradicting verdict for a key that
    /// is already present is dropped with a warning, since it can only mean
    /// the oracle is not deterministic.
    pub fn insert(&self, config: &Configuration, verdict: Verdict) {
        match self {
            Self::Disabled => {}
            Self::Config(entries) => {
                let mut entries = entries.lock();
                let prior = entries
                    .entry(config.units().to_vec().into_boxed_slice())
                    .or_insert(verdict);
                if *prior != verdict {
                    warn!(config = %config, prior = %prior, later = %verdict,
                        "oracle returned contradicting verdicts; keeping the first");
                }
            }
            Self::Content { builder, entries } => {
                let key = content_key(builder, config);
                let mut entries = entries.lock();
                let prior = entries.entry(key).or_insert(verdict);
                if *prior != verdict {
                    warn!(config = %config, prior = %prior, later = %verdict,
                        "oracle returned contradicting verdicts; keeping the first");
                }
            }
        }
    }

    /// Number of distinct keys stored.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Disabled => 0,
            Self::Config(entries) => entries.lock().len(),
            Self::Content { entries, .. } => entries.lock().len(),
        }
    }

    /// True if nothing has been cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn content_key(builder: &ConcatTestBuilder, config: &Configuration) -> ContentKey {
    let mut hasher = Sha256::new();
    hasher.update(builder.build(config).as_bytes());
    hasher.finalize().into()
}
