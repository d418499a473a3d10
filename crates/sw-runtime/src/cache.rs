//! Shared step-level memoization.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use sw_types::{CrossValidationScore, Fingerprint, NamedValues};

use crate::primitive::StepPrimitive;

/// One memoized step execution: training-time outputs, shared fitted
/// state, and any cross-validation scores computed at fit time.
#[derive(Clone)]
pub struct CachedStep {
    pub outputs: NamedValues,
    pub state: Arc<dyn StepPrimitive>,
    pub cross_validation: Vec<CrossValidationScore>,
}

/// Hit/miss/store counters.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

/// Fingerprint-keyed cache of fitted steps, shared by every worker in a
/// search invocation.
///
/// Entries are derived deterministically from their keys, so concurrent
/// inserts for the same fingerprint may both succeed; last write wins and
/// both values are equal under the fingerprint contract. Lookups and
/// inserts for different fingerprints never interfere.
pub struct StepCache {
    entries: DashMap<Fingerprint, CachedStep>,
    stats: RwLock<CacheStats>,
}

impl StepCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<CachedStep> {
        let entry = self.entries.get(fingerprint).map(|e| e.clone());
        let mut stats = self.stats.write();
        if entry.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        entry
    }

    pub fn insert(&self, fingerprint: Fingerprint, entry: CachedStep) {
        self.entries.insert(fingerprint, entry);
        self.stats.write().stores += 1;
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
        *self.stats.write() = CacheStats::default();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }
}

impl Default for StepCache {
    fn default() -> Self {
        Self::new()
    }
}
