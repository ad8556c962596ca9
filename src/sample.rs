//! Demonstration sample pool
//!
//! Serves example rows for the `echo-sample` endpoint. The pool is kept
//! disjoint from the held-out evaluation set: rows whose feature vector also
//! appears in the held-out set are dropped when the pool is built.
//!
//! Selection policies:
//! - `round_robin`: walks the pool in file order with an atomic cursor
//! - `random`: uniform draws from a ChaCha stream seeded from config

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::config::{SampleConfig, SamplePolicy};
use crate::error::{StarlingError, StarlingResult};
use crate::model::LabeledRow;
use crate::schema::FeatureVector;

enum Cursor {
    RoundRobin(AtomicUsize),
    Random(Mutex<ChaCha8Rng>),
}

pub struct SampleProvider {
    pool: Vec<LabeledRow>,
    cursor: Cursor,
}

impl std::fmt::Debug for SampleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleProvider")
            .field("pool", &self.pool.len())
            .field("policy", &self.policy())
            .finish()
    }
}

/// Bit-exact identity of a feature vector
fn fingerprint(fv: &FeatureVector) -> Vec<Option<u64>> {
    fv.values().iter().map(|v| v.map(f64::to_bits)).collect()
}

impl SampleProvider {
    /// Build the pool, dropping rows that also occur in `holdout`.
    pub fn new(pool: Vec<LabeledRow>, holdout: &[LabeledRow], config: &SampleConfig) -> Self {
        let held: FxHashSet<Vec<Option<u64>>> =
            holdout.iter().map(|r| fingerprint(&r.features)).collect();

        // an all-missing row would echo a vector predict rejects
        let before = pool.len();
        let pool: Vec<LabeledRow> = pool
            .into_iter()
            .filter(|r| r.features.present_count() > 0)
            .collect();
        if pool.len() < before {
            warn!(
                dropped = before - pool.len(),
                "Dropped sample rows with no feature values"
            );
        }

        let before = pool.len();
        let pool: Vec<LabeledRow> = pool
            .into_iter()
            .filter(|r| !held.contains(&fingerprint(&r.features)))
            .collect();
        if pool.len() < before {
            warn!(
                dropped = before - pool.len(),
                "Dropped sample rows that overlap the held-out set"
            );
        }
        debug!(samples = pool.len(), policy = ?config.policy, "Sample pool ready");

        let cursor = match config.policy {
            SamplePolicy::RoundRobin => Cursor::RoundRobin(AtomicUsize::new(0)),
            SamplePolicy::Random => Cursor::Random(Mutex::new(ChaCha8Rng::seed_from_u64(config.seed))),
        };
        Self { pool, cursor }
    }

    /// Provider with nothing to serve
    pub fn empty() -> Self {
        Self {
            pool: Vec::new(),
            cursor: Cursor::RoundRobin(AtomicUsize::new(0)),
        }
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn policy(&self) -> SamplePolicy {
        match self.cursor {
            Cursor::RoundRobin(_) => SamplePolicy::RoundRobin,
            Cursor::Random(_) => SamplePolicy::Random,
        }
    }

    /// Next row according to the policy; `NoSamples` for an empty pool.
    pub fn next_sample(&self) -> StarlingResult<&LabeledRow> {
        if self.pool.is_empty() {
            return Err(StarlingError::NoSamples);
        }
        let idx = match &self.cursor {
            Cursor::RoundRobin(next) => next.fetch_add(1, Ordering::Relaxed) % self.pool.len(),
            Cursor::Random(rng) => {
                let mut rng = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                rng.random_range(0..self.pool.len())
            }
        };
        Ok(&self.pool[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureSchema;

    fn schema() -> FeatureSchema {
        FeatureSchema::from_names(["a", "b"], ["X", "Y"]).unwrap()
    }

    fn row(a: f64, label: usize) -> LabeledRow {
        LabeledRow {
            features: FeatureVector::from_values(&schema(), vec![Some(a), None]).unwrap(),
            label: Some(label),
        }
    }

    #[test]
    fn test_round_robin_cycles_in_order() {
        let pool = vec![row(1.0, 0), row(2.0, 1), row(3.0, 0)];
        let provider = SampleProvider::new(pool, &[], &SampleConfig::default());
        let seen: Vec<Option<f64>> = (0..5)
            .map(|_| provider.next_sample().unwrap().features.get(0))
            .collect();
        assert_eq!(
            seen,
            vec![Some(1.0), Some(2.0), Some(3.0), Some(1.0), Some(2.0)]
        );
    }

    #[test]
    fn test_overlap_with_holdout_dropped() {
        let pool = vec![row(1.0, 0), row(2.0, 1), row(3.0, 0)];
        let holdout = vec![row(2.0, 1)];
        let provider = SampleProvider::new(pool, &holdout, &SampleConfig::default());
        assert_eq!(provider.len(), 2);
        for _ in 0..4 {
            assert_ne!(provider.next_sample().unwrap().features.get(0), Some(2.0));
        }
    }

    #[test]
    fn test_all_missing_rows_dropped() {
        let blank = LabeledRow {
            features: FeatureVector::from_values(&schema(), vec![None, None]).unwrap(),
            label: Some(0),
        };
        let pool = vec![blank, row(0.7, 0)];
        let provider = SampleProvider::new(pool, &[], &SampleConfig::default());
        assert_eq!(provider.len(), 1);
        for _ in 0..3 {
            assert_eq!(provider.next_sample().unwrap().features.get(0), Some(0.7));
        }
    }

    #[test]
    fn test_random_policy_is_seeded() {
        let pool: Vec<LabeledRow> = (0..20).map(|i| row(i as f64, 0)).collect();
        let config = SampleConfig {
            policy: SamplePolicy::Random,
            seed: 11,
        };
        let draw = |provider: &SampleProvider| -> Vec<Option<f64>> {
            (0..10)
                .map(|_| provider.next_sample().unwrap().features.get(0))
                .collect()
        };
        let first = SampleProvider::new(pool.clone(), &[], &config);
        let second = SampleProvider::new(pool, &[], &config);
        assert_eq!(draw(&first), draw(&second));
        assert_eq!(first.policy(), SamplePolicy::Random);
    }

    #[test]
    fn test_empty_pool() {
        let provider = SampleProvider::empty();
        assert!(matches!(provider.next_sample(), Err(StarlingError::NoSamples)));

        // everything overlaps -> nothing left
        let provider = SampleProvider::new(vec![row(1.0, 0)], &[row(1.0, 0)], &SampleConfig::default());
        assert!(provider.is_empty());
        assert!(matches!(provider.next_sample(), Err(StarlingError::NoSamples)));
    }
}
