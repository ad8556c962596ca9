//! Inference engine
//!
//! Wraps the immutable boosted-tree artifact of one model version and maps a
//! validated [`FeatureVector`](crate::schema::FeatureVector) to a probability
//! distribution over the label set.
//!
//! Architecture: impute -> per-class tree margins -> softmax
//! All calls are read-only, so one forest can serve any number of threads.

pub mod artifact;
mod forest;
pub mod tree;

pub use artifact::{LabeledRow, ModelFile, TrainingSummary};
pub use forest::{ForestClassifier, PathAttribution};
pub use tree::{MissingDirection, Node, Tree};

#[cfg(test)]
pub(crate) use forest::tests as forest_tests;

use serde::Serialize;

use crate::error::{StarlingError, StarlingResult};

/// Allowed deviation of a distribution's sum from 1
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Probabilities indexed by label position in the schema
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ClassProbabilities {
    values: Vec<f64>,
}

impl ClassProbabilities {
    /// Check the distribution invariants: at least two classes, every value
    /// in [0, 1], sum within [`PROBABILITY_TOLERANCE`] of 1.
    pub fn new(values: Vec<f64>) -> StarlingResult<Self> {
        if values.len() < 2 {
            return Err(StarlingError::InvalidProbabilities(format!(
                "need at least 2 classes, got {}",
                values.len()
            )));
        }
        if let Some(bad) = values.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(StarlingError::InvalidProbabilities(format!(
                "probability {bad} outside [0, 1]"
            )));
        }
        let sum: f64 = values.iter().sum();
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(StarlingError::InvalidProbabilities(format!(
                "probabilities sum to {sum}"
            )));
        }
        Ok(Self { values })
    }

    /// Softmax of raw class margins.
    pub fn from_margins(margins: &[f64]) -> StarlingResult<Self> {
        Self::new(softmax(margins))
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, class: usize) -> f64 {
        self.values[class]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Class indices by descending probability; equal probabilities keep
    /// label-set order.
    pub fn ranked(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.values.len()).collect();
        // stable sort keeps label order among ties
        order.sort_by(|&a, &b| self.values[b].total_cmp(&self.values[a]));
        order
    }

    /// Index of the most probable class (first in label order among ties).
    pub fn argmax(&self) -> usize {
        self.ranked()[0]
    }
}

/// Numerically stable softmax
pub fn softmax(margins: &[f64]) -> Vec<f64> {
    let max = margins.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = margins.iter().map(|m| (m - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
