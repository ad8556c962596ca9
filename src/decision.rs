//! Thresholded decision policy
//!
//! Picks the winning label and decides whether its probability is high
//! enough to accept. The threshold travels with each call; there is no
//! global policy state.

use serde::Serialize;

use crate::error::{StarlingError, StarlingResult};
use crate::model::ClassProbabilities;

/// Why a decision came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Winner's probability reached the threshold
    ThresholdMet,
    /// Winner's probability fell short of the threshold
    BelowThreshold,
    /// Winner shared the top probability and was picked by label order
    TieBreak,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::ThresholdMet => "threshold_met",
            DecisionReason::BelowThreshold => "below_threshold",
            DecisionReason::TieBreak => "tie_break",
        }
    }
}

/// Runner-up label and its probability
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunnerUp {
    pub label: String,
    #[serde(rename = "prob")]
    pub probability: f64,
}

/// Outcome of the policy for one prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub accepted: bool,
    pub reason: DecisionReason,
    pub threshold: f64,
    /// Winning probability
    pub confidence: f64,
    /// Winning minus runner-up probability, never negative
    pub margin: f64,
    pub second_best: RunnerUp,
    /// Index of the winning label (not part of the wire format)
    #[serde(skip)]
    pub winner: usize,
}

/// Reject thresholds outside the open interval (0, 1).
pub fn check_threshold(threshold: f64) -> StarlingResult<f64> {
    if threshold > 0.0 && threshold < 1.0 {
        Ok(threshold)
    } else {
        Err(StarlingError::InvalidThreshold { value: threshold })
    }
}

/// Apply the policy to a distribution.
///
/// Ties at the top are resolved by label-set order and reported as
/// `TieBreak`; `accepted` is always `confidence >= threshold`.
pub fn decide(
    probs: &ClassProbabilities,
    labels: &[String],
    threshold: f64,
) -> StarlingResult<Decision> {
    let threshold = check_threshold(threshold)?;
    if labels.len() != probs.len() {
        return Err(StarlingError::InvalidProbabilities(format!(
            "{} probabilities for {} labels",
            probs.len(),
            labels.len()
        )));
    }

    let order = probs.ranked();
    let (winner, runner_up) = (order[0], order[1]);
    let confidence = probs.get(winner);
    let second = probs.get(runner_up);

    let accepted = confidence >= threshold;
    let reason = if confidence == second {
        DecisionReason::TieBreak
    } else if accepted {
        DecisionReason::ThresholdMet
    } else {
        DecisionReason::BelowThreshold
    };

    Ok(Decision {
        accepted,
        reason,
        threshold,
        confidence,
        margin: (confidence - second).max(0.0),
        second_best: RunnerUp {
            label: labels[runner_up].clone(),
            probability: second,
        },
        winner,
    })
}
