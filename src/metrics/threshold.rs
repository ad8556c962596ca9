//! Recommended acceptance threshold and its operating point
//!
//! The threshold is the lowest winning-class confidence at which accepted
//! predictions, taken in order of decreasing confidence, still reach the
//! target precision.

use indexmap::IndexMap;
use serde::Serialize;

/// Fallback when no confidence level reaches the target precision
pub const FALLBACK_THRESHOLD: f64 = 0.5;

/// One held-out prediction as seen by the decision policy
#[derive(Debug, Clone, Copy)]
pub struct Outcome {
    pub confidence: f64,
    pub predicted: usize,
    pub actual: usize,
}

impl Outcome {
    fn correct(&self) -> bool {
        self.predicted == self.actual
    }
}

/// Behaviour of the decision policy at the recommended threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionStats {
    pub recommended_threshold: f64,
    /// Share of held-out predictions accepted
    pub coverage_at_threshold: f64,
    /// Accuracy among accepted predictions; `None` when nothing is accepted
    pub precision_on_accepted: Option<f64>,
    pub per_class_accept_rate: IndexMap<String, f64>,
}

/// Threshold reaching `target_precision`, clamped into (0, 1).
pub fn recommended_threshold(outcomes: &[Outcome], target_precision: f64) -> f64 {
    let mut order: Vec<usize> = (0..outcomes.len()).collect();
    order.sort_by(|&a, &b| {
        outcomes[b]
            .confidence
            .total_cmp(&outcomes[a].confidence)
    });

    let mut correct = 0usize;
    let mut last_ok = None;
    for (seen, &i) in order.iter().enumerate() {
        if outcomes[i].correct() {
            correct += 1;
        }
        if correct as f64 / (seen + 1) as f64 >= target_precision {
            last_ok = Some(i);
        }
    }

    let threshold = last_ok.map_or(FALLBACK_THRESHOLD, |i| outcomes[i].confidence);
    threshold.clamp(f64::EPSILON, 1.0 - f64::EPSILON)
}

pub fn decision_stats(outcomes: &[Outcome], labels: &[String], threshold: f64) -> DecisionStats {
    let accepted: Vec<&Outcome> = outcomes.iter().filter(|o| o.confidence >= threshold).collect();

    let coverage = if outcomes.is_empty() {
        0.0
    } else {
        accepted.len() as f64 / outcomes.len() as f64
    };
    let precision = (!accepted.is_empty())
        .then(|| accepted.iter().filter(|o| o.correct()).count() as f64 / accepted.len() as f64);

    let per_class_accept_rate = labels
        .iter()
        .enumerate()
        .map(|(k, label)| {
            let support = outcomes.iter().filter(|o| o.actual == k).count();
            let taken = accepted.iter().filter(|o| o.actual == k).count();
            let rate = if support == 0 {
                0.0
            } else {
                taken as f64 / support as f64
            };
            (label.clone(), rate)
        })
        .collect();

    DecisionStats {
        recommended_threshold: threshold,
        coverage_at_threshold: coverage,
        precision_on_accepted: precision,
        per_class_accept_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(confidence: f64, predicted: usize, actual: usize) -> Outcome {
        Outcome {
            confidence,
            predicted,
            actual,
        }
    }

    #[test]
    fn test_threshold_reaches_target_precision() {
        let outcomes = [
            outcome(0.95, 0, 0),
            outcome(0.9, 1, 1),
            outcome(0.8, 1, 1),
            outcome(0.7, 0, 1),
            outcome(0.6, 2, 2),
            outcome(0.5, 2, 0),
        ];
        // cumulative precision: 1, 1, 1, .75, .8, .667
        assert_eq!(recommended_threshold(&outcomes, 0.8), 0.6);
        assert_eq!(recommended_threshold(&outcomes, 0.9), 0.8);
    }

    #[test]
    fn test_threshold_falls_back() {
        let outcomes = [outcome(0.9, 0, 1), outcome(0.8, 1, 0)];
        assert_eq!(recommended_threshold(&outcomes, 0.9), FALLBACK_THRESHOLD);
        assert_eq!(recommended_threshold(&[], 0.9), FALLBACK_THRESHOLD);
    }

    #[test]
    fn test_threshold_stays_inside_open_interval() {
        let outcomes = [outcome(1.0, 0, 0)];
        let t = recommended_threshold(&outcomes, 0.9);
        assert!(t > 0.0 && t < 1.0);
    }

    #[test]
    fn test_decision_stats() {
        let labels = vec!["X".to_string(), "Y".to_string(), "Z".to_string()];
        let outcomes = [
            outcome(0.9, 0, 0),
            outcome(0.8, 1, 0),
            outcome(0.4, 1, 1),
            outcome(0.3, 2, 1),
        ];
        let stats = decision_stats(&outcomes, &labels, 0.5);
        assert_eq!(stats.coverage_at_threshold, 0.5);
        assert_eq!(stats.precision_on_accepted, Some(0.5));
        assert_eq!(stats.per_class_accept_rate["X"], 1.0);
        assert_eq!(stats.per_class_accept_rate["Y"], 0.0);
        assert_eq!(stats.per_class_accept_rate["Z"], 0.0);

        let stats = decision_stats(&outcomes, &labels, 0.99);
        assert_eq!(stats.precision_on_accepted, None);
    }
}
