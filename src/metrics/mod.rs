//! Evaluation metrics for a loaded model version
//!
//! Computed once per bundle from the held-out set and then served read-only.
//! Nothing here is recomputed per request; a reload builds a fresh snapshot.
//!
//! Architecture:
//! - Inference over the held-out rows runs on the rayon pool
//! - Confusion matrix, macro F1 and top confusions from argmax predictions
//! - One-vs-rest ROC / PR per label (in parallel)
//! - Top-class calibration bins and ECE
//! - Recommended threshold and its decision statistics
//! - Gain importances, plus mean |attribution| when the model supports it

mod calibration;
mod confusion;
mod curves;
mod threshold;

pub use calibration::CalibrationBins;
pub use confusion::{ConfusionMatrix, TopConfusion};
pub use curves::{pr_curve, roc_curve, PrCurve, RocCurve};
pub use threshold::{decision_stats, recommended_threshold, DecisionStats, Outcome, FALLBACK_THRESHOLD};

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::MetricsConfig;
use crate::error::{StarlingError, StarlingResult};
use crate::explain::ImportanceSource;
use crate::model::{ClassProbabilities, ForestClassifier, LabeledRow, TrainingSummary};
use crate::schema::FeatureSchema;

/// Hyperparameter search result produced by training, passed through as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSummary {
    #[serde(default)]
    pub best_params: IndexMap<String, serde_json::Value>,
    pub cv_macro_f1_mean: f64,
    pub cv_macro_f1_std: f64,
}

/// Slim headline block embedded in `metadata`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub macro_f1: f64,
    pub roc_auc_ovr: Option<f64>,
    pub n_train: usize,
    pub n_test: usize,
    pub recommended_threshold: f64,
}

/// Immutable metrics of one model version (the `metrics_full` document)
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub labels: Vec<String>,
    pub n_train: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_total: Option<usize>,
    pub n_test: usize,
    pub macro_f1: f64,
    /// Mean of the defined per-class AUCs; `None` if no class has one
    pub roc_auc_ovr: Option<f64>,
    pub confusion_matrix: ConfusionMatrix,
    pub top_confusions: Vec<TopConfusion>,
    pub roc: IndexMap<String, RocCurve>,
    pub pr: IndexMap<String, PrCurve>,
    pub auc_per_class: IndexMap<String, f64>,
    pub ece: f64,
    pub calibration_bins: CalibrationBins,
    pub recommended_threshold: f64,
    pub decision: DecisionStats,
    pub feature_importances_gain: IndexMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_importances_shap: Option<IndexMap<String, f64>>,
    pub search: SearchSummary,
}

impl MetricsSnapshot {
    /// Evaluate `forest` on the held-out rows.
    ///
    /// Fails as a whole: an empty set, an unlabelled row or a failed
    /// inference yields an error and no snapshot.
    pub fn compute(
        forest: &ForestClassifier,
        importance: &ImportanceSource,
        schema: &FeatureSchema,
        holdout: &[LabeledRow],
        summary: &TrainingSummary,
        config: &MetricsConfig,
    ) -> StarlingResult<Self> {
        if holdout.is_empty() {
            return Err(StarlingError::Metrics("held-out set is empty".into()));
        }
        let labels = schema.labels();
        let num_classes = labels.len();

        let actual: Vec<usize> = holdout
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row.label
                    .ok_or_else(|| StarlingError::Metrics(format!("held-out row {i} has no label")))
            })
            .collect::<StarlingResult<_>>()?;

        let probs: Vec<ClassProbabilities> = holdout
            .par_iter()
            .map(|row| forest.infer(&row.features))
            .collect::<StarlingResult<_>>()
            .map_err(|e| StarlingError::Metrics(format!("held-out inference failed: {e}")))?;

        let predicted: Vec<usize> = probs.iter().map(ClassProbabilities::argmax).collect();
        let confusion_matrix = ConfusionMatrix::from_pairs(
            num_classes,
            actual.iter().copied().zip(predicted.iter().copied()),
        );

        let curves: Vec<(RocCurve, PrCurve)> = (0..num_classes)
            .into_par_iter()
            .map(|k| {
                let scores: Vec<f64> = probs.iter().map(|p| p.get(k)).collect();
                let positive: Vec<bool> = actual.iter().map(|&a| a == k).collect();
                (roc_curve(&scores, &positive), pr_curve(&scores, &positive))
            })
            .collect();

        let mut roc = IndexMap::new();
        let mut pr = IndexMap::new();
        let mut auc_per_class = IndexMap::new();
        for (label, (r, p)) in labels.iter().zip(curves) {
            if let Some(auc) = r.auc {
                auc_per_class.insert(label.clone(), auc);
            }
            roc.insert(label.clone(), r);
            pr.insert(label.clone(), p);
        }
        let roc_auc_ovr = (!auc_per_class.is_empty())
            .then(|| auc_per_class.values().sum::<f64>() / auc_per_class.len() as f64);

        let outcomes: Vec<Outcome> = probs
            .iter()
            .zip(&predicted)
            .zip(&actual)
            .map(|((p, &pred), &act)| Outcome {
                confidence: p.get(pred),
                predicted: pred,
                actual: act,
            })
            .collect();

        let observations: Vec<(f64, bool)> = outcomes
            .iter()
            .map(|o| (o.confidence, o.predicted == o.actual))
            .collect();
        let calibration_bins = CalibrationBins::compute(&observations, config.calibration_bins);
        let ece = calibration_bins.expected_calibration_error();

        let threshold = recommended_threshold(&outcomes, config.target_precision);
        let decision = decision_stats(&outcomes, labels, threshold);

        let feature_importances_gain = named(schema, forest.split_importance());
        let feature_importances_shap = match importance {
            ImportanceSource::Local(attribution) => {
                let per_row: Vec<Vec<f64>> = holdout
                    .par_iter()
                    .map(|row| -> StarlingResult<Vec<f64>> {
                        let mut acc = vec![0.0; schema.len()];
                        for class in 0..num_classes {
                            let contrib = attribution.contributions(forest, &row.features, class)?;
                            for (a, c) in acc.iter_mut().zip(contrib) {
                                *a += c.abs();
                            }
                        }
                        Ok(acc)
                    })
                    .collect::<StarlingResult<_>>()
                    .map_err(|e| StarlingError::Metrics(format!("attribution failed: {e}")))?;

                // summed in row order so the table is identical across runs
                let mut mean = vec![0.0; schema.len()];
                for row in &per_row {
                    for (m, v) in mean.iter_mut().zip(row) {
                        *m += v;
                    }
                }
                let denom = (holdout.len() * num_classes) as f64;
                Some(named(schema, mean.into_iter().map(|m| m / denom).collect()))
            }
            ImportanceSource::Global(_) => None,
        };

        let snapshot = Self {
            labels: labels.to_vec(),
            n_train: summary.n_train,
            n_total: summary.n_total,
            n_test: holdout.len(),
            macro_f1: confusion_matrix.macro_f1(),
            roc_auc_ovr,
            top_confusions: confusion_matrix.top_confusions(labels, config.top_confusions),
            confusion_matrix,
            roc,
            pr,
            auc_per_class,
            ece,
            calibration_bins,
            recommended_threshold: threshold,
            decision,
            feature_importances_gain,
            feature_importances_shap,
            search: summary.search.clone(),
        };

        info!(
            n_test = snapshot.n_test,
            macro_f1 = snapshot.macro_f1,
            ece = snapshot.ece,
            recommended_threshold = snapshot.recommended_threshold,
            "Metrics snapshot computed"
        );
        Ok(snapshot)
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            macro_f1: self.macro_f1,
            roc_auc_ovr: self.roc_auc_ovr,
            n_train: self.n_train,
            n_test: self.n_test,
            recommended_threshold: self.recommended_threshold,
        }
    }
}

fn named(schema: &FeatureSchema, values: Vec<f64>) -> IndexMap<String, f64> {
    schema
        .feature_names()
        .map(str::to_string)
        .zip(values)
        .collect()
}
