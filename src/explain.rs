//! Per-prediction feature ranking
//!
//! Two importance sources exist, and which one a model version uses is
//! settled once when the bundle is built:
//!
//! - `Local`: signed path attribution over the predicted class's trees,
//!   rescaled so the scores add up to `p(class) - p_baseline(class)`
//! - `Global`: unsigned split-gain importance of the whole model, identical
//!   for every prediction
//!
//! A response never mixes the two.

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::error::{StarlingError, StarlingResult};
use crate::model::{ClassProbabilities, ForestClassifier, PathAttribution};
use crate::schema::{FeatureSchema, FeatureVector};

/// Which kind of score a ranking carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportanceKind {
    Local,
    Global,
}

/// Importance source resolved at model-load time
#[derive(Debug, Clone)]
pub enum ImportanceSource {
    Local(PathAttribution),
    /// One unsigned score per feature in schema order
    Global(Vec<f64>),
}

impl ImportanceSource {
    /// Prefer local attribution; fall back to global split importance when
    /// the artifact lacks node covers.
    pub fn resolve(forest: &ForestClassifier) -> Self {
        match forest.path_attribution() {
            Some(attribution) => Self::Local(attribution),
            None => Self::Global(forest.split_importance()),
        }
    }

    pub fn kind(&self) -> ImportanceKind {
        match self {
            Self::Local(_) => ImportanceKind::Local,
            Self::Global(_) => ImportanceKind::Global,
        }
    }

    /// Unranked score per feature for the predicted class of `probs`.
    pub fn scores(
        &self,
        forest: &ForestClassifier,
        fv: &FeatureVector,
        probs: &ClassProbabilities,
    ) -> StarlingResult<Vec<f64>> {
        match self {
            Self::Global(scores) => Ok(scores.clone()),
            Self::Local(attribution) => {
                let class = probs.argmax();
                let mut contrib = attribution.contributions(forest, fv, class)?;

                let margin_gap: f64 = contrib.iter().sum();
                let p = probs.get(class);
                let prob_gap = p - attribution.baseline_probabilities()[class];
                // linearise the softmax around the path; flat paths use its slope
                let scale = if margin_gap.abs() > 1e-12 {
                    prob_gap / margin_gap
                } else {
                    p * (1.0 - p)
                };
                for c in &mut contrib {
                    *c *= scale;
                }
                Ok(contrib)
            }
        }
    }

    /// Top-`top_k` features by descending |importance|, schema order on ties.
    pub fn explain(
        &self,
        forest: &ForestClassifier,
        schema: &FeatureSchema,
        fv: &FeatureVector,
        probs: &ClassProbabilities,
        top_k: usize,
    ) -> StarlingResult<Vec<FeatureContribution>> {
        if top_k == 0 {
            return Err(StarlingError::InvalidTopK { value: top_k });
        }
        let scores = self.scores(forest, fv, probs)?;
        Ok(rank(schema, fv, &scores, self.kind(), top_k))
    }
}

/// One ranked factor of a prediction
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureContribution {
    pub feature: String,
    pub value: Option<f64>,
    /// Signed for local sources, non-negative for global ones
    pub importance: f64,
    pub kind: ImportanceKind,
}

/// Serialises as `{feature, shap, value}` or `{feature, importance, value}`.
impl Serialize for FeatureContribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("FeatureContribution", 3)?;
        s.serialize_field("feature", &self.feature)?;
        match self.kind {
            ImportanceKind::Local => s.serialize_field("shap", &self.importance)?,
            ImportanceKind::Global => s.serialize_field("importance", &self.importance)?,
        }
        s.serialize_field("value", &self.value)?;
        s.end()
    }
}

fn rank(
    schema: &FeatureSchema,
    fv: &FeatureVector,
    scores: &[f64],
    kind: ImportanceKind,
    top_k: usize,
) -> Vec<FeatureContribution> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // stable: equal magnitudes stay in schema order
    order.sort_by(|&a, &b| scores[b].abs().total_cmp(&scores[a].abs()));

    order
        .into_iter()
        .take(top_k)
        .map(|idx| FeatureContribution {
            feature: schema.feature_name(idx).to_string(),
            value: fv.get(idx),
            importance: scores[idx],
            kind,
        })
        .collect()
}
