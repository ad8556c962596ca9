//! Multiclass boosted forest
//!
//! Every tree adds to the raw margin of exactly one class. Margins are
//! summed in artifact order so identical inputs give identical bits.

use super::artifact::ModelFile;
use super::tree::Tree;
use super::{softmax, ClassProbabilities};
use crate::error::{StarlingError, StarlingResult};
use crate::schema::{FeatureSchema, FeatureVector};

/// Immutable tree ensemble for one model version
#[derive(Debug, Clone)]
pub struct ForestClassifier {
    num_features: usize,
    num_classes: usize,
    base_score: Vec<f64>,
    /// Fill value per feature, applied before any split is evaluated
    impute: Vec<Option<f64>>,
    trees: Vec<Tree>,
}

impl ForestClassifier {
    /// Build from a parsed artifact, checking it against the schema.
    pub fn from_file(file: &ModelFile, schema: &FeatureSchema) -> StarlingResult<Self> {
        let num_features = schema.len();
        let num_classes = schema.num_labels();
        let invalid = |reason: String| StarlingError::artifact(super::artifact::MODEL_FILE, reason);

        let base_score = if file.base_score.is_empty() {
            vec![0.0; num_classes]
        } else if file.base_score.len() == num_classes {
            file.base_score.clone()
        } else {
            return Err(invalid(format!(
                "base_score has {} entries for {num_classes} classes",
                file.base_score.len()
            )));
        };
        if base_score.iter().any(|b| !b.is_finite()) {
            return Err(invalid("base_score must be finite".into()));
        }

        let mut impute = vec![None; num_features];
        for (name, value) in &file.impute {
            let idx = schema
                .feature_index(name)
                .ok_or_else(|| invalid(format!("impute names unknown feature {name:?}")))?;
            if !value.is_finite() {
                return Err(invalid(format!("impute value for {name:?} is not finite")));
            }
            impute[idx] = Some(*value);
        }

        if file.trees.is_empty() {
            return Err(invalid("model has no trees".into()));
        }
        for (i, tree) in file.trees.iter().enumerate() {
            tree.validate(num_features, num_classes)
                .map_err(|e| invalid(format!("tree {i}: {e}")))?;
        }

        Ok(Self {
            num_features,
            num_classes,
            base_score,
            impute,
            trees: file.trees.clone(),
        })
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Copy of the input with the training-time fill values applied.
    fn prepare(&self, fv: &FeatureVector) -> Vec<Option<f64>> {
        fv.values()
            .iter()
            .zip(&self.impute)
            .map(|(v, fill)| v.or(*fill))
            .collect()
    }

    fn check_len(&self, fv: &FeatureVector) -> StarlingResult<()> {
        if fv.len() != self.num_features {
            return Err(StarlingError::artifact(
                "feature vector",
                format!("expected {} values, got {}", self.num_features, fv.len()),
            ));
        }
        Ok(())
    }

    /// Raw per-class margins.
    pub fn margins(&self, fv: &FeatureVector) -> StarlingResult<Vec<f64>> {
        self.check_len(fv)?;
        let x = self.prepare(fv);
        let mut margins = self.base_score.clone();
        for tree in &self.trees {
            margins[tree.class] += tree.predict(&x);
        }
        Ok(margins)
    }

    /// Probability distribution over the label set.
    pub fn infer(&self, fv: &FeatureVector) -> StarlingResult<ClassProbabilities> {
        ClassProbabilities::from_margins(&self.margins(fv)?)
    }

    /// Per-prediction attribution tables, available only when every node
    /// records its cover.
    pub fn path_attribution(&self) -> Option<PathAttribution> {
        let expectations = self
            .trees
            .iter()
            .map(Tree::expectations)
            .collect::<Option<Vec<_>>>()?;

        let mut baseline_margins = self.base_score.clone();
        for (tree, expect) in self.trees.iter().zip(&expectations) {
            baseline_margins[tree.class] += expect[0];
        }

        Some(PathAttribution {
            expectations,
            baseline_margins,
        })
    }

    /// Unsigned global importance per feature: summed split gain, or split
    /// counts for trees without gain.
    pub fn split_importance(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.num_features];
        for tree in &self.trees {
            tree.accumulate_importance(&mut out);
        }
        out
    }
}

/// Precomputed node expectations for path (Saabas) attribution
#[derive(Debug, Clone)]
pub struct PathAttribution {
    /// One table per tree, indexed by node
    expectations: Vec<Vec<f64>>,
    /// Expected margin per class over the training distribution
    baseline_margins: Vec<f64>,
}

impl PathAttribution {
    pub fn baseline_margins(&self) -> &[f64] {
        &self.baseline_margins
    }

    /// Baseline distribution: softmax of the expected margins.
    pub fn baseline_probabilities(&self) -> Vec<f64> {
        softmax(&self.baseline_margins)
    }

    /// Margin-space contributions of every feature to `class`.
    ///
    /// Sums to `margins(fv)[class] - baseline_margins[class]`.
    pub fn contributions(
        &self,
        forest: &ForestClassifier,
        fv: &FeatureVector,
        class: usize,
    ) -> StarlingResult<Vec<f64>> {
        forest.check_len(fv)?;
        let x = forest.prepare(fv);
        let mut out = vec![0.0; forest.num_features];
        for (tree, expect) in forest.trees.iter().zip(&self.expectations) {
            if tree.class == class {
                tree.attribute(&x, expect, &mut out);
            }
        }
        Ok(out)
    }
}
