//! Feature schema for a loaded model version
//!
//! The schema fixes the canonical feature order (the layout of every
//! feature vector), optional unit/hint metadata per feature, and the ordered
//! label set. It is built once per model version and never mutated.

mod validate;

pub use validate::{FeatureVector, RawFeatures};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{StarlingError, StarlingResult};

/// Display metadata for a single feature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureInfo {
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub hint: String,
}

/// One feature column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSpec {
    pub name: String,
    pub info: Option<FeatureInfo>,
}

/// Ordered features and labels of one model version
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    features: Vec<FeatureSpec>,
    labels: Vec<String>,
    /// Feature name -> column index
    index: FxHashMap<String, usize>,
}

impl FeatureSchema {
    /// Build a schema, rejecting empty/duplicate features and label sets
    /// with fewer than two distinct labels.
    pub fn new(features: Vec<FeatureSpec>, labels: Vec<String>) -> StarlingResult<Self> {
        if features.is_empty() {
            return Err(invalid_schema("schema has no features"));
        }
        if labels.len() < 2 {
            return Err(invalid_schema(format!(
                "label set needs at least 2 labels, got {}",
                labels.len()
            )));
        }
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(invalid_schema(format!("duplicate label {label:?}")));
            }
        }

        let mut index = FxHashMap::default();
        for (i, spec) in features.iter().enumerate() {
            if spec.name.is_empty() {
                return Err(invalid_schema(format!("feature {i} has an empty name")));
            }
            if index.insert(spec.name.clone(), i).is_some() {
                return Err(invalid_schema(format!("duplicate feature {:?}", spec.name)));
            }
        }

        Ok(Self {
            features,
            labels,
            index,
        })
    }

    /// Convenience constructor for schemas without display metadata
    pub fn from_names<S: Into<String>>(
        features: impl IntoIterator<Item = S>,
        labels: impl IntoIterator<Item = S>,
    ) -> StarlingResult<Self> {
        let features = features
            .into_iter()
            .map(|name| FeatureSpec {
                name: name.into(),
                info: None,
            })
            .collect();
        Self::new(features, labels.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    pub fn feature_name(&self, idx: usize) -> &str {
        &self.features[idx].name
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, idx: usize) -> &str {
        &self.labels[idx]
    }

    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Unit/hint for every feature; features without metadata get empty strings.
    pub fn feature_info(&self) -> impl Iterator<Item = (&str, FeatureInfo)> {
        self.features
            .iter()
            .map(|f| (f.name.as_str(), f.info.clone().unwrap_or_default()))
    }
}

fn invalid_schema(reason: impl Into<String>) -> StarlingError {
    StarlingError::artifact("schema", reason)
}
