//! On-disk model artifacts
//!
//! An artifact directory holds one model version as produced by the
//! training pipeline:
//!
//! ```text
//! artifacts/
//!   model.json              boosted trees, feature list, labels, impute values
//!   feature_info.json       optional unit/hint per feature
//!   training_summary.json   n_train, n_total, hyperparameter search summary
//!   holdout.csv             held-out evaluation rows + true_label
//!   sample_inputs.csv       optional demonstration rows (+ true_label)
//! ```

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::tree::Tree;
use crate::error::{StarlingError, StarlingResult};
use crate::metrics::SearchSummary;
use crate::schema::{FeatureInfo, FeatureSchema, FeatureVector};

pub const MODEL_FILE: &str = "model.json";
pub const FEATURE_INFO_FILE: &str = "feature_info.json";
pub const SUMMARY_FILE: &str = "training_summary.json";
pub const HOLDOUT_FILE: &str = "holdout.csv";
pub const SAMPLES_FILE: &str = "sample_inputs.csv";

/// Column holding the ground-truth label in CSV artifacts
pub const LABEL_COLUMN: &str = "true_label";

/// Serialized tree ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub features: Vec<String>,
    pub labels: Vec<String>,
    #[serde(default)]
    pub base_score: Vec<f64>,
    #[serde(default)]
    pub impute: IndexMap<String, f64>,
    pub trees: Vec<Tree>,
}

impl ModelFile {
    /// Parse `model.json` and derive the version string.
    ///
    /// Without an explicit `version` the first 12 hex digits of the file's
    /// SHA-256 are used, so any content change yields a new version.
    pub fn load(dir: &Path) -> StarlingResult<(Self, String)> {
        let path = dir.join(MODEL_FILE);
        let bytes = std::fs::read(&path).map_err(|e| StarlingError::artifact(&path, e.to_string()))?;
        let file: ModelFile = serde_json::from_slice(&bytes)
            .map_err(|e| StarlingError::artifact(&path, e.to_string()))?;

        let version = match &file.version {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => {
                let digest = Sha256::digest(&bytes);
                digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
            }
        };
        Ok((file, version))
    }
}

/// Upstream training summary, passed through untouched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub n_train: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_total: Option<usize>,
    pub search: SearchSummary,
}

impl TrainingSummary {
    pub fn load(dir: &Path) -> StarlingResult<Self> {
        let path = dir.join(SUMMARY_FILE);
        let content =
            std::fs::read_to_string(&path).map_err(|e| StarlingError::artifact(&path, e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| StarlingError::artifact(&path, e.to_string()))
    }
}

/// Load optional `feature_info.json`; a missing file means no metadata.
pub fn load_feature_info(dir: &Path) -> StarlingResult<IndexMap<String, FeatureInfo>> {
    let path = dir.join(FEATURE_INFO_FILE);
    if !path.exists() {
        return Ok(IndexMap::new());
    }
    let content =
        std::fs::read_to_string(&path).map_err(|e| StarlingError::artifact(&path, e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| StarlingError::artifact(&path, e.to_string()))
}

/// One CSV row: features in schema order plus the label index if given
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRow {
    pub features: FeatureVector,
    pub label: Option<usize>,
}

/// Read a feature CSV against the schema.
///
/// Every column except `true_label` must name a schema feature; schema
/// features without a column are missing in every row. Empty cells are
/// missing values. With `require_label` every row needs a known label.
pub fn read_rows(
    path: &Path,
    schema: &FeatureSchema,
    require_label: bool,
) -> StarlingResult<Vec<LabeledRow>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| StarlingError::artifact(path, e.to_string()))?;
    let headers = reader.headers()?.clone();

    let mut columns: Vec<Option<usize>> = Vec::with_capacity(headers.len());
    let mut label_col = None;
    for (col, name) in headers.iter().enumerate() {
        let name = name.trim();
        if name == LABEL_COLUMN {
            label_col = Some(col);
            columns.push(None);
        } else {
            let idx = schema.feature_index(name).ok_or_else(|| {
                StarlingError::artifact(path, format!("column {name:?} is not a schema feature"))
            })?;
            columns.push(Some(idx));
        }
    }
    if require_label && label_col.is_none() {
        return Err(StarlingError::artifact(path, format!("missing {LABEL_COLUMN} column")));
    }

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let row_no = line + 2; // 1-based, after the header
        let mut values = vec![None; schema.len()];

        for (cell, target) in record.iter().zip(&columns) {
            let Some(idx) = target else { continue };
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            let v: f64 = cell.parse().map_err(|_| {
                StarlingError::artifact(path, format!("row {row_no}: {cell:?} is not a number"))
            })?;
            if !v.is_finite() {
                return Err(StarlingError::artifact(
                    path,
                    format!("row {row_no}: non-finite value {cell:?}"),
                ));
            }
            values[*idx] = Some(v);
        }
        // evaluation rows must pass the same check a predict request does
        if require_label && values.iter().all(Option::is_none) {
            return Err(StarlingError::artifact(
                path,
                format!("row {row_no}: no feature values"),
            ));
        }

        let label = match label_col.and_then(|c| record.get(c)).map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(schema.label_index(raw).ok_or_else(|| {
                StarlingError::artifact(path, format!("row {row_no}: unknown label {raw:?}"))
            })?),
            _ if require_label => {
                return Err(StarlingError::artifact(path, format!("row {row_no}: missing label")));
            }
            _ => None,
        };

        rows.push(LabeledRow {
            features: FeatureVector::from_values(schema, values)?,
            label,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn schema() -> FeatureSchema {
        FeatureSchema::from_names(["a", "b", "c"], ["X", "Y", "Z"]).unwrap()
    }

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_rows_with_missing_cells() {
        let file = write_csv("a,c,true_label\n1.5,,Y\n,2,X\n");
        let rows = read_rows(file.path(), &schema(), true).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].features.values(), &[Some(1.5), None, None]);
        assert_eq!(rows[0].label, Some(1));
        assert_eq!(rows[1].features.values(), &[None, None, Some(2.0)]);
        assert_eq!(rows[1].label, Some(0));
    }

    #[test]
    fn test_read_rows_rejects_unknown_column_and_label() {
        let file = write_csv("a,d,true_label\n1,2,X\n");
        let err = read_rows(file.path(), &schema(), true).unwrap_err();
        assert!(err.to_string().contains("\"d\""));

        let file = write_csv("a,true_label\n1,W\n");
        let err = read_rows(file.path(), &schema(), true).unwrap_err();
        assert!(err.to_string().contains("unknown label"));
    }

    #[test]
    fn test_label_optional_for_samples() {
        let file = write_csv("a,b\n1,2\n");
        let rows = read_rows(file.path(), &schema(), false).unwrap();
        assert_eq!(rows[0].label, None);

        assert!(read_rows(file.path(), &schema(), true).is_err());
    }

    #[test]
    fn test_all_missing_row_rejected_when_labelled() {
        let file = write_csv("a,b,c,true_label\n1,0,0,X\n,,,Y\n");
        let err = read_rows(file.path(), &schema(), true).unwrap_err();
        assert!(matches!(err, StarlingError::Artifact { .. }));
        assert!(err.to_string().contains("row 3: no feature values"));

        // sample pools load it; the provider filters it out
        let rows = read_rows(file.path(), &schema(), false).unwrap();
        assert_eq!(rows[1].features.present_count(), 0);
    }

    #[test]
    fn test_version_defaults_to_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let model = r#"{"features": ["a"], "labels": ["X", "Y"], "trees": []}"#;
        std::fs::write(dir.path().join(MODEL_FILE), model).unwrap();
        let (_, version) = ModelFile::load(dir.path()).unwrap();
        assert_eq!(version.len(), 12);
        assert!(version.chars().all(|c| c.is_ascii_hexdigit()));

        let model = r#"{"version": "v7", "features": ["a"], "labels": ["X", "Y"], "trees": []}"#;
        std::fs::write(dir.path().join(MODEL_FILE), model).unwrap();
        let (_, version) = ModelFile::load(dir.path()).unwrap();
        assert_eq!(version, "v7");
    }
}
