//! Request-level operations shared by the HTTP server and the CLI
//!
//! Every call takes one snapshot of the current bundle and works on it
//! without further locking, so a reload that lands mid-request never mixes
//! two model versions in one response.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use crate::config::SamplePolicy;
use crate::decision::{decide, Decision};
use crate::error::{StarlingError, StarlingResult};
use crate::explain::{FeatureContribution, ImportanceKind};
use crate::metrics::MetricsSummary;
use crate::registry::{ModelBundle, ModelRegistry};
use crate::schema::{FeatureInfo, FeatureVector, RawFeatures};

/// Body of `predict`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictRequest {
    pub features: RawFeatures,
    /// Overrides the configured / recommended threshold
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// One `batch_predict` item: `{features: {...}}` or a bare feature mapping
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BatchRow {
    Request(PredictRequest),
    Bare(RawFeatures),
}

impl BatchRow {
    fn into_request(self) -> PredictRequest {
        match self {
            BatchRow::Request(req) => req,
            BatchRow::Bare(features) => PredictRequest {
                features,
                ..Default::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictResponse {
    pub label: String,
    pub probs: IndexMap<String, f64>,
    pub decision: Decision,
    pub top_factors: Vec<FeatureContribution>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub features: Vec<String>,
    pub labels: Vec<String>,
    pub metrics: MetricsSummary,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EchoSample {
    pub features: IndexMap<String, Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub true_label: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub ok: bool,
    /// Service build version
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

/// Provenance of the loaded bundle, printed by `inspect`
#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    pub version: String,
    pub source_dir: PathBuf,
    pub loaded_at: DateTime<Utc>,
    pub trees: usize,
    pub importance: &'static str,
    pub samples: usize,
    pub sample_policy: SamplePolicy,
}

/// `metrics_full` document borrowed from a bundle snapshot
#[derive(Debug, Clone)]
pub struct FullMetrics(Arc<ModelBundle>);

impl FullMetrics {
    pub fn bundle(&self) -> &ModelBundle {
        &self.0
    }
}

impl Serialize for FullMetrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.metrics.serialize(serializer)
    }
}

#[derive(Clone)]
pub struct Service {
    registry: Arc<ModelRegistry>,
}

impl Service {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn predict(&self, req: &PredictRequest) -> StarlingResult<PredictResponse> {
        let bundle = self.registry.current()?;
        self.predict_on(&bundle, req)
    }

    /// Predict every row against one bundle; results keep input order.
    ///
    /// The lowest-index failure fails the whole batch and names the row.
    pub fn batch_predict(&self, rows: Vec<BatchRow>) -> StarlingResult<Vec<PredictResponse>> {
        if rows.is_empty() {
            return Err(StarlingError::EmptyBatch);
        }
        let bundle = self.registry.current()?;
        let results: Vec<StarlingResult<PredictResponse>> = rows
            .into_par_iter()
            .map(|row| self.predict_on(&bundle, &row.into_request()))
            .collect();

        debug!(rows = results.len(), version = %bundle.version, "Batch predicted");
        results
            .into_iter()
            .enumerate()
            .map(|(index, result)| {
                result.map_err(|e| StarlingError::BatchItem {
                    index,
                    source: Box::new(e),
                })
            })
            .collect()
    }

    fn predict_on(&self, bundle: &ModelBundle, req: &PredictRequest) -> StarlingResult<PredictResponse> {
        let defaults = &self.registry.config().decision;
        let threshold = req
            .threshold
            .or(defaults.default_threshold)
            .unwrap_or(bundle.metrics.recommended_threshold);
        let top_k = req.top_k.unwrap_or(defaults.top_k);

        let fv = FeatureVector::validate(&bundle.schema, &req.features)?;
        let probs = bundle.forest.infer(&fv)?;
        let labels = bundle.schema.labels();
        let decision = decide(&probs, labels, threshold)?;
        let top_factors = bundle
            .importance
            .explain(&bundle.forest, &bundle.schema, &fv, &probs, top_k)?;

        debug!(
            version = %bundle.version,
            present = fv.present_count(),
            label = %labels[decision.winner],
            confidence = decision.confidence,
            reason = decision.reason.as_str(),
            "Predicted"
        );

        Ok(PredictResponse {
            label: labels[decision.winner].clone(),
            probs: labels.iter().cloned().zip(probs.values().iter().copied()).collect(),
            decision,
            top_factors,
        })
    }

    pub fn metadata(&self) -> StarlingResult<Metadata> {
        let bundle = self.registry.current()?;
        Ok(Metadata {
            features: bundle.schema.feature_names().map(str::to_string).collect(),
            labels: bundle.schema.labels().to_vec(),
            metrics: bundle.metrics.summary(),
            version: bundle.version.clone(),
        })
    }

    pub fn feature_info(&self) -> StarlingResult<IndexMap<String, FeatureInfo>> {
        let bundle = self.registry.current()?;
        Ok(bundle
            .schema
            .feature_info()
            .map(|(name, info)| (name.to_string(), info))
            .collect())
    }

    pub fn echo_sample(&self) -> StarlingResult<EchoSample> {
        let bundle = self.registry.current()?;
        let row = bundle.samples.next_sample()?;
        Ok(EchoSample {
            features: row.features.to_named(&bundle.schema),
            true_label: row.label.map(|k| bundle.schema.label(k).to_string()),
        })
    }

    pub fn metrics_full(&self) -> StarlingResult<FullMetrics> {
        Ok(FullMetrics(self.registry.current()?))
    }

    pub fn health(&self) -> Health {
        let model_version = self.registry.current().ok().map(|b| b.version.clone());
        Health {
            ok: model_version.is_some(),
            version: env!("CARGO_PKG_VERSION"),
            model_version,
        }
    }

    pub fn provenance(&self) -> StarlingResult<Provenance> {
        let bundle = self.registry.current()?;
        Ok(Provenance {
            version: bundle.version.clone(),
            source_dir: bundle.source_dir.clone(),
            loaded_at: bundle.loaded_at,
            trees: bundle.forest.num_trees(),
            importance: match bundle.importance.kind() {
                ImportanceKind::Local => "local",
                ImportanceKind::Global => "global",
            },
            samples: bundle.samples.len(),
            sample_policy: bundle.samples.policy(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StarlingConfig;
    use crate::decision::DecisionReason;
    use crate::registry::tests::loaded_registry;
    use serde_json::json;

    fn service(dir: &std::path::Path) -> Service {
        Service::new(Arc::new(loaded_registry(dir)))
    }

    fn request(body: serde_json::Value) -> PredictRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_predict_with_missing_feature() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let resp = svc
            .predict(&request(json!({"features": {"a": 1.0, "b": 2.0}, "top_k": 2})))
            .unwrap();
        let sum: f64 = resp.probs.values().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(resp.top_factors.len() <= 2);
        // a and b both fire, c imputed low: X and Y tie
        assert_eq!(resp.decision.reason, DecisionReason::TieBreak);
        assert_eq!(resp.label, "X");
        assert_eq!(resp.decision.second_best.label, "Y");
        assert!(resp.decision.margin >= 0.0);
    }

    #[test]
    fn test_client_errors() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());

        let err = svc.predict(&request(json!({"features": {"d": 5}}))).unwrap_err();
        assert!(matches!(err, StarlingError::UnknownFeature { ref name } if name == "d"));

        let err = svc.predict(&request(json!({"features": {}}))).unwrap_err();
        assert!(matches!(err, StarlingError::EmptyVector));

        let err = svc
            .predict(&request(json!({"features": {"a": 1.0}, "threshold": 1.5})))
            .unwrap_err();
        assert!(matches!(err, StarlingError::InvalidThreshold { .. }));

        let err = svc
            .predict(&request(json!({"features": {"a": "abc"}})))
            .unwrap_err();
        assert!(matches!(err, StarlingError::InvalidValue { ref name, .. } if name == "a"));
    }

    #[test]
    fn test_default_threshold_is_recommended() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let resp = svc.predict(&request(json!({"features": {"a": 1.0}}))).unwrap();
        let recommended = svc.metadata().unwrap().metrics.recommended_threshold;
        assert_eq!(resp.decision.threshold, recommended);
        assert_eq!(resp.decision.accepted, resp.decision.confidence >= recommended);
    }

    #[test]
    fn test_batch_keeps_order_and_names_failing_row() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());

        let rows: Vec<BatchRow> = serde_json::from_value(json!([
            {"features": {"a": 1.0}},
            {"b": 1.0},
            {"features": {"c": 1.0}},
        ]))
        .unwrap();
        let out = svc.batch_predict(rows).unwrap();
        let labels: Vec<&str> = out.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["X", "Y", "Z"]);

        let rows: Vec<BatchRow> =
            serde_json::from_value(json!([{"a": 1.0}, {"d": 1.0}, {"e": 1.0}])).unwrap();
        let err = svc.batch_predict(rows).unwrap_err();
        assert!(matches!(err, StarlingError::BatchItem { index: 1, .. }));
        assert_eq!(err.code(), "unknown_feature");

        assert!(matches!(svc.batch_predict(vec![]), Err(StarlingError::EmptyBatch)));
    }

    #[test]
    fn test_echo_sample_round_trips_through_predict() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        for _ in 0..4 {
            let sample = svc.echo_sample().unwrap();
            let json = serde_json::to_value(&sample).unwrap();
            let req = request(json!({"features": json["features"]}));
            svc.predict(&req).unwrap();
        }
    }

    #[test]
    fn test_metadata_and_metrics_documents() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());

        let meta = serde_json::to_value(svc.metadata().unwrap()).unwrap();
        assert_eq!(meta["features"], json!(["a", "b", "c"]));
        assert_eq!(meta["labels"], json!(["X", "Y", "Z"]));
        assert_eq!(meta["version"], "v1");
        assert_eq!(meta["metrics"]["n_test"], 7);

        let info = svc.feature_info().unwrap();
        assert_eq!(info["a"].unit, "mm");
        assert_eq!(info.len(), 3);

        let full = serde_json::to_value(svc.metrics_full().unwrap()).unwrap();
        assert_eq!(full["confusion_matrix"].as_array().unwrap().len(), 3);
        assert!(full["roc"]["X"]["fpr"].is_array());
        assert!(full["search"]["best_params"].is_object());
    }

    #[test]
    fn test_unloaded_service() {
        let svc = Service::new(Arc::new(ModelRegistry::new(StarlingConfig::default())));
        assert!(matches!(svc.metadata(), Err(StarlingError::ModelUnavailable)));
        let health = svc.health();
        assert!(!health.ok);
        assert!(health.model_version.is_none());
    }
}
