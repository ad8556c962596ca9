//! Model bundle and the process-wide registry that publishes it
//!
//! A [`ModelBundle`] is everything that belongs to one model version: schema,
//! forest, importance source, metrics snapshot and sample pool. Bundles are
//! built completely before they become visible and are never mutated after
//! that, so readers can hold an `Arc` to one for as long as they like.
//!
//! [`ModelRegistry`] owns the single "current bundle" reference. Readers
//! clone the `Arc` under a short read lock. Reloads are serialised by a
//! separate mutex and publish with one pointer swap; a failed reload leaves
//! the previous bundle in place.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::StarlingConfig;
use crate::error::{StarlingError, StarlingResult};
use crate::explain::{ImportanceKind, ImportanceSource};
use crate::metrics::MetricsSnapshot;
use crate::model::artifact::{self, HOLDOUT_FILE, SAMPLES_FILE};
use crate::model::{ForestClassifier, ModelFile, TrainingSummary};
use crate::sample::SampleProvider;
use crate::schema::{FeatureSchema, FeatureSpec};

/// One fully loaded model version
#[derive(Debug)]
pub struct ModelBundle {
    pub version: String,
    pub schema: FeatureSchema,
    pub forest: ForestClassifier,
    pub importance: ImportanceSource,
    pub metrics: MetricsSnapshot,
    pub samples: SampleProvider,
    pub loaded_at: DateTime<Utc>,
    pub source_dir: PathBuf,
}

impl ModelBundle {
    /// Load every artifact in `dir` and derive the metrics snapshot.
    pub fn load(dir: &Path, config: &StarlingConfig) -> StarlingResult<Self> {
        let start = Instant::now();

        let (file, version) = ModelFile::load(dir)?;
        let mut info = artifact::load_feature_info(dir)?;
        let features: Vec<FeatureSpec> = file
            .features
            .iter()
            .map(|name| FeatureSpec {
                name: name.clone(),
                info: info.shift_remove(name),
            })
            .collect();
        if let Some(unknown) = info.keys().next() {
            return Err(StarlingError::artifact(
                dir.join(artifact::FEATURE_INFO_FILE),
                format!("metadata for unknown feature {unknown:?}"),
            ));
        }
        let schema = FeatureSchema::new(features, file.labels.clone())?;

        let forest = ForestClassifier::from_file(&file, &schema)?;
        let importance = ImportanceSource::resolve(&forest);
        if importance.kind() == ImportanceKind::Global {
            warn!(version = %version, "Model lacks node covers; explanations use global gain importance");
        }

        let summary = TrainingSummary::load(dir)?;
        let holdout = artifact::read_rows(&dir.join(HOLDOUT_FILE), &schema, true)?;
        let metrics = MetricsSnapshot::compute(
            &forest,
            &importance,
            &schema,
            &holdout,
            &summary,
            &config.metrics,
        )?;

        let samples_path = dir.join(SAMPLES_FILE);
        let samples = if samples_path.exists() {
            let pool = artifact::read_rows(&samples_path, &schema, false)?;
            SampleProvider::new(pool, &holdout, &config.samples)
        } else {
            warn!("No {} in {}; echo-sample is disabled", SAMPLES_FILE, dir.display());
            SampleProvider::empty()
        };

        info!(
            version = %version,
            features = schema.len(),
            trees = forest.num_trees(),
            holdout = holdout.len(),
            samples = samples.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model bundle loaded"
        );

        Ok(Self {
            version,
            schema,
            forest,
            importance,
            metrics,
            samples,
            loaded_at: Utc::now(),
            source_dir: dir.to_path_buf(),
        })
    }
}

/// Holder of the current model version
pub struct ModelRegistry {
    config: StarlingConfig,
    current: RwLock<Option<Arc<ModelBundle>>>,
    /// Single writer for reloads
    reload_lock: Mutex<()>,
}

impl ModelRegistry {
    pub fn new(config: StarlingConfig) -> Self {
        Self {
            config,
            current: RwLock::new(None),
            reload_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &StarlingConfig {
        &self.config
    }

    /// Snapshot of the current bundle; `ModelUnavailable` before the first
    /// successful load.
    pub fn current(&self) -> StarlingResult<Arc<ModelBundle>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StarlingError::ModelUnavailable)
    }

    pub fn is_loaded(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Swap in `bundle`, returning the one it replaces.
    pub fn publish(&self, bundle: ModelBundle) -> Option<Arc<ModelBundle>> {
        let bundle = Arc::new(bundle);
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        slot.replace(bundle)
    }

    /// Build a bundle from `dir` (default: the current bundle's directory,
    /// else the configured one) and publish it.
    ///
    /// Any failure is wrapped in `ReloadFailed` and the previous bundle stays
    /// live.
    pub fn reload(&self, dir: Option<&Path>) -> StarlingResult<Arc<ModelBundle>> {
        let _writer = self.reload_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => self
                .current()
                .map(|b| b.source_dir.clone())
                .unwrap_or_else(|_| self.config.artifacts_dir.clone()),
        };

        let bundle = match ModelBundle::load(&dir, &self.config) {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Reload failed; keeping current model");
                return Err(StarlingError::ReloadFailed(Box::new(e)));
            }
        };

        let version = bundle.version.clone();
        let previous = self.publish(bundle);
        info!(
            version = %version,
            previous = previous.as_ref().map(|b| b.version.as_str()).unwrap_or("none"),
            "Model version published"
        );
        self.current()
    }
}
