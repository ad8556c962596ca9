//! Starling - inference and explainability service for a tabular classifier
//!
//! Loads one pre-trained boosted-tree model version at a time, validates
//! feature vectors against its schema, produces probabilities, thresholded
//! decisions and ranked per-feature explanations, and serves a metrics
//! snapshot computed once from the held-out evaluation set.
//!
//! Prediction flow:
//! raw mapping -> [`schema::FeatureVector::validate`] -> [`model::ForestClassifier::infer`]
//! -> [`decision::decide`] + [`explain::ImportanceSource::explain`]

pub mod config;
pub mod decision;
pub mod error;
pub mod explain;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod sample;
pub mod schema;
pub mod server;
pub mod service;

pub use error::{ErrorKind, StarlingError, StarlingResult};
pub use registry::{ModelBundle, ModelRegistry};
pub use service::Service;
