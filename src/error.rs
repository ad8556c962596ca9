//! Error taxonomy for the inference core
//!
//! Client input problems name the offending key or value so callers can fix
//! the request. `ModelUnavailable` means no bundle is published and the
//! operator has to load one; nothing in the core retries.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the inference, explanation and metrics layers
#[derive(Error, Debug)]
pub enum StarlingError {
    #[error("unknown feature: {name}")]
    UnknownFeature { name: String },

    #[error("invalid value for feature {name}: {value}")]
    InvalidValue { name: String, value: String },

    #[error("feature vector has no present values")]
    EmptyVector,

    #[error("threshold must lie in (0, 1), got {value}")]
    InvalidThreshold { value: f64 },

    #[error("top_k must be at least 1, got {value}")]
    InvalidTopK { value: usize },

    #[error("batch must contain at least one row")]
    EmptyBatch,

    #[error("row {index}: {source}")]
    BatchItem {
        index: usize,
        #[source]
        source: Box<StarlingError>,
    },

    #[error("invalid probability distribution: {0}")]
    InvalidProbabilities(String),

    #[error("no demonstration samples available")]
    NoSamples,

    #[error("no model version is loaded")]
    ModelUnavailable,

    #[error("invalid artifact {}: {reason}", path.display())]
    Artifact { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("metrics computation failed: {0}")]
    Metrics(String),

    #[error("reload failed, previous model version stays live: {0}")]
    ReloadFailed(#[source] Box<StarlingError>),
}

pub type StarlingResult<T> = Result<T, StarlingError>;

/// Coarse classification used by transports to pick a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller sent something invalid (4xx)
    Client,
    /// Requested resource does not exist (404)
    NotFound,
    /// No model is loaded (503)
    Unavailable,
    /// Anything else (500)
    Internal,
}

impl StarlingError {
    pub fn artifact(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Artifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownFeature { .. }
            | Self::InvalidValue { .. }
            | Self::EmptyVector
            | Self::InvalidThreshold { .. }
            | Self::InvalidTopK { .. }
            | Self::EmptyBatch => ErrorKind::Client,
            Self::BatchItem { source, .. } => source.kind(),
            Self::NoSamples => ErrorKind::NotFound,
            Self::ModelUnavailable => ErrorKind::Unavailable,
            Self::Artifact { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Csv(_)
            | Self::InvalidProbabilities(_)
            | Self::Metrics(_)
            | Self::ReloadFailed(_) => ErrorKind::Internal,
        }
    }

    /// Stable snake_case code for response bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownFeature { .. } => "unknown_feature",
            Self::InvalidValue { .. } => "invalid_value",
            Self::EmptyVector => "empty_vector",
            Self::InvalidThreshold { .. } => "invalid_threshold",
            Self::InvalidTopK { .. } => "invalid_top_k",
            Self::EmptyBatch => "empty_batch",
            Self::BatchItem { source, .. } => source.code(),
            Self::InvalidProbabilities(_) => "invalid_probabilities",
            Self::NoSamples => "no_samples",
            Self::ModelUnavailable => "model_unavailable",
            Self::Artifact { .. } => "artifact",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Csv(_) => "csv",
            Self::Metrics(_) => "metrics",
            Self::ReloadFailed(_) => "reload_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_name_offender() {
        let err = StarlingError::UnknownFeature { name: "d".into() };
        assert_eq!(err.kind(), ErrorKind::Client);
        assert!(err.to_string().contains('d'));

        let err = StarlingError::InvalidValue {
            name: "period".into(),
            value: "abc".into(),
        };
        assert!(err.to_string().contains("period"));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_batch_item_inherits_kind() {
        let err = StarlingError::BatchItem {
            index: 3,
            source: Box::new(StarlingError::EmptyVector),
        };
        assert_eq!(err.kind(), ErrorKind::Client);
        assert_eq!(err.code(), "empty_vector");
        assert!(err.to_string().starts_with("row 3"));
    }

    #[test]
    fn test_model_unavailable_is_not_client_error() {
        assert_eq!(StarlingError::ModelUnavailable.kind(), ErrorKind::Unavailable);
        assert_eq!(StarlingError::NoSamples.kind(), ErrorKind::NotFound);
        let wrapped = StarlingError::ReloadFailed(Box::new(StarlingError::Metrics("x".into())));
        assert_eq!(wrapped.kind(), ErrorKind::Internal);
    }
}
