//! Configuration module for Starling
//!
//! This module handles:
//! - Service configuration (starling.toml)
//! - Environment overrides
//! - Decision, metrics and sampling defaults

mod starling_config;

pub use starling_config::{
    DecisionConfig, MetricsConfig, SampleConfig, SamplePolicy, ServerConfig, StarlingConfig,
    CONFIG_FILE,
};
