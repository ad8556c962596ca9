//! Service configuration
//!
//! Loaded from `starling.toml`. Every key is optional:
//!
//! ```toml
//! # starling.toml
//! artifacts_dir = "artifacts"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8000
//!
//! [decision]
//! default_threshold = 0.6   # omit to use the recommended threshold
//! top_k = 5
//!
//! [metrics]
//! calibration_bins = 10
//! top_confusions = 5
//! target_precision = 0.9
//!
//! [samples]
//! policy = "round_robin"    # or "random"
//! seed = 7
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE: &str = "starling.toml";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StarlingConfig {
    /// Directory holding one model version's artifacts
    pub artifacts_dir: PathBuf,
    pub server: ServerConfig,
    pub decision: DecisionConfig,
    pub metrics: MetricsConfig,
    pub samples: SampleConfig,
}

impl Default for StarlingConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            server: ServerConfig::default(),
            decision: DecisionConfig::default(),
            metrics: MetricsConfig::default(),
            samples: SampleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Threshold used when a request carries none. Falls back to the
    /// recommended threshold of the loaded metrics snapshot.
    pub default_threshold: Option<f64>,
    /// Factors returned per prediction unless the request overrides it
    pub top_k: usize,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            default_threshold: None,
            top_k: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub calibration_bins: usize,
    pub top_confusions: usize,
    /// Precision the recommended threshold has to reach
    pub target_precision: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            calibration_bins: 10,
            top_confusions: 5,
            target_precision: 0.9,
        }
    }
}

/// How the demonstration pool is walked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplePolicy {
    #[default]
    RoundRobin,
    Random,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SampleConfig {
    pub policy: SamplePolicy,
    /// Seed for the `random` policy; identical seeds replay identical draws
    pub seed: u64,
}

impl StarlingConfig {
    /// Load configuration, with priority:
    /// 1. Environment variables (highest)
    /// 2. `explicit` path, else `./starling.toml`, else the user config
    ///    (`~/.config/starling/config.toml`)
    ///
    /// A missing file means defaults; an unreadable or invalid one is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match Self::locate(explicit) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        Self::user_config_path().filter(|p| p.exists())
    }

    /// Get the user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("starling").join("config.toml"))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: StarlingConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `STARLING_*` overrides. `ARTIFACTS_DIR` is honoured when the
    /// prefixed variable is unset.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = var("STARLING_ARTIFACTS_DIR").or_else(|| var("ARTIFACTS_DIR")) {
            self.artifacts_dir = PathBuf::from(dir);
        }
        if let Some(host) = var("STARLING_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("STARLING_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("STARLING_PORT is not a port number: {port:?}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.decision.default_threshold {
            if !(t > 0.0 && t < 1.0) {
                bail!("decision.default_threshold must lie in (0, 1), got {t}");
            }
        }
        if self.decision.top_k == 0 {
            bail!("decision.top_k must be at least 1");
        }
        if self.metrics.calibration_bins == 0 {
            bail!("metrics.calibration_bins must be at least 1");
        }
        let p = self.metrics.target_precision;
        if !(p > 0.0 && p <= 1.0) {
            bail!("metrics.target_precision must lie in (0, 1], got {p}");
        }
        Ok(())
    }
}
