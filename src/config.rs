//! Knowledge base configuration
//!
//! Resolution order (highest priority first):
//! 1. CLI flags / environment (`--store`, `--oracle`, applied via [`CliOverrides`])
//! 2. Config file (`--config` or `UNITFORGE_CONFIG`)
//! 3. Compiled defaults

use crate::core::scorer::Tolerance;
use crate::error::{KbError, KbResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default instruction used when generating training questions
pub const DEFAULT_TRAINING_PROMPT: &str =
    "Give me strings of unit conversion questions. The units must be simple and commonly used.";

/// Top-level configuration, passed explicitly to every component that needs it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KbConfig {
    pub store: StoreConfig,
    pub oracle: OracleConfig,
    pub acquisition: AcquisitionConfig,
    pub training: TrainingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Graph store file
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("conversions.yaml"),
        }
    }
}

/// Which language oracle answers questions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OracleBackend {
    /// Offline, catalog-driven rules
    #[default]
    Rule,
    /// OpenAI-compatible chat completions endpoint
    #[value(name = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub backend: OracleBackend,
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub temperature: f64,
    pub top_p: f64,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backend: OracleBackend::Rule,
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.0,
            top_p: 1.0,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Generation attempts before giving up
    pub max_attempts: usize,
    /// Minimum fraction of test cases a candidate must pass
    pub acceptance_threshold: f64,
    /// `author` provenance written on learned conversions
    pub author: String,
    pub tolerance: Tolerance,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            acceptance_threshold: 0.8,
            author: "unitforge".to_string(),
            tolerance: Tolerance::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub cycles: usize,
    pub questions_per_cycle: usize,
    /// Maximum questions resolved at the same time
    pub concurrency: usize,
    pub prompt: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            cycles: 1,
            questions_per_cycle: 10,
            concurrency: 8,
            prompt: DEFAULT_TRAINING_PROMPT.to_string(),
        }
    }
}

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub store_path: Option<PathBuf>,
    pub oracle: Option<OracleBackend>,
}

impl KbConfig {
    /// Load the config file (if any), apply overrides and validate.
    ///
    /// An explicitly named file must exist; without one the defaults are used.
    pub fn load(path: Option<&Path>, overrides: &CliOverrides) -> KbResult<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    KbError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_yaml(&content)?
            }
            None => Self::default(),
        };

        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document; missing sections and fields take their defaults
    pub fn from_yaml(yaml: &str) -> KbResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(path) = &overrides.store_path {
            self.store.path = path.clone();
        }
        if let Some(backend) = overrides.oracle {
            self.oracle.backend = backend;
        }
    }

    /// Reject values the acquisition loop cannot run with
    pub fn validate(&self) -> KbResult<()> {
        let acquisition = &self.acquisition;
        if acquisition.max_attempts == 0 {
            return Err(invalid("acquisition.max_attempts", "must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&acquisition.acceptance_threshold) {
            return Err(invalid(
                "acquisition.acceptance_threshold",
                "must be between 0.0 and 1.0",
            ));
        }
        let Tolerance { rel_tol, abs_tol } = acquisition.tolerance;
        if rel_tol.is_nan() || abs_tol.is_nan() || rel_tol < 0.0 || abs_tol < 0.0 {
            return Err(invalid("acquisition.tolerance", "must not be negative"));
        }
        if self.training.concurrency == 0 {
            return Err(invalid("training.concurrency", "must be greater than 0"));
        }
        if !(0.0..=2.0).contains(&self.oracle.temperature) {
            return Err(invalid("oracle.temperature", "must be between 0.0 and 2.0"));
        }
        if !(0.0..=1.0).contains(&self.oracle.top_p) {
            return Err(invalid("oracle.top_p", "must be between 0.0 and 1.0"));
        }
        if self.store.path.as_os_str().is_empty() {
            return Err(invalid("store.path", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> KbError {
    KbError::Config(format!("{} {}", field, message))
}
