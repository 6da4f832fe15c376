//! TOML configuration of receptive field and most exciting image runs.

use std::{fs::read_to_string, path::{Path, PathBuf}};
use serde::Deserialize;
use crate::error::ConfigError;
use crate::mei::MeiParameters;
use crate::search::default_factors;
use crate::spectral::DEFAULT_SMOOTHING;


/// Where work runs and how randomness is seeded
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Seed of the random generator
    pub seed: u64,
    /// Size of the worker pool, `0` runs sequentially
    pub threads: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig { seed: 42, threads: 0 }
    }
}

/// Settings of a linear receptive field estimation
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReceptiveFieldConfig {
    /// Persisted `(images, channels, height, width)` training images
    pub train_images: Option<PathBuf>,
    /// Persisted `(images, neurons)` training responses
    pub train_responses: Option<PathBuf>,
    /// Persisted held out images
    pub validation_images: Option<PathBuf>,
    /// Persisted held out responses
    pub validation_responses: Option<PathBuf>,
    /// Number of synthetic training images when no data is given
    pub synthetic_images: usize,
    /// Number of synthetic held out images when no data is given
    pub synthetic_validation_images: usize,
    /// Number of synthetic neurons when no data is given
    pub synthetic_neurons: usize,
    /// Height of synthetic images
    pub height: usize,
    /// Width of synthetic images
    pub width: usize,
    /// Standard deviation of the noise added to synthetic responses
    pub noise: f64,
    /// `raw`, `whitened`, `ridge` or `laplace`
    pub regularization_type: String,
    /// `global` or `individual`
    pub granularity: String,
    /// Candidate factors, defaults to `10^linspace(0, 2, 7)`
    pub factors: Option<Vec<f64>>,
    /// Also store every receptive field on its own
    pub store_images: bool,
    /// Directory receiving reports and filters
    pub output_dir: PathBuf,
}

impl Default for ReceptiveFieldConfig {
    fn default() -> Self {
        ReceptiveFieldConfig {
            train_images: None,
            train_responses: None,
            validation_images: None,
            validation_responses: None,
            synthetic_images: 500,
            synthetic_validation_images: 100,
            synthetic_neurons: 5,
            height: 8,
            width: 8,
            noise: 0.5,
            regularization_type: String::from("ridge"),
            granularity: String::from("global"),
            factors: None,
            store_images: false,
            output_dir: PathBuf::from("reports/linear_filter"),
        }
    }
}

impl ReceptiveFieldConfig {
    /// Configured factors or the default grid
    pub fn candidate_factors(&self) -> Vec<f64> {
        self.factors.clone().unwrap_or_else(default_factors)
    }
}

/// Settings of a most exciting image run
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MeiConfig {
    /// Persisted `(neurons, channels, height, width)` filter used as the scoring model,
    /// when missing the filter fitted in the same run is used
    pub filter: Option<PathBuf>,
    /// Neurons to optimize, defaults to every neuron of the model
    pub neurons: Option<Vec<usize>>,
    pub epochs: usize,
    pub lr_start: f64,
    pub lr_end: f64,
    pub sigma_start: f64,
    pub sigma_end: f64,
    pub step_gain: f64,
    /// Lowpass smoothing exponent (alpha)
    pub smoothing: f64,
    /// Standard deviation of the white noise seed image
    pub seed_std: f64,
    /// Directory receiving the images
    pub output_dir: PathBuf,
}

impl Default for MeiConfig {
    fn default() -> Self {
        let parameters = MeiParameters::default();

        MeiConfig {
            filter: None,
            neurons: None,
            epochs: parameters.epochs,
            lr_start: parameters.lr_start,
            lr_end: parameters.lr_end,
            sigma_start: parameters.sigma_start,
            sigma_end: parameters.sigma_end,
            step_gain: parameters.step_gain,
            smoothing: DEFAULT_SMOOTHING,
            seed_std: 1.,
            output_dir: PathBuf::from("data/processed/MEIs"),
        }
    }
}

impl MeiConfig {
    pub fn parameters(&self) -> MeiParameters {
        MeiParameters {
            epochs: self.epochs,
            lr_start: self.lr_start,
            lr_end: self.lr_end,
            sigma_start: self.sigma_start,
            sigma_end: self.sigma_end,
            step_gain: self.step_gain,
            smoothing: self.smoothing,
        }
    }
}

/// Full configuration file, at least one of `receptive_field` or `mei` must be present
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub execution: ExecutionConfig,
    pub receptive_field: Option<ReceptiveFieldConfig>,
    pub mei: Option<MeiConfig>,
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;

        if config.receptive_field.is_none() && config.mei.is_none() {
            return Err(ConfigError::Missing(String::from("receptive_field or mei")));
        }

        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::from_toml(&read_to_string(path)?)
    }
}
