//! Trainer run configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A count parameter must be positive.
    #[error("{field} must be > 0, got {value}")]
    InvalidCount { field: &'static str, value: usize },
    /// A parameter is outside its valid range.
    #[error("{field} must be in [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },
    /// Resumption offset past the last iteration.
    #[error("start_itr ({start_itr}) must not exceed n_itr ({n_itr})")]
    InvalidStartItr { start_itr: usize, n_itr: usize },
    /// Configuration document could not be parsed.
    #[error("invalid configuration document: {0}")]
    Parse(String),
}

/// Configuration of a meta-training run.
///
/// # Example
///
/// ```rust,ignore
/// let config = TrainerConfig::default()
///     .with_n_itr(500)
///     .with_num_inner_grad_steps(1)
///     .with_seeds(vec![1, 2, 3])
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Iterations run are `start_itr..n_itr`
    pub n_itr: usize,
    /// Iterations already trained when resuming (0 = fresh run)
    pub start_itr: usize,
    /// Inner adaptation steps; the inner loop samples this many plus one times
    pub num_inner_grad_steps: usize,
    /// Off-policy paths drawn per task per iteration
    pub sample_batch_size: usize,
    /// Applied to the sampler once at the start of `train`
    pub seeds: Vec<u64>,
    /// Soft target-update coefficient for critic targets
    pub tau: f32,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            n_itr: 1000,
            start_itr: 0,
            num_inner_grad_steps: 1,
            sample_batch_size: 32,
            seeds: vec![0],
            tau: 0.005,
        }
    }
}

impl TrainerConfig {
    /// Parse from JSON. Missing fields take their default.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.build()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_itr == 0 {
            return Err(ConfigError::InvalidCount {
                field: "n_itr",
                value: 0,
            });
        }
        if self.start_itr > self.n_itr {
            return Err(ConfigError::InvalidStartItr {
                start_itr: self.start_itr,
                n_itr: self.n_itr,
            });
        }
        if !(0.0..=1.0).contains(&self.tau) {
            return Err(ConfigError::OutOfRange {
                field: "tau",
                value: self.tau,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    /// Number of iterations `train` will run.
    pub fn n_iterations(&self) -> usize {
        self.n_itr.saturating_sub(self.start_itr)
    }

    pub fn with_n_itr(mut self, n_itr: usize) -> Self {
        self.n_itr = n_itr;
        self
    }

    pub fn with_start_itr(mut self, start_itr: usize) -> Self {
        self.start_itr = start_itr;
        self
    }

    pub fn with_num_inner_grad_steps(mut self, steps: usize) -> Self {
        self.num_inner_grad_steps = steps;
        self
    }

    pub fn with_sample_batch_size(mut self, size: usize) -> Self {
        self.sample_batch_size = size;
        self
    }

    pub fn with_seeds(mut self, seeds: Vec<u64>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn with_tau(mut self, tau: f32) -> Self {
        self.tau = tau;
        self
    }
}
