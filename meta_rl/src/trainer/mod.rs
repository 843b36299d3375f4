//! Meta-training orchestration.
//!
//! - [`TrainerConfig`]: run configuration (iterations, inner steps, seeds)
//! - [`MetaTrainer`]: the off-policy assisted outer loop
//! - [`TrainingResult`]: per-iteration returns of a completed run

pub mod config;
pub mod meta_trainer;

pub use config::{ConfigError, TrainerConfig};
pub use meta_trainer::{CriticSet, IterationSnapshot, MetaTrainer, TrainError, TrainingResult};
