//! Meta-environment abstraction.
//!
//! A meta-environment owns a fixed pool of tasks. The sampler selects a task
//! with [`MetaEnv::set_task`], then rolls out episodes with
//! [`MetaEnv::reset`] / [`MetaEnv::step`].

pub mod point_env;

pub use point_env::{PointEnv, PointEnvConfig};

use rand::RngCore;

use crate::core::{Path, StepInfo, Task, TaskId};
use crate::metrics::KvAccumulator;

/// Result of a single environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvStep {
    pub observation: Vec<f32>,
    pub reward: f32,
    /// Episode ended (goal reached or failure)
    pub done: bool,
    pub info: StepInfo,
}

impl EnvStep {
    pub fn new(observation: Vec<f32>, reward: f32, done: bool) -> Self {
        Self {
            observation,
            reward,
            done,
            info: StepInfo::new(),
        }
    }

    pub fn with_info(mut self, key: impl Into<String>, value: f32) -> Self {
        self.info.insert(key.into(), value);
        self
    }
}

/// Environment with a finite pool of tasks.
pub trait MetaEnv {
    /// Size of the task pool. Task ids are `0..n_tasks()`.
    fn n_tasks(&self) -> usize;

    /// Descriptor of task `id`.
    fn task(&self, id: TaskId) -> anyhow::Result<Task>;

    /// Switch the active task.
    fn set_task(&mut self, id: TaskId) -> anyhow::Result<()>;

    fn observation_dim(&self) -> usize;

    fn action_dim(&self) -> usize;

    /// Start a new episode in the active task.
    fn reset(&mut self, rng: &mut dyn RngCore) -> Vec<f32>;

    fn step(&mut self, action: &[f32]) -> EnvStep;

    fn log_diagnostics(&self, _paths: &[&Path], _prefix: &str, _kv: &mut KvAccumulator) {}
}
