//! Linear Gaussian policy for low-dimensional continuous control.
//!
//! ```text
//! a ~ N(W s + b, diag(exp(log_std))²)
//! ```
//!
//! The meta-parameters `(W, b)` are shared; each task may hold adapted
//! parameters produced by an inner update. `log_std` is fixed.

use rand::{Rng, RngCore, SeedableRng};
use rand_distr::{Distribution, Normal, StandardNormal};
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{ActingPolicy, MetaPolicy};
use crate::core::{Path, StepInfo, TaskId, TaskSamples};
use crate::metrics::KvAccumulator;

/// Configuration for [`PointPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPolicyConfig {
    pub obs_dim: usize,
    pub action_dim: usize,
    /// Standard deviation of the action noise
    pub init_std: f32,
    /// Standard deviation of the initial weights
    pub init_scale: f32,
    pub seed: u64,
}

impl PointPolicyConfig {
    pub fn new(obs_dim: usize, action_dim: usize) -> Self {
        Self {
            obs_dim,
            action_dim,
            init_std: 0.5,
            init_scale: 0.01,
            seed: 0,
        }
    }

    pub fn with_init_std(mut self, std: f32) -> Self {
        self.init_std = std;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Mean parameters of the Gaussian: row-major `W` (`action_dim x obs_dim`)
/// and `b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianParams {
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl GaussianParams {
    pub fn zeros(obs_dim: usize, action_dim: usize) -> Self {
        Self {
            weights: vec![0.0; obs_dim * action_dim],
            bias: vec![0.0; action_dim],
        }
    }

    /// `self += alpha * other`
    pub fn add_scaled(&mut self, alpha: f32, other: &GaussianParams) {
        for (w, g) in self.weights.iter_mut().zip(&other.weights) {
            *w += alpha * g;
        }
        for (b, g) in self.bias.iter_mut().zip(&other.bias) {
            *b += alpha * g;
        }
    }

    pub fn scale(&mut self, alpha: f32) {
        self.weights.iter_mut().chain(self.bias.iter_mut()).for_each(|x| *x *= alpha);
    }

    pub fn norm(&self) -> f32 {
        self.weights
            .iter()
            .chain(&self.bias)
            .map(|x| x * x)
            .sum::<f32>()
            .sqrt()
    }
}

/// Linear Gaussian meta-policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointPolicy {
    config: PointPolicyConfig,
    log_std: Vec<f32>,
    meta: GaussianParams,
    adapted: BTreeMap<TaskId, GaussianParams>,
    pre_update: bool,
}

impl PointPolicy {
    pub fn new(config: PointPolicyConfig) -> Self {
        let mut rng = Xoshiro256StarStar::seed_from_u64(config.seed);
        let mut meta = GaussianParams::zeros(config.obs_dim, config.action_dim);
        if let Ok(init) = Normal::new(0.0, config.init_scale) {
            meta.weights.iter_mut().for_each(|w| *w = init.sample(&mut rng));
        }
        let log_std = vec![config.init_std.max(1e-6).ln(); config.action_dim];

        Self {
            config,
            log_std,
            meta,
            adapted: BTreeMap::new(),
            pre_update: true,
        }
    }

    pub fn config(&self) -> &PointPolicyConfig {
        &self.config
    }

    pub fn is_pre_update(&self) -> bool {
        self.pre_update
    }

    pub fn meta_params(&self) -> &GaussianParams {
        &self.meta
    }

    pub fn set_meta_params(&mut self, params: GaussianParams) {
        self.meta = params;
    }

    /// Install adapted parameters for `task_id` and act with them.
    pub fn set_adapted(&mut self, task_id: TaskId, params: GaussianParams) {
        self.adapted.insert(task_id, params);
        self.pre_update = false;
    }

    pub fn adapted_params(&self) -> &BTreeMap<TaskId, GaussianParams> {
        &self.adapted
    }

    /// Parameters currently used to act in `task_id`.
    pub fn params_for(&self, task_id: TaskId) -> &GaussianParams {
        if self.pre_update {
            return &self.meta;
        }
        self.adapted.get(&task_id).unwrap_or(&self.meta)
    }

    pub fn std(&self) -> Vec<f32> {
        self.log_std.iter().map(|l| l.exp()).collect()
    }

    pub fn mean(&self, params: &GaussianParams, observation: &[f32]) -> Vec<f32> {
        let obs_dim = self.config.obs_dim;
        (0..self.config.action_dim)
            .map(|i| {
                let row = &params.weights[i * obs_dim..(i + 1) * obs_dim];
                row.iter().zip(observation).map(|(w, o)| w * o).sum::<f32>() + params.bias[i]
            })
            .collect()
    }

    /// Advantage-weighted score function averaged over the samples:
    ///
    /// ```text
    /// g = 1/N Σ_t A_t ∇ log π(a_t | s_t)
    /// ```
    ///
    /// Returns zeros when `samples` is empty.
    pub fn surrogate_gradient(&self, params: &GaussianParams, samples: &TaskSamples) -> GaussianParams {
        let obs_dim = self.config.obs_dim;
        let mut grad = GaussianParams::zeros(obs_dim, self.config.action_dim);
        if samples.is_empty() {
            return grad;
        }

        let var: Vec<f32> = self.std().iter().map(|s| s * s).collect();
        for ((obs, action), &adv) in samples
            .observations
            .iter()
            .zip(&samples.actions)
            .zip(&samples.advantages)
        {
            let mean = self.mean(params, obs);
            for i in 0..self.config.action_dim {
                let score = adv * (action[i] - mean[i]) / var[i];
                grad.bias[i] += score;
                for (j, o) in obs.iter().enumerate().take(obs_dim) {
                    grad.weights[i * obs_dim + j] += score * o;
                }
            }
        }
        grad.scale(1.0 / samples.len() as f32);
        grad
    }
}

impl MetaPolicy for PointPolicy {
    fn switch_to_pre_update(&mut self) {
        self.pre_update = true;
        self.adapted.clear();
    }

    fn log_diagnostics(&self, _paths: &[&Path], prefix: &str, kv: &mut KvAccumulator) {
        let std = self.std();
        let avg = std.iter().sum::<f32>() / std.len().max(1) as f32;
        kv.logkv(format!("{}AveragePolicyStd", prefix), avg);
    }
}

impl ActingPolicy for PointPolicy {
    fn get_action(
        &self,
        observation: &[f32],
        task_id: TaskId,
        rng: &mut dyn RngCore,
    ) -> (Vec<f32>, StepInfo) {
        let mean = self.mean(self.params_for(task_id), observation);
        let action = mean
            .iter()
            .zip(&self.log_std)
            .map(|(m, l)| {
                let z: f32 = rng.sample(StandardNormal);
                m + l.exp() * z
            })
            .collect();

        let mut info = StepInfo::new();
        for (i, m) in mean.iter().enumerate() {
            info.insert(format!("mean_{}", i), *m);
        }
        (action, info)
    }
}
