//! First-order MAML for [`PointPolicy`].
//!
//! Inner step per task:
//! ```text
//! θ'_i = θ_i + α [(1 - w) g_on(θ_i) + w g_off(θ_i)]
//! ```
//! where `g` is the advantage-weighted score function and `w` the off-policy
//! weight (`w = 0` for `adapt`, or when a task has no off-policy samples).
//!
//! Outer step (first-order approximation): the meta-gradient is the task
//! average of `g_on` evaluated at the adapted parameters on the last inner
//! pass, applied directly to the meta-parameters.

use anyhow::ensure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::meta_algorithm::MetaAlgorithm;
use crate::core::{ProcessedBatch, TaskId};
use crate::policy::{GaussianParams, PointPolicy};
use crate::trainer::ConfigError;

/// Configuration for [`FirstOrderMaml`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MamlConfig {
    /// Inner learning rate (α)
    pub inner_lr: f32,
    /// Outer learning rate (β)
    pub outer_lr: f32,
    /// Weight of the off-policy gradient in the assisted inner step
    pub off_policy_weight: f32,
    /// Gradients are rescaled to at most this norm
    pub max_grad_norm: f32,
}

impl Default for MamlConfig {
    fn default() -> Self {
        Self {
            inner_lr: 0.1,
            outer_lr: 0.01,
            off_policy_weight: 0.5,
            max_grad_norm: 10.0,
        }
    }
}

impl MamlConfig {
    pub fn with_inner_lr(mut self, lr: f32) -> Self {
        self.inner_lr = lr;
        self
    }

    pub fn with_outer_lr(mut self, lr: f32) -> Self {
        self.outer_lr = lr;
        self
    }

    pub fn with_off_policy_weight(mut self, weight: f32) -> Self {
        self.off_policy_weight = weight;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.off_policy_weight) {
            return Err(ConfigError::OutOfRange {
                field: "off_policy_weight",
                value: self.off_policy_weight,
                min: 0.0,
                max: 1.0,
            });
        }
        if self.max_grad_norm <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "max_grad_norm",
                value: self.max_grad_norm,
                min: f32::MIN_POSITIVE,
                max: f32::INFINITY,
            });
        }
        Ok(())
    }
}

fn clip_by_norm(grad: &mut GaussianParams, max_norm: f32) -> f32 {
    let norm = grad.norm();
    if norm > max_norm {
        grad.scale(max_norm / norm);
    }
    norm
}

/// First-order MAML with off-policy assisted inner steps.
#[derive(Debug, Clone)]
pub struct FirstOrderMaml {
    config: MamlConfig,
    /// Adapted parameters of the last assisted inner step, per task
    inner_params: BTreeMap<TaskId, GaussianParams>,
    n_outer_steps: usize,
}

impl FirstOrderMaml {
    pub fn new(config: MamlConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            inner_params: BTreeMap::new(),
            n_outer_steps: 0,
        })
    }

    pub fn config(&self) -> &MamlConfig {
        &self.config
    }

    pub fn n_outer_steps(&self) -> usize {
        self.n_outer_steps
    }

    fn inner_step(
        &self,
        policy: &mut PointPolicy,
        samples: &ProcessedBatch,
        off_samples: Option<&ProcessedBatch>,
    ) {
        let w = self.config.off_policy_weight;
        for (&task_id, task) in &samples.tasks {
            let mut adapted = policy.params_for(task_id).clone();
            let mut grad = policy.surrogate_gradient(&adapted, task);

            let off_task = off_samples
                .and_then(|off| off.task(task_id))
                .filter(|t| !t.is_empty());
            if let Some(off_task) = off_task {
                let off_grad = policy.surrogate_gradient(&adapted, off_task);
                grad.scale(1.0 - w);
                grad.add_scaled(w, &off_grad);
            }

            clip_by_norm(&mut grad, self.config.max_grad_norm);
            adapted.add_scaled(self.config.inner_lr, &grad);
            policy.set_adapted(task_id, adapted);
        }
    }
}

impl MetaAlgorithm<PointPolicy> for FirstOrderMaml {
    fn adapt_off_value(
        &mut self,
        policy: &mut PointPolicy,
        samples: &ProcessedBatch,
        off_samples: &ProcessedBatch,
    ) -> anyhow::Result<()> {
        self.inner_step(policy, samples, Some(off_samples));
        self.inner_params = policy.adapted_params().clone();
        Ok(())
    }

    fn adapt(&mut self, policy: &mut PointPolicy, samples: &ProcessedBatch) -> anyhow::Result<()> {
        self.inner_step(policy, samples, None);
        Ok(())
    }

    fn optimize_policy(
        &mut self,
        policy: &mut PointPolicy,
        all_samples: &[ProcessedBatch],
    ) -> anyhow::Result<()> {
        ensure!(
            all_samples.len() >= 2,
            "expected inner-pass batches plus the off-policy batch, got {} batches",
            all_samples.len()
        );
        let last_inner = &all_samples[all_samples.len() - 2];

        let mut meta_grad = GaussianParams::zeros(policy.config().obs_dim, policy.config().action_dim);
        let mut n_tasks = 0usize;
        for (task_id, task) in &last_inner.tasks {
            if task.is_empty() {
                continue;
            }
            let params = self.inner_params.get(task_id).unwrap_or(policy.meta_params());
            meta_grad.add_scaled(1.0, &policy.surrogate_gradient(params, task));
            n_tasks += 1;
        }

        if n_tasks > 0 {
            meta_grad.scale(1.0 / n_tasks as f32);
            let grad_norm = clip_by_norm(&mut meta_grad, self.config.max_grad_norm);
            let mut meta = policy.meta_params().clone();
            meta.add_scaled(self.config.outer_lr, &meta_grad);
            policy.set_meta_params(meta);
            tracing::debug!(grad_norm, n_tasks, "meta-parameters updated");
        }

        self.inner_params.clear();
        self.n_outer_steps += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskSamples;
    use crate::policy::{MetaPolicy, PointPolicyConfig};

    fn zero_policy() -> PointPolicy {
        let mut policy = PointPolicy::new(PointPolicyConfig::new(2, 2));
        policy.set_meta_params(GaussianParams::zeros(2, 2));
        policy
    }

    fn task_samples(action: [f32; 2], advantage: f32) -> TaskSamples {
        TaskSamples {
            observations: vec![vec![0.0, 0.0]],
            actions: vec![action.to_vec()],
            rewards: vec![0.0],
            advantages: vec![advantage],
            ..Default::default()
        }
    }

    fn batch(entries: &[(TaskId, TaskSamples)]) -> ProcessedBatch {
        let mut batch = ProcessedBatch::default();
        for (id, samples) in entries {
            batch.tasks.insert(*id, samples.clone());
        }
        batch
    }

    fn maml(weight: f32) -> FirstOrderMaml {
        FirstOrderMaml::new(MamlConfig::default().with_off_policy_weight(weight)).unwrap()
    }

    #[test]
    fn test_adapt_moves_towards_advantaged_action() {
        let mut policy = zero_policy();
        let mut algo = maml(0.5);
        let samples = batch(&[(3, task_samples([1.0, 0.0], 1.0))]);

        algo.adapt(&mut policy, &samples).unwrap();

        assert!(!policy.is_pre_update());
        assert!(policy.params_for(3).bias[0] > 0.0);
        assert_eq!(policy.meta_params(), &GaussianParams::zeros(2, 2));
    }

    #[test]
    fn test_off_policy_samples_blend_into_inner_step() {
        let on = batch(&[(0, task_samples([1.0, 0.0], 1.0))]);
        let off = batch(&[(0, task_samples([-1.0, 0.0], 1.0))]);

        // Equal weight on opposite actions cancels out
        let mut policy = zero_policy();
        maml(0.5).adapt_off_value(&mut policy, &on, &off).unwrap();
        assert!(policy.params_for(0).bias[0].abs() < 1e-6);

        // Empty off-policy task falls back to the on-policy gradient
        let mut policy = zero_policy();
        let empty_off = batch(&[(0, TaskSamples::default())]);
        maml(0.5).adapt_off_value(&mut policy, &on, &empty_off).unwrap();
        assert!(policy.params_for(0).bias[0] > 0.0);
    }

    #[test]
    fn test_repeated_inner_steps_compound() {
        let mut policy = zero_policy();
        let mut algo = maml(0.0);
        let on = batch(&[(0, task_samples([1.0, 0.0], 1.0))]);
        let off = ProcessedBatch::default();

        algo.adapt_off_value(&mut policy, &on, &off).unwrap();
        let first = policy.params_for(0).bias[0];
        algo.adapt_off_value(&mut policy, &on, &off).unwrap();
        assert!(policy.params_for(0).bias[0] > first);

        policy.switch_to_pre_update();
        assert_eq!(policy.params_for(0).bias[0], 0.0);
    }

    #[test]
    fn test_optimize_updates_meta_parameters() {
        let mut policy = zero_policy();
        let mut algo = maml(0.5);
        let step_0 = batch(&[(0, task_samples([1.0, 0.0], 1.0))]);
        let step_1 = batch(&[(0, task_samples([0.0, 1.0], 1.0))]);
        let off = ProcessedBatch::default();

        algo.adapt_off_value(&mut policy, &step_0, &off).unwrap();
        algo.optimize_policy(&mut policy, &[step_0, step_1, off]).unwrap();

        assert!(policy.meta_params().bias[1] > 0.0);
        assert_eq!(algo.n_outer_steps(), 1);
    }

    #[test]
    fn test_optimize_rejects_short_sample_list() {
        let mut policy = zero_policy();
        let mut algo = maml(0.5);
        assert!(algo.optimize_policy(&mut policy, &[ProcessedBatch::default()]).is_err());
    }

    #[test]
    fn test_invalid_weight_rejected() {
        assert!(FirstOrderMaml::new(MamlConfig::default().with_off_policy_weight(2.0)).is_err());
    }
}
