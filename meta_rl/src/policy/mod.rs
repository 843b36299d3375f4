//! Meta-policies with pre-update and post-update parameter sets.
//!
//! The trainer owns the policy. It lends `&P` to the sampler and `&mut P` to
//! the algorithm, and forces the pre-update state with
//! [`MetaPolicy::switch_to_pre_update`] before every inner loop and before the
//! held-out evaluation.

pub mod point_policy;

pub use point_policy::{GaussianParams, PointPolicy, PointPolicyConfig};

use rand::RngCore;

use crate::core::{Path, StepInfo, TaskId};
use crate::metrics::KvAccumulator;

/// Parameter-state control used by the trainer.
pub trait MetaPolicy {
    /// Act with the meta-parameters again. Idempotent.
    fn switch_to_pre_update(&mut self);

    fn log_diagnostics(&self, _paths: &[&Path], _prefix: &str, _kv: &mut KvAccumulator) {}
}

/// Action selection used by samplers.
pub trait ActingPolicy: MetaPolicy {
    /// Action for `observation` under the parameters currently active for
    /// `task_id`, plus agent info recorded on the path.
    fn get_action(
        &self,
        observation: &[f32],
        task_id: TaskId,
        rng: &mut dyn RngCore,
    ) -> (Vec<f32>, StepInfo);
}
