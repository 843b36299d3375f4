//! Trajectory collection and off-policy storage.
//!
//! - [`Sampler`]: task selection and on-policy rollouts for a meta-batch
//! - [`OffPolicyBuffer`]: persistent per-task storage of earlier paths
//! - [`MetaSampler`] / [`TaskReplayBuffer`]: the in-process implementations

pub mod meta_sampler;
pub mod replay_buffer;

pub use meta_sampler::{MetaSampler, SamplerConfig};
pub use replay_buffer::{ReplayBufferConfig, TaskReplayBuffer};

use crate::core::{OffPolicyBatch, PathsPerTask, Task, TaskId};
use crate::metrics::KvAccumulator;

/// Per-task storage of previously collected paths.
pub trait OffPolicyBuffer {
    /// Draw `batch_size` paths for each of `task_ids`.
    ///
    /// Every requested id is a key of the result. With `batch_size = 0`, or
    /// for a task without stored paths, the entry is an empty vector.
    fn sample(&mut self, task_ids: &[TaskId], batch_size: usize) -> anyhow::Result<OffPolicyBatch>;

    fn add_paths(&mut self, paths: &PathsPerTask);

    /// Number of stored paths across all tasks.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Meta-batch sampler driven by the trainer.
pub trait Sampler<P> {
    type Buffer: OffPolicyBuffer;

    /// Reseed every generator. Calling it again with the same seeds restores
    /// the same state.
    fn set_seeds(&mut self, seeds: &[u64]);

    /// Select the task set for the next iteration.
    fn update_tasks_with_id(&mut self) -> anyhow::Result<(Vec<Task>, Vec<TaskId>)>;

    /// Roll out `policy` in every task of `task_ids`.
    ///
    /// When `log` is set, sampling statistics are recorded in `kv` under
    /// `log_prefix`.
    fn obtain_samples(
        &mut self,
        policy: &P,
        task_ids: &[TaskId],
        step_id: usize,
        log: bool,
        log_prefix: &str,
        kv: &mut KvAccumulator,
    ) -> anyhow::Result<PathsPerTask>;

    fn buffer(&self) -> &Self::Buffer;

    fn buffer_mut(&mut self) -> &mut Self::Buffer;

    /// Environment steps collected since construction.
    fn total_timesteps_sampled(&self) -> usize;
}
