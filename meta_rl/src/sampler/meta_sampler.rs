//! Sequential meta-batch sampler.
//!
//! Rolls out the policy in every task of the meta-batch, one episode after
//! another. Collected paths are returned to the caller; the replay buffer
//! only receives what the caller hands it through [`Sampler::buffer_mut`].

use anyhow::ensure;
use rand::{seq::index, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};

use super::replay_buffer::{ReplayBufferConfig, TaskReplayBuffer};
use super::Sampler;
use crate::core::{count_timesteps, Path, PathsPerTask, Task, TaskId};
use crate::env::MetaEnv;
use crate::metrics::KvAccumulator;
use crate::policy::ActingPolicy;

/// Configuration for [`MetaSampler`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Tasks per meta-batch
    pub meta_batch_size: usize,
    /// Episodes per task per `obtain_samples` call
    pub rollouts_per_meta_task: usize,
    /// Episode step limit
    pub max_path_length: usize,
    pub buffer: ReplayBufferConfig,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            meta_batch_size: 10,
            rollouts_per_meta_task: 5,
            max_path_length: 100,
            buffer: ReplayBufferConfig::default(),
        }
    }
}

impl SamplerConfig {
    pub fn with_meta_batch_size(mut self, n: usize) -> Self {
        self.meta_batch_size = n;
        self
    }

    pub fn with_rollouts_per_meta_task(mut self, n: usize) -> Self {
        self.rollouts_per_meta_task = n;
        self
    }

    pub fn with_max_path_length(mut self, n: usize) -> Self {
        self.max_path_length = n;
        self
    }
}

/// Derive one generator seed from the configured seed list.
fn mix_seeds(seeds: &[u64]) -> u64 {
    seeds.iter().fold(0x243F_6A88_85A3_08D3, |acc, &s| {
        (acc ^ s.wrapping_mul(0x9E37_79B9_7F4A_7C15)).rotate_left(27)
    })
}

/// In-process sampler over a single environment instance.
#[derive(Debug)]
pub struct MetaSampler<E> {
    env: E,
    config: SamplerConfig,
    buffer: TaskReplayBuffer,
    rng: Xoshiro256StarStar,
    task_ids: Vec<TaskId>,
    total_timesteps_sampled: usize,
}

impl<E: MetaEnv> MetaSampler<E> {
    pub fn new(env: E, config: SamplerConfig) -> anyhow::Result<Self> {
        ensure!(config.meta_batch_size > 0, "meta_batch_size must be > 0");
        ensure!(config.max_path_length > 0, "max_path_length must be > 0");
        ensure!(
            config.meta_batch_size <= env.n_tasks(),
            "meta_batch_size ({}) exceeds the task pool ({})",
            config.meta_batch_size,
            env.n_tasks()
        );

        let seed = mix_seeds(&[]);
        Ok(Self {
            buffer: TaskReplayBuffer::new(config.buffer.clone(), seed),
            env,
            config,
            rng: Xoshiro256StarStar::seed_from_u64(seed),
            task_ids: Vec::new(),
            total_timesteps_sampled: 0,
        })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    /// Task ids selected by the last `update_tasks_with_id`.
    pub fn current_task_ids(&self) -> &[TaskId] {
        &self.task_ids
    }

    fn rollout<P: ActingPolicy>(&mut self, policy: &P, task_id: TaskId) -> Path {
        let mut path = Path::new();
        let mut observation = self.env.reset(&mut self.rng);
        for _ in 0..self.config.max_path_length {
            let (action, agent_info) = policy.get_action(&observation, task_id, &mut self.rng);
            let step = self.env.step(&action);
            let done = step.done;
            path.push(
                observation,
                action,
                step.reward,
                step.observation.clone(),
                done,
                agent_info,
                step.info,
            );
            if done {
                break;
            }
            observation = step.observation;
        }
        path
    }
}

impl<E: MetaEnv, P: ActingPolicy> Sampler<P> for MetaSampler<E> {
    type Buffer = TaskReplayBuffer;

    fn set_seeds(&mut self, seeds: &[u64]) {
        let seed = mix_seeds(seeds);
        self.rng = Xoshiro256StarStar::seed_from_u64(seed);
        self.buffer.reseed(seed.rotate_left(32));
        tracing::debug!(?seeds, "sampler seeded");
    }

    fn update_tasks_with_id(&mut self) -> anyhow::Result<(Vec<Task>, Vec<TaskId>)> {
        let n_tasks = self.env.n_tasks();
        ensure!(
            self.config.meta_batch_size <= n_tasks,
            "meta_batch_size ({}) exceeds the task pool ({})",
            self.config.meta_batch_size,
            n_tasks
        );

        let ids = index::sample(&mut self.rng, n_tasks, self.config.meta_batch_size).into_vec();
        let tasks = ids
            .iter()
            .map(|&id| self.env.task(id))
            .collect::<anyhow::Result<Vec<_>>>()?;
        self.task_ids = ids.clone();
        Ok((tasks, ids))
    }

    fn obtain_samples(
        &mut self,
        policy: &P,
        task_ids: &[TaskId],
        step_id: usize,
        log: bool,
        log_prefix: &str,
        kv: &mut KvAccumulator,
    ) -> anyhow::Result<PathsPerTask> {
        let mut paths = PathsPerTask::new();
        for &task_id in task_ids {
            self.env.set_task(task_id)?;
            let task_paths = (0..self.config.rollouts_per_meta_task)
                .map(|_| self.rollout(policy, task_id))
                .collect();
            paths.insert(task_id, task_paths);
        }

        let n_timesteps = count_timesteps(&paths);
        self.total_timesteps_sampled += n_timesteps;

        tracing::debug!(step_id, n_timesteps, "collected meta-batch");
        if log {
            kv.logkv(format!("{}n_timesteps", log_prefix), n_timesteps);
            kv.logkv(
                format!("{}NumPaths", log_prefix),
                paths.values().map(Vec::len).sum::<usize>(),
            );
        }
        Ok(paths)
    }

    fn buffer(&self) -> &TaskReplayBuffer {
        &self.buffer
    }

    fn buffer_mut(&mut self) -> &mut TaskReplayBuffer {
        &mut self.buffer
    }

    fn total_timesteps_sampled(&self) -> usize {
        self.total_timesteps_sampled
    }
}
