//! Test doubles for driving the trainer.

use anyhow::{anyhow, bail};
use rand::RngCore;
use serde::Serialize;
use std::marker::PhantomData;

use crate::algorithms::MetaAlgorithm;
use crate::core::{Path, PathsPerTask, ProcessedBatch, StepInfo, Task, TaskId};
use crate::env::{PointEnv, PointEnvConfig};
use crate::metrics::KvAccumulator;
use crate::policy::{ActingPolicy, MetaPolicy, PointPolicy, PointPolicyConfig};
use crate::sampler::{MetaSampler, Sampler, SamplerConfig, TaskReplayBuffer};

/// Point policy that counts pre-update switches.
#[derive(Debug, Clone, Serialize)]
pub struct CountingPolicy {
    pub inner: PointPolicy,
    pub switches: usize,
}

impl CountingPolicy {
    pub fn new() -> Self {
        Self {
            inner: PointPolicy::new(PointPolicyConfig::new(2, 2).with_seed(7)),
            switches: 0,
        }
    }
}

impl MetaPolicy for CountingPolicy {
    fn switch_to_pre_update(&mut self) {
        self.switches += 1;
        self.inner.switch_to_pre_update();
    }

    fn log_diagnostics(&self, paths: &[&Path], prefix: &str, kv: &mut KvAccumulator) {
        self.inner.log_diagnostics(paths, prefix, kv);
    }
}

impl ActingPolicy for CountingPolicy {
    fn get_action(
        &self,
        observation: &[f32],
        task_id: TaskId,
        rng: &mut dyn RngCore,
    ) -> (Vec<f32>, StepInfo) {
        self.inner.get_action(observation, task_id, rng)
    }
}

/// One call received by [`RecordingAlgorithm`].
#[derive(Debug, Clone, PartialEq)]
pub enum AlgoCall {
    /// `(samples, off_samples, pre-update switches seen so far)`
    AdaptOffValue(ProcessedBatch, ProcessedBatch, usize),
    Adapt(ProcessedBatch, usize),
    Optimize(Vec<ProcessedBatch>),
}

/// Algorithm that records its inputs and leaves the policy untouched.
#[derive(Debug)]
pub struct RecordingAlgorithm<P> {
    pub calls: Vec<AlgoCall>,
    /// Name of the operation that fails instead of recording
    pub fail_on: Option<&'static str>,
    _policy: PhantomData<P>,
}

impl<P> RecordingAlgorithm<P> {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            fail_on: None,
            _policy: PhantomData,
        }
    }

    pub fn failing_on(name: &'static str) -> Self {
        Self {
            fail_on: Some(name),
            ..Self::new()
        }
    }

    fn check(&self, name: &'static str) -> anyhow::Result<()> {
        if self.fail_on == Some(name) {
            bail!("{} failed", name);
        }
        Ok(())
    }

    pub fn count(&self, pred: impl Fn(&AlgoCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }
}

impl MetaAlgorithm<CountingPolicy> for RecordingAlgorithm<CountingPolicy> {
    fn adapt_off_value(
        &mut self,
        policy: &mut CountingPolicy,
        samples: &ProcessedBatch,
        off_samples: &ProcessedBatch,
    ) -> anyhow::Result<()> {
        self.check("adapt_off_value")?;
        self.calls.push(AlgoCall::AdaptOffValue(
            samples.clone(),
            off_samples.clone(),
            policy.switches,
        ));
        Ok(())
    }

    fn adapt(&mut self, policy: &mut CountingPolicy, samples: &ProcessedBatch) -> anyhow::Result<()> {
        self.check("adapt")?;
        self.calls.push(AlgoCall::Adapt(samples.clone(), policy.switches));
        Ok(())
    }

    fn optimize_policy(
        &mut self,
        _policy: &mut CountingPolicy,
        all_samples: &[ProcessedBatch],
    ) -> anyhow::Result<()> {
        self.check("optimize_policy")?;
        self.calls.push(AlgoCall::Optimize(all_samples.to_vec()));
        Ok(())
    }
}

/// Small point environment shared by trainer tests.
pub fn point_env() -> PointEnv {
    PointEnv::new(PointEnvConfig::default().with_n_tasks(6).with_task_seed(11))
        .expect("valid point env config")
}

pub fn sampler_config() -> SamplerConfig {
    SamplerConfig::default()
        .with_meta_batch_size(3)
        .with_rollouts_per_meta_task(2)
        .with_max_path_length(5)
}

/// Sampler wrapper that records each `obtain_samples` call.
#[derive(Debug)]
pub struct CountingSampler {
    pub inner: MetaSampler<PointEnv>,
    /// `(step_id, log_prefix)` per call
    pub obtain_calls: Vec<(usize, String)>,
    pub selected: Vec<Vec<TaskId>>,
    /// Paths returned by each call
    pub collected: Vec<PathsPerTask>,
    /// Zero-based `obtain_samples` call that fails
    pub fail_at: Option<usize>,
}

impl CountingSampler {
    pub fn new() -> Self {
        Self::wrapping(MetaSampler::new(point_env(), sampler_config()).expect("valid sampler config"))
    }

    pub fn wrapping(inner: MetaSampler<PointEnv>) -> Self {
        Self {
            inner,
            obtain_calls: Vec::new(),
            selected: Vec::new(),
            collected: Vec::new(),
            fail_at: None,
        }
    }

    pub fn failing_at(call: usize) -> Self {
        Self {
            fail_at: Some(call),
            ..Self::new()
        }
    }
}

impl<P: ActingPolicy> Sampler<P> for CountingSampler {
    type Buffer = TaskReplayBuffer;

    fn set_seeds(&mut self, seeds: &[u64]) {
        Sampler::<P>::set_seeds(&mut self.inner, seeds);
    }

    fn update_tasks_with_id(&mut self) -> anyhow::Result<(Vec<Task>, Vec<TaskId>)> {
        let (tasks, ids) = Sampler::<P>::update_tasks_with_id(&mut self.inner)?;
        self.selected.push(ids.clone());
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
        if self.fail_at == Some(self.obtain_calls.len()) {
            return Err(anyhow!("environment crashed").context("rollout aborted"));
        }
        self.obtain_calls.push((step_id, log_prefix.to_string()));
        let paths =
            Sampler::<P>::obtain_samples(&mut self.inner, policy, task_ids, step_id, log, log_prefix, kv)?;
        self.collected.push(paths.clone());
        Ok(paths)
    }

    fn buffer(&self) -> &Self::Buffer {
        Sampler::<P>::buffer(&self.inner)
    }

    fn buffer_mut(&mut self) -> &mut Self::Buffer {
        Sampler::<P>::buffer_mut(&mut self.inner)
    }

    fn total_timesteps_sampled(&self) -> usize {
        Sampler::<P>::total_timesteps_sampled(&self.inner)
    }
}
