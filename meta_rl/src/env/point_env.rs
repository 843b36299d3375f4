//! 2-D point navigation with one goal per task.
//!
//! Observation is the point position, the action a bounded displacement and
//! the reward the negative distance to the active task's goal. Goals are
//! drawn uniformly from `[-goal_range, goal_range]²` by a generator seeded
//! with `task_seed`, so the task pool is identical across runs.

use anyhow::{ensure, Context};
use rand::{Rng, RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};

use super::{EnvStep, MetaEnv};
use crate::core::{Path, Task, TaskId};
use crate::metrics::KvAccumulator;

/// Configuration for [`PointEnv`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointEnvConfig {
    /// Size of the goal pool
    pub n_tasks: usize,
    /// Goals lie in `[-goal_range, goal_range]` on both axes
    pub goal_range: f32,
    /// Per-axis action bound
    pub max_action: f32,
    /// Episode ends once the point is this close to the goal
    pub goal_radius: f32,
    /// Seed of the goal pool
    pub task_seed: u64,
}

impl Default for PointEnvConfig {
    fn default() -> Self {
        Self {
            n_tasks: 40,
            goal_range: 2.0,
            max_action: 0.1,
            goal_radius: 0.1,
            task_seed: 0,
        }
    }
}

impl PointEnvConfig {
    pub fn with_n_tasks(mut self, n_tasks: usize) -> Self {
        self.n_tasks = n_tasks;
        self
    }

    pub fn with_goal_range(mut self, goal_range: f32) -> Self {
        self.goal_range = goal_range;
        self
    }

    pub fn with_task_seed(mut self, seed: u64) -> Self {
        self.task_seed = seed;
        self
    }
}

/// Point-mass goal navigation meta-environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointEnv {
    config: PointEnvConfig,
    goals: Vec<[f32; 2]>,
    active: TaskId,
    position: [f32; 2],
}

impl PointEnv {
    pub fn new(config: PointEnvConfig) -> anyhow::Result<Self> {
        ensure!(config.n_tasks > 0, "point env needs at least one task");
        ensure!(
            config.goal_range > 0.0 && config.max_action > 0.0,
            "goal_range and max_action must be positive"
        );

        let mut rng = Xoshiro256StarStar::seed_from_u64(config.task_seed);
        let r = config.goal_range;
        let goals = (0..config.n_tasks)
            .map(|_| [rng.gen_range(-r..=r), rng.gen_range(-r..=r)])
            .collect();

        Ok(Self {
            config,
            goals,
            active: 0,
            position: [0.0; 2],
        })
    }

    pub fn config(&self) -> &PointEnvConfig {
        &self.config
    }

    pub fn goal(&self, id: TaskId) -> Option<[f32; 2]> {
        self.goals.get(id).copied()
    }

    pub fn active_task(&self) -> TaskId {
        self.active
    }

    fn distance_to_goal(&self) -> f32 {
        let goal = self.goals[self.active];
        let dx = self.position[0] - goal[0];
        let dy = self.position[1] - goal[1];
        (dx * dx + dy * dy).sqrt()
    }
}

impl MetaEnv for PointEnv {
    fn n_tasks(&self) -> usize {
        self.goals.len()
    }

    fn task(&self, id: TaskId) -> anyhow::Result<Task> {
        let goal = self
            .goal(id)
            .with_context(|| format!("task {} outside pool of {}", id, self.goals.len()))?;
        Ok(Task::new(id, goal.to_vec()))
    }

    fn set_task(&mut self, id: TaskId) -> anyhow::Result<()> {
        ensure!(id < self.goals.len(), "task {} outside pool of {}", id, self.goals.len());
        self.active = id;
        Ok(())
    }

    fn observation_dim(&self) -> usize {
        2
    }

    fn action_dim(&self) -> usize {
        2
    }

    fn reset(&mut self, rng: &mut dyn RngCore) -> Vec<f32> {
        self.position = [rng.gen_range(-0.01..=0.01), rng.gen_range(-0.01..=0.01)];
        self.position.to_vec()
    }

    fn step(&mut self, action: &[f32]) -> EnvStep {
        let bound = self.config.max_action;
        for (p, a) in self.position.iter_mut().zip(action) {
            *p += a.clamp(-bound, bound);
        }
        let distance = self.distance_to_goal();
        EnvStep::new(
            self.position.to_vec(),
            -distance,
            distance < self.config.goal_radius,
        )
        .with_info("distance", distance)
    }

    fn log_diagnostics(&self, paths: &[&Path], prefix: &str, kv: &mut KvAccumulator) {
        let final_distances: Vec<f32> = paths
            .iter()
            .filter_map(|p| p.env_infos.last())
            .filter_map(|info| info.get("distance").copied())
            .collect();
        if !final_distances.is_empty() {
            kv.logkv_stats(&format!("{}FinalDistance", prefix), &final_distances);
        }
    }
}
