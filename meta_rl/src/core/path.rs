//! Trajectory and task types shared by samplers, processors and the trainer.
//!
//! - `Task`: a task descriptor carrying the stable `TaskId` used to key
//!   per-task buffers and per-task sampling
//! - `Path`: one time-ordered trajectory collected in a single task
//! - `PathsPerTask`: trajectories keyed by task id, in deterministic order

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable task identifier.
pub type TaskId = usize;

/// Per-step auxiliary information (agent or environment side).
pub type StepInfo = BTreeMap<String, f32>;

/// Trajectories keyed by task identifier.
pub type PathsPerTask = BTreeMap<TaskId, Vec<Path>>;

/// Trajectories drawn from the persistent replay buffer.
pub type OffPolicyBatch = PathsPerTask;

/// Task descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier
    pub id: TaskId,
    /// Environment-specific task parameters (e.g. goal position)
    pub params: Vec<f32>,
}

impl Task {
    pub fn new(id: TaskId, params: Vec<f32>) -> Self {
        Self { id, params }
    }
}

/// A single trajectory.
///
/// All per-step vectors have the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub observations: Vec<Vec<f32>>,
    pub actions: Vec<Vec<f32>>,
    pub rewards: Vec<f32>,
    pub next_observations: Vec<Vec<f32>>,
    pub dones: Vec<bool>,
    pub agent_infos: Vec<StepInfo>,
    pub env_infos: Vec<StepInfo>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one transition.
    #[allow(clippy::too_many_arguments)]
    pub fn push(
        &mut self,
        observation: Vec<f32>,
        action: Vec<f32>,
        reward: f32,
        next_observation: Vec<f32>,
        done: bool,
        agent_info: StepInfo,
        env_info: StepInfo,
    ) {
        self.observations.push(observation);
        self.actions.push(action);
        self.rewards.push(reward);
        self.next_observations.push(next_observation);
        self.dones.push(done);
        self.agent_infos.push(agent_info);
        self.env_infos.push(env_info);
    }

    /// Number of transitions.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Undiscounted return.
    pub fn total_reward(&self) -> f32 {
        self.rewards.iter().sum()
    }

    /// Whether the last transition ended the episode.
    pub fn terminated(&self) -> bool {
        self.dones.last().copied().unwrap_or(false)
    }
}

/// Concatenate all paths across tasks, in task-id order.
pub fn flatten_paths(paths: &PathsPerTask) -> Vec<&Path> {
    paths.values().flat_map(|p| p.iter()).collect()
}

/// Total transitions across all tasks.
pub fn count_timesteps(paths: &PathsPerTask) -> usize {
    paths.values().flat_map(|p| p.iter()).map(Path::len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_with_rewards(rewards: &[f32]) -> Path {
        let mut path = Path::new();
        for (t, &r) in rewards.iter().enumerate() {
            path.push(
                vec![t as f32],
                vec![0.0],
                r,
                vec![t as f32 + 1.0],
                t + 1 == rewards.len(),
                StepInfo::new(),
                StepInfo::new(),
            );
        }
        path
    }

    #[test]
    fn test_path_accumulates_transitions() {
        let path = path_with_rewards(&[1.0, 2.0, 3.0]);
        assert_eq!(path.len(), 3);
        assert!((path.total_reward() - 6.0).abs() < 1e-6);
        assert!(path.terminated());
        assert_eq!(path.next_observations[2], vec![3.0]);
    }

    #[test]
    fn test_flatten_preserves_task_order() {
        let mut paths = PathsPerTask::new();
        paths.insert(7, vec![path_with_rewards(&[7.0])]);
        paths.insert(2, vec![path_with_rewards(&[2.0]), path_with_rewards(&[2.5, 0.5])]);

        let flat = flatten_paths(&paths);
        let totals: Vec<f32> = flat.iter().map(|p| p.total_reward()).collect();
        assert_eq!(totals, vec![2.0, 3.0, 7.0]);
        assert_eq!(count_timesteps(&paths), 4);
    }

    #[test]
    fn test_empty_path() {
        let path = Path::new();
        assert!(path.is_empty());
        assert!(!path.terminated());
        assert_eq!(path.total_reward(), 0.0);
    }
}
