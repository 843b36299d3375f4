//! Algorithm-ready sample batches.
//!
//! A `ProcessedBatch` is derived from a `PathsPerTask` by a sample processor
//! and consumed read-only by the meta algorithm. Per task, transitions are
//! flattened across paths in path order.

use super::path::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flattened samples for one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSamples {
    pub observations: Vec<Vec<f32>>,
    pub actions: Vec<Vec<f32>>,
    pub rewards: Vec<f32>,
    pub next_observations: Vec<Vec<f32>>,
    pub dones: Vec<bool>,
    /// Discounted reward-to-go
    pub returns: Vec<f32>,
    pub advantages: Vec<f32>,
    /// Baseline predictions used for the advantages
    pub baselines: Vec<f32>,
}

impl TaskSamples {
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

/// Summary statistics of the paths a batch was built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub average_return: f32,
    pub std_return: f32,
    pub max_return: f32,
    pub min_return: f32,
    pub average_discounted_return: f32,
    pub n_paths: usize,
    pub n_timesteps: usize,
}

/// Processed samples keyed by task id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedBatch {
    pub tasks: BTreeMap<TaskId, TaskSamples>,
    pub stats: BatchStats,
}

impl ProcessedBatch {
    pub fn task(&self, id: TaskId) -> Option<&TaskSamples> {
        self.tasks.get(&id)
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.keys().copied().collect()
    }

    pub fn n_timesteps(&self) -> usize {
        self.tasks.values().map(TaskSamples::len).sum()
    }

    /// True when no task holds any transition.
    pub fn is_empty(&self) -> bool {
        self.tasks.values().all(TaskSamples::is_empty)
    }
}
