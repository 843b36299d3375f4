//! Per-task replay storage of whole paths.
//!
//! Each task owns a fixed-capacity ring; once full, the oldest path is
//! overwritten. Draws are uniform with replacement from a seeded generator.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::OffPolicyBuffer;
use crate::core::{OffPolicyBatch, Path, PathsPerTask, TaskId};

/// Configuration for [`TaskReplayBuffer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayBufferConfig {
    /// Paths kept per task
    pub capacity_per_task: usize,
}

impl Default for ReplayBufferConfig {
    fn default() -> Self {
        Self {
            capacity_per_task: 100,
        }
    }
}

/// Fixed-capacity ring of paths.
#[derive(Debug, Clone)]
struct PathRing {
    slots: Vec<Option<Path>>,
    head: usize,
    len: usize,
}

impl PathRing {
    fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, path: Path) {
        let capacity = self.slots.len();
        if capacity == 0 {
            return;
        }
        let idx = (self.head + self.len) % capacity;
        self.slots[idx] = Some(path);
        if self.len < capacity {
            self.len += 1;
        } else {
            self.head = (self.head + 1) % capacity;
        }
    }

    /// `idx` counts from the oldest stored path.
    fn get(&self, idx: usize) -> Option<&Path> {
        if idx >= self.len {
            return None;
        }
        self.slots[(self.head + idx) % self.slots.len()].as_ref()
    }

    fn len(&self) -> usize {
        self.len
    }
}

/// Replay buffer keyed by task id.
#[derive(Debug, Clone)]
pub struct TaskReplayBuffer {
    config: ReplayBufferConfig,
    rings: BTreeMap<TaskId, PathRing>,
    rng: Xoshiro256StarStar,
}

impl TaskReplayBuffer {
    pub fn new(config: ReplayBufferConfig, seed: u64) -> Self {
        Self {
            config,
            rings: BTreeMap::new(),
            rng: Xoshiro256StarStar::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &ReplayBufferConfig {
        &self.config
    }

    /// Restart the sampling generator. Stored paths are kept.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = Xoshiro256StarStar::seed_from_u64(seed);
    }

    pub fn task_len(&self, task_id: TaskId) -> usize {
        self.rings.get(&task_id).map_or(0, PathRing::len)
    }

    /// Oldest-first view of the paths stored for `task_id`.
    pub fn task_paths(&self, task_id: TaskId) -> Vec<&Path> {
        match self.rings.get(&task_id) {
            Some(ring) => (0..ring.len()).filter_map(|i| ring.get(i)).collect(),
            None => Vec::new(),
        }
    }
}

impl OffPolicyBuffer for TaskReplayBuffer {
    fn sample(&mut self, task_ids: &[TaskId], batch_size: usize) -> anyhow::Result<OffPolicyBatch> {
        let mut batch = OffPolicyBatch::new();
        for &task_id in task_ids {
            let drawn = match self.rings.get(&task_id) {
                Some(ring) if ring.len() > 0 && batch_size > 0 => (0..batch_size)
                    .filter_map(|_| ring.get(self.rng.gen_range(0..ring.len())).cloned())
                    .collect(),
                _ => Vec::new(),
            };
            batch.insert(task_id, drawn);
        }
        Ok(batch)
    }

    fn add_paths(&mut self, paths: &PathsPerTask) {
        let capacity = self.config.capacity_per_task;
        for (&task_id, task_paths) in paths {
            let ring = self
                .rings
                .entry(task_id)
                .or_insert_with(|| PathRing::new(capacity));
            for path in task_paths {
                ring.push(path.clone());
            }
        }
    }

    fn len(&self) -> usize {
        self.rings.values().map(PathRing::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepInfo;

    fn path(tag: f32) -> Path {
        let mut path = Path::new();
        path.push(vec![tag], vec![0.0], tag, vec![tag], true, StepInfo::new(), StepInfo::new());
        path
    }

    fn paths(task_id: TaskId, tags: &[f32]) -> PathsPerTask {
        let mut map = PathsPerTask::new();
        map.insert(task_id, tags.iter().map(|&t| path(t)).collect());
        map
    }

    #[test]
    fn test_ring_overwrites_oldest() {
        let mut buffer = TaskReplayBuffer::new(ReplayBufferConfig { capacity_per_task: 2 }, 0);
        buffer.add_paths(&paths(1, &[1.0, 2.0, 3.0]));

        assert_eq!(buffer.task_len(1), 2);
        let stored: Vec<f32> = buffer.task_paths(1).iter().map(|p| p.rewards[0]).collect();
        assert_eq!(stored, vec![2.0, 3.0]);
    }

    #[test]
    fn test_sample_covers_every_requested_task() {
        let mut buffer = TaskReplayBuffer::new(ReplayBufferConfig::default(), 0);
        buffer.add_paths(&paths(1, &[1.0]));

        let batch = buffer.sample(&[1, 2], 4).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[&1].len(), 4);
        assert!(batch[&1].iter().all(|p| p.rewards[0] == 1.0));
        assert!(batch[&2].is_empty());
    }

    #[test]
    fn test_zero_batch_size_yields_empty_entries() {
        let mut buffer = TaskReplayBuffer::new(ReplayBufferConfig::default(), 0);
        buffer.add_paths(&paths(3, &[1.0, 2.0]));

        let batch = buffer.sample(&[3], 0).unwrap();
        assert_eq!(batch.keys().copied().collect::<Vec<_>>(), vec![3]);
        assert!(batch[&3].is_empty());
    }

    #[test]
    fn test_reseed_repeats_draws() {
        let mut buffer = TaskReplayBuffer::new(ReplayBufferConfig::default(), 5);
        buffer.add_paths(&paths(0, &[1.0, 2.0, 3.0, 4.0]));

        let first = buffer.sample(&[0], 8).unwrap();
        buffer.reseed(5);
        let second = buffer.sample(&[0], 8).unwrap();
        assert_eq!(first, second);
        assert_eq!(buffer.len(), 4);
    }
}
