//! Key-value metric records.
//!
//! `KvAccumulator` gathers the tabular diagnostics of one iteration:
//! - keys keep first-insertion order
//! - logging an existing key overwrites its value in place
//! - `dump` hands everything to a logger as one record and clears
//!
//! Collaborators (sampler, sample processor) log into the same accumulator
//! under their log prefix, so one iteration produces exactly one record.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::logger::MetricsLogger;

/// A single metric value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Int(v) => v as f64,
            MetricValue::Float(v) => v,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{}", v),
            MetricValue::Float(v) => write!(f, "{:.6}", v),
        }
    }
}

impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        MetricValue::Int(v as i64)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<f32> for MetricValue {
    fn from(v: f32) -> Self {
        MetricValue::Float(v as f64)
    }
}

/// One flushed set of metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KvRecord {
    entries: Vec<(String, MetricValue)>,
}

impl KvRecord {
    pub fn get(&self, key: &str) -> Option<MetricValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, MetricValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Accumulates key-values until the next dump.
#[derive(Debug, Default)]
pub struct KvAccumulator {
    current: KvRecord,
}

impl KvAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key = value`, overwriting a previous value for `key`.
    pub fn logkv(&mut self, key: impl Into<String>, value: impl Into<MetricValue>) {
        let key = key.into();
        let value = value.into();
        match self.current.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.current.entries.push((key, value)),
        }
    }

    /// Record mean/std/min/max of `values` under `{key}Average`, etc.
    pub fn logkv_stats(&mut self, key: &str, values: &[f32]) {
        if values.is_empty() {
            return;
        }
        let n = values.len() as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let var = values.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
        let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let min = values.iter().copied().fold(f32::INFINITY, f32::min);
        self.logkv(format!("{}Average", key), mean);
        self.logkv(format!("{}Std", key), var.sqrt());
        self.logkv(format!("{}Max", key), max);
        self.logkv(format!("{}Min", key), min);
    }

    pub fn get(&self, key: &str) -> Option<MetricValue> {
        self.current.get(key)
    }

    pub fn pending(&self) -> &KvRecord {
        &self.current
    }

    /// Take the accumulated record, leaving the accumulator empty.
    pub fn take(&mut self) -> KvRecord {
        std::mem::take(&mut self.current)
    }

    /// Emit the accumulated record to `logger` as one unit, then clear.
    pub fn dump(&mut self, logger: &mut dyn MetricsLogger) {
        let record = self.take();
        logger.log(&record);
        logger.flush();
    }
}
