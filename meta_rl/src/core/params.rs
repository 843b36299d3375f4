//! Ordered parameter maps.
//!
//! Value networks expose their parameters as an ordered mapping from name to
//! either a tensor handle or a materialized value. Bulk assignment requires
//! the supplied mapping to have exactly the same keys in exactly the same
//! order; that precondition is checked explicitly with
//! [`ParamMap::ensure_same_keys`] before anything is written.
//!
//! Also provides Polyak averaging over materialized parameters:
//! ```text
//! θ_target = τ * θ_online + (1 - τ) * θ_target
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key sequence of a supplied mapping differs from the expected one.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("parameter keys must match with variables: expected {expected:?}, found {found:?}")]
pub struct KeyMismatch {
    pub expected: Vec<String>,
    pub found: Vec<String>,
}

/// A value whose layout differs from what its name requires.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutMismatch {
    #[error("shape mismatch for {name}: expected {expected:?}, found {found:?}")]
    Shape {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    /// Data length disagrees with the declared shape.
    #[error("{name} has shape {shape:?} but {found} elements")]
    ElementCount {
        name: String,
        shape: Vec<usize>,
        found: usize,
    },
}

/// Errors combining two parameter sets.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error(transparent)]
    Keys(#[from] KeyMismatch),
    #[error(transparent)]
    Layout(#[from] LayoutMismatch),
}

/// Insertion-ordered map from parameter name to `T`.
///
/// Lookups are linear; networks here carry a handful of parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamMap<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for ParamMap<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> ParamMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Overwriting keeps the original position.
    pub fn insert(&mut self, name: impl Into<String>, value: T) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Apply `f` to every value, keeping names and order.
    pub fn map<U>(&self, mut f: impl FnMut(&str, &T) -> U) -> ParamMap<U> {
        ParamMap {
            entries: self
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), f(k, v)))
                .collect(),
        }
    }

    /// Check that `other` has the same keys in the same order.
    pub fn ensure_same_keys<U>(&self, other: &ParamMap<U>) -> Result<(), KeyMismatch> {
        let same = self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((a, _), (b, _))| a == b);
        if same {
            Ok(())
        } else {
            Err(KeyMismatch {
                expected: self.keys().map(str::to_owned).collect(),
                found: other.keys().map(str::to_owned).collect(),
            })
        }
    }
}

impl<T> FromIterator<(String, T)> for ParamMap<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        let mut map = ParamMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<T> IntoIterator for ParamMap<T> {
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<(String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A materialized tensor: shape plus row-major data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamValue {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl ParamValue {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let n = shape.iter().product();
        Self { shape, data: vec![0.0; n] }
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Check that `data` holds exactly as many elements as `shape` declares.
    ///
    /// Values built through [`ParamValue::new`] satisfy this; deserialized
    /// values may not.
    pub fn ensure_consistent(&self, name: &str) -> Result<(), LayoutMismatch> {
        if self.shape.iter().product::<usize>() == self.data.len() {
            Ok(())
        } else {
            Err(LayoutMismatch::ElementCount {
                name: name.to_owned(),
                shape: self.shape.clone(),
                found: self.data.len(),
            })
        }
    }

    /// Largest absolute element-wise difference, `None` on shape mismatch.
    pub fn max_abs_diff(&self, other: &ParamValue) -> Option<f32> {
        if self.shape != other.shape {
            return None;
        }
        Some(
            self.data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f32::max),
        )
    }
}

/// Polyak averaging between two materialized parameter sets.
///
/// Parameters are matched by name and order. A key mismatch, a shape
/// mismatch between paired values, or a value whose data length disagrees
/// with its shape is an error.
/// `tau = 1` copies `online`, `tau = 0` returns `target` unchanged.
pub fn soft_update(
    online: &ParamMap<ParamValue>,
    target: &ParamMap<ParamValue>,
    tau: f32,
) -> Result<ParamMap<ParamValue>, ParamError> {
    target.ensure_same_keys(online)?;
    for ((name, t), o) in target.iter().zip(online.values()) {
        t.ensure_consistent(name)?;
        o.ensure_consistent(name)?;
        if t.shape != o.shape {
            return Err(LayoutMismatch::Shape {
                name: name.to_owned(),
                expected: t.shape.clone(),
                found: o.shape.clone(),
            }
            .into());
        }
    }

    if (tau - 1.0).abs() < 1e-6 {
        return Ok(online.clone());
    }
    if tau.abs() < 1e-6 {
        return Ok(target.clone());
    }

    Ok(target
        .iter()
        .zip(online.values())
        .map(|((name, t), o)| {
            let data = t
                .data
                .iter()
                .zip(o.data.iter())
                .map(|(t, o)| tau * o + (1.0 - tau) * t)
                .collect();
            (name.to_owned(), ParamValue::new(t.shape.clone(), data))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_of(keys: &[&str]) -> ParamMap<ParamValue> {
        keys.iter()
            .map(|k| (k.to_string(), ParamValue::new(vec![2], vec![1.0, 2.0])))
            .collect()
    }

    #[test]
    fn test_insert_keeps_position_on_overwrite() {
        let mut map = ParamMap::new();
        map.insert("a", 1);
        map.insert("b", 2);
        map.insert("a", 3);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map.get("a"), Some(&3));
    }

    #[test]
    fn test_same_keys_accepts_identical_order() {
        assert!(map_of(&["w", "b"]).ensure_same_keys(&map_of(&["w", "b"])).is_ok());
    }

    #[test]
    fn test_same_keys_rejects_reordered_missing_and_extra() {
        let base = map_of(&["w", "b"]);
        for other in [map_of(&["b", "w"]), map_of(&["w"]), map_of(&["w", "b", "c"])] {
            let err = base.ensure_same_keys(&other).unwrap_err();
            assert_eq!(err.expected, vec!["w", "b"]);
        }
    }

    #[test]
    fn test_soft_update_interpolates() {
        let online: ParamMap<ParamValue> =
            [("w".to_string(), ParamValue::new(vec![2], vec![1.0, 1.0]))].into_iter().collect();
        let target: ParamMap<ParamValue> =
            [("w".to_string(), ParamValue::new(vec![2], vec![0.0, 2.0]))].into_iter().collect();

        let updated = soft_update(&online, &target, 0.25).unwrap();
        let w = updated.get("w").unwrap();
        assert!((w.data[0] - 0.25).abs() < 1e-6);
        assert!((w.data[1] - 1.75).abs() < 1e-6);
    }

    #[test]
    fn test_soft_update_edge_taus() {
        let online = map_of(&["w"]);
        let target: ParamMap<ParamValue> =
            [("w".to_string(), ParamValue::zeros(vec![2]))].into_iter().collect();

        assert_eq!(soft_update(&online, &target, 1.0).unwrap(), online);
        assert_eq!(soft_update(&online, &target, 0.0).unwrap(), target);
        assert!(soft_update(&online, &map_of(&["v"]), 0.5).is_err());
    }

    #[test]
    fn test_soft_update_rejects_inconsistent_values() {
        let target = map_of(&["w"]);

        let truncated = ParamMap::from_iter([(
            "w".to_string(),
            ParamValue { shape: vec![2], data: vec![1.0] },
        )]);
        assert_eq!(
            soft_update(&truncated, &target, 0.5),
            Err(ParamError::Layout(LayoutMismatch::ElementCount {
                name: "w".to_string(),
                shape: vec![2],
                found: 1,
            }))
        );

        let reshaped: ParamMap<ParamValue> =
            [("w".to_string(), ParamValue::zeros(vec![1, 2]))].into_iter().collect();
        assert!(matches!(
            soft_update(&reshaped, &target, 1.0),
            Err(ParamError::Layout(LayoutMismatch::Shape { .. }))
        ));
    }

    #[test]
    fn test_max_abs_diff() {
        let a = ParamValue::new(vec![2], vec![1.0, 2.0]);
        let b = ParamValue::new(vec![2], vec![1.5, 2.0]);
        assert_eq!(a.max_abs_diff(&b), Some(0.5));
        assert_eq!(a.max_abs_diff(&ParamValue::zeros(vec![1, 2])), None);
    }
}
