//! State baselines used to reduce the variance of advantage estimates.

use serde::{Deserialize, Serialize};

use super::advantages::discount_cumsum;
use crate::core::Path;
use crate::metrics::KvAccumulator;

/// Per-step baseline fitted on paths.
pub trait Baseline {
    /// Fit on `paths`, regressing the discounted returns.
    fn fit(&mut self, paths: &[&Path], discount: f32);

    /// One value per step of `path`.
    fn predict(&self, path: &Path) -> Vec<f32>;

    fn log_diagnostics(&self, _paths: &[&Path], _prefix: &str, _kv: &mut KvAccumulator) {}
}

/// Predicts zero everywhere.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZeroBaseline;

impl Baseline for ZeroBaseline {
    fn fit(&mut self, _paths: &[&Path], _discount: f32) {}

    fn predict(&self, path: &Path) -> Vec<f32> {
        vec![0.0; path.len()]
    }
}

/// Ridge regression on hand-made time and observation features:
///
/// ```text
/// φ(s, t) = [clip(s), clip(s)², t/100, (t/100)², (t/100)³, 1]
/// ```
///
/// The regularizer grows ×10 whenever the normal equations are singular.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearFeatureBaseline {
    reg_coeff: f64,
    coeffs: Option<Vec<f64>>,
}

impl Default for LinearFeatureBaseline {
    fn default() -> Self {
        Self::new(1e-5)
    }
}

impl LinearFeatureBaseline {
    pub fn new(reg_coeff: f64) -> Self {
        Self {
            reg_coeff,
            coeffs: None,
        }
    }

    pub fn coeffs(&self) -> Option<&[f64]> {
        self.coeffs.as_deref()
    }

    fn features(path: &Path) -> Vec<Vec<f64>> {
        path.observations
            .iter()
            .enumerate()
            .map(|(t, obs)| {
                let clipped: Vec<f64> = obs.iter().map(|&o| (o as f64).clamp(-10.0, 10.0)).collect();
                let t = t as f64 / 100.0;
                let mut row = clipped.clone();
                row.extend(clipped.iter().map(|o| o * o));
                row.extend([t, t * t, t * t * t, 1.0]);
                row
            })
            .collect()
    }
}

impl Baseline for LinearFeatureBaseline {
    fn fit(&mut self, paths: &[&Path], discount: f32) {
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for path in paths {
            rows.extend(Self::features(path));
            targets.extend(discount_cumsum(&path.rewards, discount).into_iter().map(f64::from));
        }
        let Some(dim) = rows.first().map(Vec::len) else {
            return;
        };
        if rows.iter().any(|r| r.len() != dim) {
            return;
        }

        // Normal equations: (XᵀX + reg I) w = Xᵀy
        let mut xtx = vec![vec![0.0f64; dim]; dim];
        let mut xty = vec![0.0f64; dim];
        for (row, &y) in rows.iter().zip(&targets) {
            for i in 0..dim {
                xty[i] += row[i] * y;
                for j in 0..dim {
                    xtx[i][j] += row[i] * row[j];
                }
            }
        }

        let mut reg = self.reg_coeff;
        for _ in 0..5 {
            let mut a = xtx.clone();
            for (i, row) in a.iter_mut().enumerate() {
                row[i] += reg;
            }
            if let Some(w) = solve(a, xty.clone()) {
                if w.iter().all(|x| x.is_finite()) {
                    self.coeffs = Some(w);
                    return;
                }
            }
            reg *= 10.0;
        }
    }

    fn predict(&self, path: &Path) -> Vec<f32> {
        let Some(coeffs) = &self.coeffs else {
            return vec![0.0; path.len()];
        };
        Self::features(path)
            .iter()
            .map(|row| {
                if row.len() != coeffs.len() {
                    return 0.0;
                }
                row.iter().zip(coeffs).map(|(x, w)| x * w).sum::<f64>() as f32
            })
            .collect()
    }
}

/// Gaussian elimination with partial pivoting. `None` if `a` is singular.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0f64; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}
