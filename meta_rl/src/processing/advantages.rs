//! Returns and advantages for single paths.
//!
//! ## Formula
//!
//! Discounted return: `R_t = Σ_{l≥0} γ^l r_{t+l}`
//!
//! GAE: `A_t = Σ_{l≥0} (γλ)^l δ_{t+l}` with `δ_t = r_t + γ b(s_{t+1}) - b(s_t)`
//!
//! Paths are complete episodes or truncated at the step limit; in both cases
//! the value after the last step is taken as zero.

/// Discounted cumulative sum, computed back to front.
pub fn discount_cumsum(values: &[f32], discount: f32) -> Vec<f32> {
    let mut out = vec![0.0f32; values.len()];
    let mut running = 0.0f32;
    for t in (0..values.len()).rev() {
        running = values[t] + discount * running;
        out[t] = running;
    }
    out
}

/// GAE advantages for one path.
///
/// `baselines` holds one baseline value per step.
pub fn compute_gae(rewards: &[f32], baselines: &[f32], discount: f32, gae_lambda: f32) -> Vec<f32> {
    debug_assert_eq!(rewards.len(), baselines.len());
    let n = rewards.len().min(baselines.len());

    let mut advantages = vec![0.0f32; n];
    let mut gae = 0.0f32;
    let mut next_value = 0.0f32;
    for t in (0..n).rev() {
        let delta = rewards[t] + discount * next_value - baselines[t];
        gae = delta + discount * gae_lambda * gae;
        advantages[t] = gae;
        next_value = baselines[t];
    }
    advantages
}

/// Normalize to zero mean and unit variance.
///
/// Empty input is left alone; a single element becomes 0.
pub fn normalize_advantages(advantages: &mut [f32]) {
    if advantages.is_empty() {
        return;
    }
    let n = advantages.len() as f32;
    let mean = advantages.iter().sum::<f32>() / n;
    let variance = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / n;
    let std = (variance + 1e-8).sqrt();
    for a in advantages.iter_mut() {
        *a = (*a - mean) / std;
    }
}

/// Shift so the smallest advantage is (just above) zero.
pub fn shift_advantages_to_positive(advantages: &mut [f32]) {
    let min = advantages.iter().copied().fold(f32::INFINITY, f32::min);
    if !min.is_finite() {
        return;
    }
    for a in advantages.iter_mut() {
        *a = *a - min + 1e-8;
    }
}
