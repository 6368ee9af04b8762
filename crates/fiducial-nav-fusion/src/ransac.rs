//! Seed-based consensus over 3D position estimates.
//!
//! Every estimate is tried as a seed; its inlier set is every estimate
//! (itself included) within `threshold` of it. The largest set wins and the
//! earliest seed wins ties, so the result is deterministic.

use fiducial_nav_core::WorldPositionEstimate;

/// Minimum consensus size for `count` estimates.
///
/// 2 for up to four estimates, half (rounded up) beyond that. A lone
/// estimate can therefore never reach consensus.
pub fn min_inliers(count: usize) -> usize {
    if count <= 4 {
        2
    } else {
        count.div_ceil(2)
    }
}

/// Indices of the largest inlier set at `threshold`, in input order.
pub fn best_inlier_set(estimates: &[WorldPositionEstimate], threshold: f64) -> Vec<usize> {
    let mut best: Vec<usize> = Vec::new();
    for seed in estimates {
        let inliers: Vec<usize> = estimates
            .iter()
            .enumerate()
            .filter(|(_, e)| (e.position - seed.position).norm() <= threshold)
            .map(|(i, _)| i)
            .collect();
        if inliers.len() > best.len() {
            best = inliers;
        }
    }
    best
}

/// Consensus at a single threshold; `None` when it is smaller than
/// [`min_inliers`].
pub fn ransac_inliers(estimates: &[WorldPositionEstimate], threshold: f64) -> Option<Vec<usize>> {
    if estimates.is_empty() {
        return None;
    }
    let best = best_inlier_set(estimates, threshold);
    (best.len() >= min_inliers(estimates.len())).then_some(best)
}

/// Thresholds tried in order: `start`, then `start + k * step` up to `max`.
///
/// Without a usable ceiling or step only `start` is tried.
pub fn escalation_schedule(start: f64, max: Option<f64>, step: f64) -> Vec<f64> {
    let Some(max) = max.filter(|m| m.is_finite() && *m > start) else {
        return vec![start];
    };
    if !step.is_finite() || step <= 0.0 {
        return vec![start];
    }
    // Small slack so (0.3 - 0.2) / 0.1 does not round up to an extra step.
    let steps = ((max - start) / step - 1e-9).ceil().max(0.0) as usize;
    (0..=steps)
        .map(|k| (start + k as f64 * step).min(max))
        .collect()
}
