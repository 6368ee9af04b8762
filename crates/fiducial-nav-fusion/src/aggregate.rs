//! Weighted per-axis statistics over fused inliers.

use nalgebra::Point3;

/// Per-axis weighted mean. Zero total weight gives the origin.
pub fn weighted_mean(samples: &[(Point3<f64>, f64)]) -> Point3<f64> {
    let total: f64 = samples.iter().map(|(_, w)| w).sum();
    if total <= 0.0 || !total.is_finite() {
        return Point3::origin();
    }
    let sum = samples
        .iter()
        .fold(nalgebra::Vector3::zeros(), |acc, (p, w)| acc + p.coords * *w);
    Point3::from(sum / total)
}

/// Weighted median of one axis: the first sorted value at which the
/// cumulative weight reaches half the total.
pub fn weighted_median_1d(values: &mut [(f64, f64)]) -> Option<f64> {
    let last = values.len().checked_sub(1)?;
    values.sort_by(|a, b| a.0.total_cmp(&b.0));
    let half = 0.5 * values.iter().map(|(_, w)| w).sum::<f64>();
    let mut cumulative = 0.0;
    for (v, w) in values.iter() {
        cumulative += w;
        if cumulative >= half {
            return Some(*v);
        }
    }
    Some(values[last].0)
}

/// Per-axis weighted median. Zero total weight gives the origin.
pub fn weighted_median(samples: &[(Point3<f64>, f64)]) -> Point3<f64> {
    let total: f64 = samples.iter().map(|(_, w)| w).sum();
    if total <= 0.0 || !total.is_finite() {
        return Point3::origin();
    }
    let mut out = Point3::origin();
    for axis in 0..3 {
        let mut values: Vec<(f64, f64)> = samples.iter().map(|(p, w)| (p[axis], *w)).collect();
        if let Some(m) = weighted_median_1d(&mut values) {
            out[axis] = m;
        }
    }
    out
}
