//! Small descriptive-statistics helpers over `f64` slices.

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (ddof = 0); `None` for an empty slice.
///
/// A constant slice yields exactly zero, free of rounding residue.
pub fn std_population(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if values.iter().all(|v| *v == values[0]) {
        return Some(0.0);
    }
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Quantile with linear interpolation between closest ranks.
///
/// `q` is in `[0, 1]`. Matches the default interpolation used by most
/// dataframe libraries. `None` for an empty slice.
pub fn quantile_linear(values: &[f64], q: f64) -> Option<f64> {
    let sorted = sorted_copy(values)?;
    let h = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    Some(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
}

/// Quantile picking the nearest rank (no interpolation).
///
/// The result is always an element of `values`, so clipping a series to its
/// own nearest-rank quantiles leaves those quantiles unchanged.
pub fn quantile_nearest(values: &[f64], q: f64) -> Option<f64> {
    let sorted = sorted_copy(values)?;
    let idx = (q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64).round() as usize;
    Some(sorted[idx])
}

/// Median (linear interpolation for even lengths).
pub fn median(values: &[f64]) -> Option<f64> {
    quantile_linear(values, 0.5)
}

fn sorted_copy(values: &[f64]) -> Option<Vec<f64>> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_std() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&v), Some(5.0));
        assert!((std_population(&v).unwrap_or(0.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn constant_slice_has_exact_zero_std() {
        for v in [0.1, 41.3, 1e-3] {
            assert_eq!(std_population(&[v; 7]), Some(0.0));
        }
    }

    #[test]
    fn empty_inputs_return_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(std_population(&[]), None);
        assert_eq!(quantile_linear(&[], 0.5), None);
        assert_eq!(quantile_nearest(&[], 0.5), None);
    }

    #[test]
    fn linear_quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile_linear(&v, 0.0), Some(1.0));
        assert_eq!(quantile_linear(&v, 1.0), Some(4.0));
        assert_eq!(median(&v), Some(2.5));
        // h = 0.05 * 3 = 0.15
        let p5 = quantile_linear(&v, 0.05).unwrap_or(0.0);
        assert!((p5 - 1.15).abs() < 1e-12);
    }

    #[test]
    fn nearest_quantile_returns_member() {
        let v = [10.0, 1.0, 7.0, 3.0, 5.0];
        let q = quantile_nearest(&v, 0.3).unwrap_or(f64::NAN);
        assert!(v.contains(&q));
        assert_eq!(quantile_nearest(&v, 0.99), Some(10.0));
    }
}
