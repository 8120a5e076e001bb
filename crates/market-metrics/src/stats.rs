//! Order-independent summary statistics.
//! Every helper takes values already sorted with `sorted()`, so floating-point
//! sums come out identical regardless of the order records arrived in.

use statrs::statistics::{Data, Median, Statistics};

/// Collect and sort ascending (total order, NaN-safe).
pub fn sorted<I>(values: I) -> Vec<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut out: Vec<f64> = values.into_iter().collect();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

pub fn mean(sorted: &[f64]) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    Some(sorted.mean())
}

/// Sample standard deviation; `None` below two values.
pub fn std_dev(sorted: &[f64]) -> Option<f64> {
    if sorted.len() < 2 {
        return None;
    }
    Some(sorted.std_dev())
}

pub fn median(sorted: &[f64]) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    Some(Data::new(sorted.to_vec()).median())
}

/// Percentile rank of `value` within `data` (0.0 to 1.0).
/// Midpoint interpolation: ties count as half. Empty data is neutral (0.5).
pub fn percentile_rank(value: f64, data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.5;
    }
    let count_below = data.iter().filter(|&&x| x < value).count();
    let count_equal = data.iter().filter(|&&x| x == value).count();
    (count_below as f64 + 0.5 * count_equal as f64) / data.len() as f64
}

/// Min-max position of `value` within `data`; 0.5 when the range is degenerate.
pub fn min_max_position(value: f64, data: &[f64]) -> f64 {
    let lo = data.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() || !hi.is_finite() || hi - lo < f64::EPSILON {
        return 0.5;
    }
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}
