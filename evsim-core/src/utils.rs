//! Numeric helpers shared across the crate

use crate::imports::*;

pub mod interp;
pub use interp::{Extrapolate, Interp1D};

/// Seconds per hour
pub const S_PER_H: f64 = 3_600.0;
/// Meters per second per kilometer per hour
pub const MPS_PER_KMH: f64 = 1.0 / 3.6;

/// Returns true if `data` is sorted in strictly increasing order
pub fn is_strictly_increasing(data: &[f64]) -> bool {
    data.windows(2).all(|w| w[0] < w[1])
}

/// Returns true if `val1` and `val2` are within a relative/absolute error of `epsilon`
pub fn almost_eq(val1: f64, val2: f64, epsilon: Option<f64>) -> bool {
    let epsilon = epsilon.unwrap_or(1e-8);
    ((val2 - val1) / (val1 + val2)).abs() < epsilon || (val2 - val1).abs() < epsilon
}

/// Returns true if `val1` is greater than or equal to `val2` with some error margin, `epsilon`
pub fn almost_ge(val1: f64, val2: f64, epsilon: Option<f64>) -> bool {
    let epsilon = epsilon.unwrap_or(1e-8);
    val1 > val2 * (1.0 - epsilon) || val1 > val2 - epsilon
}

/// Returns true if `val1` is less than or equal to `val2` with some error margin, `epsilon`
pub fn almost_le(val1: f64, val2: f64, epsilon: Option<f64>) -> bool {
    let epsilon = epsilon.unwrap_or(1e-8);
    val1 < val2 * (1.0 + epsilon) || val1 < val2 + epsilon
}

/// Errors with [`SimError::Numerical`] if `val` is NaN or infinite
pub fn ensure_finite(val: f64, quantity: &'static str, step: usize) -> anyhow::Result<f64> {
    if val.is_finite() {
        Ok(val)
    } else {
        Err(SimError::Numerical { quantity, step }.into())
    }
}

/// Sample mean and (population) standard deviation
pub fn mean_std(data: &[f64]) -> (f64, f64) {
    if data.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Linearly interpolated percentile of already sorted `data`; `pct` in [0, 100]
pub fn percentile_sorted(data: &[f64], pct: f64) -> f64 {
    match data.len() {
        0 => f64::NAN,
        1 => data[0],
        n => {
            let rank = (pct / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            data[lo] + (data[hi] - data[lo]) * (rank - lo as f64)
        }
    }
}
