//! Small statistics helpers.

use ndarray::ArrayView1;

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    ArrayView1::from(values).mean()
}

/// Sample standard deviation (n − 1); `None` below two observations.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    (values.len() >= 2).then(|| ArrayView1::from(values).std(1.0))
}
