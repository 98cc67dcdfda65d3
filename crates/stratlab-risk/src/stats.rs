//! Sample statistics.

/// Arithmetic mean. Zero for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample covariance with `ddof = 1`.
///
/// Returns `None` when fewer than two paired observations exist or the
/// slices differ in length.
pub fn covariance(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let (mx, my) = (mean(x), mean(y));
    let sum: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
    Some(sum / (x.len() - 1) as f64)
}

/// Sample variance with `ddof = 1`.
pub fn variance(values: &[f64]) -> Option<f64> {
    covariance(values, values)
}

/// Sample standard deviation with `ddof = 1`.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    variance(values).map(|v| v.max(0.0).sqrt())
}

/// Location and scale of a return sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    /// Number of observations
    pub count: usize,
    /// Sample mean
    pub mean: f64,
    /// Sample standard deviation, `None` below two observations
    pub std_dev: Option<f64>,
}

impl Moments {
    /// Compute moments of a sample.
    pub fn of(values: &[f64]) -> Self {
        Self {
            count: values.len(),
            mean: mean(values),
            std_dev: std_dev(values),
        }
    }

    /// Whether all moments are finite.
    pub fn is_finite(&self) -> bool {
        self.mean.is_finite() && self.std_dev.map_or(true, f64::is_finite)
    }
}
