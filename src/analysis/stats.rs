//! Descriptive statistics over value slices.
//!
//! All functions are total: empty or degenerate input yields 0 rather than NaN.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Median absolute deviation around `center`.
pub fn median_absolute_deviation(values: &[f64], center: f64) -> f64 {
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Pearson correlation. Returns 0 when either side has zero variance.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let (mean_a, mean_b) = (mean(a), mean(b));

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON || !denom.is_finite() {
        return 0.0;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

/// Sample autocorrelation at `lag`, normalised by the lag-0 sum of squares.
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    let n = values.len();
    if lag >= n {
        return 0.0;
    }
    let m = mean(values);
    let denom: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    if denom <= f64::EPSILON {
        return 0.0;
    }
    let num: f64 = (0..n - lag)
        .map(|i| (values[i] - m) * (values[i + lag] - m))
        .sum();
    num / denom
}

/// Simple percent changes between consecutive values; non-finite changes are skipped.
pub fn percent_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| (w[1] - w[0]) / w[0])
        .filter(|r| r.is_finite())
        .collect()
}
