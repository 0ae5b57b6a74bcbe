use std::time::Duration;

/// Fraction of `baseline` covered by `weight`, clamped to `[0, 1]`.
///
/// A zero baseline yields 0 rather than NaN.
pub fn percentage(weight: Duration, baseline: Duration) -> f64 {
    if baseline.is_zero() {
        return 0.0;
    }
    (weight.as_nanos() as f64 / baseline.as_nanos() as f64).clamp(0.0, 1.0)
}

/// `0.6` -> `"60.00%"`.
pub fn format_percentage(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}
