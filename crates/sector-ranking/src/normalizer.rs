/// Value assigned to every member of a degenerate (empty-range) set
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Min-max rescale `values` to 0..=100, preserving length and order.
///
/// When all values are equal every output is exactly 50. Infinite
/// extremes also give 50, since no finite span separates them.
pub fn normalize(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }

    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == min {
        return vec![NEUTRAL_SCORE; values.len()];
    }

    // Halve everything when max - min overflows, e.g. [-1e308, 1e308]
    let scale = if (max - min).is_finite() { 1.0 } else { 0.5 };
    let low = min * scale;
    let span = max * scale - low;
    if !span.is_finite() {
        return vec![NEUTRAL_SCORE; values.len()];
    }

    values
        .iter()
        .map(|v| ((v * scale - low) / span * 100.0).clamp(0.0, 100.0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(normalize(&[5.0, 5.0, 5.0]), vec![50.0, 50.0, 50.0]);
        assert!(normalize(&[]).is_empty());
        assert_eq!(normalize(&[-3.2]), vec![50.0]);
    }

    #[test]
    fn test_extremes_map_to_bounds() {
        let out = normalize(&[10.0, -5.0, 2.5, 20.0]);
        assert_eq!(out[1], 0.0);
        assert_eq!(out[3], 100.0);
        assert!((out[0] - 60.0).abs() < 1e-9);
        assert!((out[2] - 30.0).abs() < 1e-9);

        assert_eq!(normalize(&[-1e308, 0.0, 1e308]), vec![0.0, 50.0, 100.0]);
        assert_eq!(normalize(&[f64::MAX, f64::MIN]), vec![100.0, 0.0]);
    }

    #[test]
    fn test_infinite_extremes_fall_back_to_neutral() {
        assert_eq!(normalize(&[f64::NEG_INFINITY, 1.0, f64::INFINITY]), vec![50.0, 50.0, 50.0]);
    }

    #[test]
    fn test_output_in_range() {
        let inputs = [0.001, 1e6, -42.0, 3.14, 3.14, 99.9, -1e-3];
        for v in normalize(&inputs) {
            assert!((0.0..=100.0).contains(&v));
        }
    }
}
