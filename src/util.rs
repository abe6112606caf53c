pub fn mean(data: &[f64]) -> Option<f64> {
    let sum = data.iter().sum::<f64>();
    let count = data.len();

    match count {
        positive if positive > 0 => Some(sum / count as f64),
        _ => None,
    }
}

/// Sample standard deviation (Bessel's correction). A single value has no spread, so
/// it yields `Some(0.0)`.
pub fn std_dev(data: &[f64]) -> Option<f64> {
    match (mean(data), data.len()) {
        (Some(_), 1) => Some(0.0),
        (Some(data_mean), count) => {
            let variance = data
                .iter()
                .map(|value| {
                    let diff = data_mean - *value;

                    diff * diff
                })
                .sum::<f64>()
                / (count - 1) as f64;

            Some(variance.sqrt())
        }
        _ => None,
    }
}

pub fn median(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn min_max(data: &[f64]) -> Option<(f64, f64)> {
    data.iter().copied().fold(None, |acc, value| match acc {
        None => Some((value, value)),
        Some((lo, hi)) => Some((lo.min(value), hi.max(value))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[10., 20., 30., 15., 22.]), Some(19.4));
        assert_eq!(mean(&[15., 7., 55., 12., 4.]), Some(18.6));
    }

    #[test]
    fn test_mean_empty_slice() {
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_std_dev_uses_sample_denominator() {
        // variance = (4 + 1 + 0 + 1 + 4) / 4
        let sd = std_dev(&[1., 2., 3., 4., 5.]).unwrap();
        assert!((sd - 2.5_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_std_dev_reference_sample() {
        let sd = std_dev(&[200., 300., 400., 500., 600.]).unwrap();
        assert!((sd - 158.11388300841898).abs() < 1e-9);
    }

    #[test]
    fn test_std_dev_single_value() {
        assert_eq!(std_dev(&[42.0]), Some(0.0));
    }

    #[test]
    fn test_std_dev_empty_slice() {
        assert_eq!(std_dev(&[]), None);
    }

    #[test]
    fn test_std_dev_identical_values() {
        assert_eq!(std_dev(&[5.0, 5.0, 5.0, 5.0]), Some(0.0));
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[300., 100., 200.]), Some(200.));
        assert_eq!(median(&[400., 100., 300., 200.]), Some(250.));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_min_max() {
        assert_eq!(min_max(&[250., 180., 420.]), Some((180., 420.)));
        assert_eq!(min_max(&[]), None);
    }
}
