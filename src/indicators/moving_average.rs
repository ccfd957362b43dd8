/// Exponential Moving Average for every bar of `values`
///
/// Smoothing factor is `2 / (period + 1)` and the series is seeded with the
/// first value, so the result has one entry per input and no look-ahead.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let Some(&first) = values.first() else {
        return out;
    };

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut ema = first;
    out.push(ema);

    for &value in &values[1..] {
        ema = alpha * value + (1.0 - alpha) * ema;
        out.push(ema);
    }

    out
}

/// Simple rolling mean; `None` until `period` values are available
pub fn sma_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;

    for (i, &value) in values.iter().enumerate() {
        sum += value;
        if i >= period {
            sum -= values[i - period];
        }

        if i + 1 >= period {
            out.push(Some(sum / period as f64));
        } else {
            out.push(None);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ema_seeded_by_first_value() {
        let values = vec![10.0, 20.0, 30.0];
        let ema = ema_series(&values, 3); // alpha = 0.5

        assert_eq!(ema.len(), 3);
        assert_eq!(ema[0], 10.0);
        assert_eq!(ema[1], 15.0);
        assert_eq!(ema[2], 22.5);
    }

    #[test]
    fn test_ema_constant_series() {
        let values = vec![42.0; 50];
        let ema = ema_series(&values, 20);
        assert!(ema.iter().all(|&v| (v - 42.0).abs() < 1e-12));
    }

    #[test]
    fn test_ema_empty() {
        assert!(ema_series(&[], 5).is_empty());
    }

    #[test]
    fn test_sma_series() {
        let values = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        let sma = sma_series(&values, 3);

        assert_eq!(sma[0], None);
        assert_eq!(sma[1], None);
        assert_eq!(sma[2], Some(102.0));
        assert_eq!(sma[3], Some(104.0));
        assert_eq!(sma[4], Some(106.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let sma = sma_series(&[100.0, 102.0], 5);
        assert!(sma.iter().all(Option::is_none));
    }
}
