/// Log-returns `ln(p_t / p_{t-1})` over adjacent pairs.
///
/// Pairs where either price is non-finite or not strictly positive are
/// skipped; the output only holds valid transitions.
pub fn log_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0].is_finite() && w[1].is_finite() && w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect()
}

pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    Some(xs.iter().sum::<f64>() / xs.len() as f64)
}

/// Sample standard deviation (n - 1 divisor). Returns 0.0 below two samples,
/// unlike `mean` which is `None` on empty input.
pub fn stdev(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 2 {
        return 0.0;
    }
    let mu = xs.iter().sum::<f64>() / n as f64;
    let variance = xs.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_returns_skips_invalid_pairs() {
        let prices = [100.0, 110.0, 0.0, 50.0, 55.0, f64::NAN, 60.0];
        let rets = log_returns(&prices);
        // 110->0, 0->50 and both NaN pairs are dropped
        assert_eq!(rets.len(), 2);
        assert!((rets[0] - (1.1f64).ln()).abs() < 1e-12);
        assert!((rets[1] - (1.1f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_log_returns_skips_zero_current_price() {
        assert!(log_returns(&[100.0, 0.0]).is_empty());
        assert!(log_returns(&[100.0, -5.0]).is_empty());

        let rets = log_returns(&[100.0, 0.0, 120.0, 132.0]);
        assert_eq!(rets.len(), 1);
        assert!((rets[0] - (1.1f64).ln()).abs() < 1e-12);
        assert!(rets.iter().all(|r| r.is_finite()));
    }

    #[test]
    fn test_log_returns_short_input() {
        assert!(log_returns(&[]).is_empty());
        assert!(log_returns(&[42.0]).is_empty());
    }

    #[test]
    fn test_mean_and_stdev_edge_cases() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[2.0, 4.0]), Some(3.0));
        assert_eq!(stdev(&[]), 0.0);
        assert_eq!(stdev(&[5.0]), 0.0);
    }

    #[test]
    fn test_stdev_uses_bessel_correction() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        // Sum of squared deviations = 32, n - 1 = 7
        let expected = (32.0f64 / 7.0).sqrt();
        assert!((stdev(&xs) - expected).abs() < 1e-12);
    }
}
