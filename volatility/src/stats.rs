//! Small numeric helpers shared by the metric computations.

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population standard deviation. A single sample has zero spread.
pub fn std_dev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

/// Rank-based percentile of `x` within `xs`, in [0, 100]. Ties count half a
/// rank each. An empty sample reports the neutral median.
pub fn percentile_rank(xs: &[f64], x: f64) -> f64 {
    if xs.is_empty() {
        return 50.0;
    }
    let below = xs.iter().filter(|&&v| v < x).count() as f64;
    let equal = xs.iter().filter(|&&v| v == x).count() as f64;
    (below + 0.5 * equal) / xs.len() as f64 * 100.0
}

/// Standard z-score of `x` against the sample; zero when the sample has no
/// spread.
pub fn zscore(xs: &[f64], x: f64) -> f64 {
    let sd = std_dev(xs);
    if sd == 0.0 {
        return 0.0;
    }
    (x - mean(xs)) / sd
}

/// Log-returns of consecutive prices. Pairs touching a non-positive price
/// are skipped rather than poisoning the series with NaN.
pub fn log_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_std_of_constant_series() {
        let xs = [3.0, 3.0, 3.0, 3.0];
        assert_eq!(mean(&xs), 3.0);
        assert_eq!(std_dev(&xs), 0.0);
    }

    #[test]
    fn population_std_matches_hand_computation() {
        // mean 2, squared deviations {1, 0, 1}, variance 2/3
        let xs = [1.0, 2.0, 3.0];
        assert!((std_dev(&xs) - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn percentile_rank_interpolates_ties() {
        let xs = [1.0, 2.0, 2.0, 3.0];
        // one below + half of two ties = 2 ranks of 4
        assert!((percentile_rank(&xs, 2.0) - 50.0).abs() < 1e-12);
        assert_eq!(percentile_rank(&xs, 10.0), 100.0);
        assert_eq!(percentile_rank(&xs, 0.0), 0.0);
    }

    #[test]
    fn zscore_of_constant_series_is_zero() {
        assert_eq!(zscore(&[5.0, 5.0, 5.0], 9.0), 0.0);
    }

    #[test]
    fn log_returns_skip_non_positive_prices() {
        let rs = log_returns(&[100.0, 0.0, 110.0, 121.0]);
        assert_eq!(rs.len(), 1);
        assert!((rs[0] - (1.1f64).ln()).abs() < 1e-12);
    }

    #[test]
    fn log_returns_of_flat_prices_are_zero() {
        for r in log_returns(&[42.0; 8]) {
            assert_eq!(r, 0.0);
        }
    }
}
