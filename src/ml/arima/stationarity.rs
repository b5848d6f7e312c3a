use crate::indicators::mean;

/// 5% critical value of the KPSS level-stationarity statistic.
pub const KPSS_CRITICAL_5PCT: f64 = 0.463;

/// Difference a series `d` times.
pub fn difference(data: &[f64], d: usize) -> Vec<f64> {
    let mut result = data.to_vec();
    for _ in 0..d {
        if result.len() < 2 {
            return Vec::new();
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// Undo `d` differences of `forecasts` given the original history they continue.
pub fn undifference(forecasts: &[f64], history: &[f64], d: usize) -> Vec<f64> {
    let mut result = forecasts.to_vec();
    for level in (0..d).rev() {
        let base = difference(history, level).last().copied().unwrap_or(0.0);
        let mut cumsum = base;
        for v in result.iter_mut() {
            cumsum += *v;
            *v = cumsum;
        }
    }
    result
}

/// KPSS statistic for level stationarity with a Bartlett-weighted long-run variance.
/// Returns 0.0 for a series with no variation (trivially stationary).
pub fn kpss_statistic(data: &[f64]) -> f64 {
    let n = data.len();
    let Some(m) = mean(data) else {
        return 0.0;
    };
    let residuals: Vec<f64> = data.iter().map(|v| v - m).collect();

    let lags = ((3.0 * (n as f64).sqrt()) / 13.0).trunc() as usize;
    let mut long_run = residuals.iter().map(|e| e * e).sum::<f64>() / n as f64;
    for s in 1..=lags.min(n.saturating_sub(1)) {
        let weight = 1.0 - s as f64 / (lags as f64 + 1.0);
        let autocov: f64 = (s..n).map(|t| residuals[t] * residuals[t - s]).sum::<f64>() / n as f64;
        long_run += 2.0 * weight * autocov;
    }
    if long_run <= f64::EPSILON * m.abs().max(1.0) {
        return 0.0;
    }

    let mut partial = 0.0;
    let mut eta = 0.0;
    for e in &residuals {
        partial += e;
        eta += partial * partial;
    }
    eta / ((n * n) as f64 * long_run)
}

/// Smallest number of differences (up to `max_d`) after which the KPSS test
/// no longer rejects level stationarity.
pub fn select_differencing(data: &[f64], max_d: usize) -> usize {
    let mut d = 0;
    let mut current = data.to_vec();
    while d < max_d {
        if current.len() < 3 || kpss_statistic(&current) <= KPSS_CRITICAL_5PCT {
            break;
        }
        current = difference(&current, 1);
        d += 1;
    }
    d
}
