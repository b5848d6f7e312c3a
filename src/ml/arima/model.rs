use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

use super::stationarity::{difference, undifference};
use crate::indicators::mean;
use crate::types::ConfidenceBand;

/// Residual variance never drops below this, so an exact fit (e.g. a constant
/// series) still has a finite likelihood.
const SIGMA2_FLOOR: f64 = 1e-10;

/// Information criterion minimized by the order search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InformationCriterion {
    #[default]
    Aic,
    Aicc,
    Bic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub constant: bool,
}

impl ArimaOrder {
    pub fn new(p: usize, d: usize, q: usize, constant: bool) -> Self {
        Self { p, d, q, constant }
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)?;
        if self.constant {
            write!(f, "+c")?;
        }
        Ok(())
    }
}

/// Fitted ARIMA model over a training slice.
#[derive(Debug, Clone)]
pub struct ArimaModel {
    pub order: ArimaOrder,
    pub ar_coeffs: Vec<f64>,
    pub ma_coeffs: Vec<f64>,
    pub constant: f64,
    pub sigma2: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub aicc: f64,
    pub bic: f64,
    history: Vec<f64>,
    differenced: Vec<f64>,
    residuals: Vec<f64>,
}

impl ArimaModel {
    /// Fit the given order. An `Err` marks the candidate as degenerate; callers
    /// searching over orders skip it.
    pub fn fit(data: &[f64], order: ArimaOrder) -> Result<Self, String> {
        let ArimaOrder { p, d, q, constant } = order;
        let w = difference(data, d);
        let k = p + q + usize::from(constant);
        if w.len() < p.max(q) + k + 3 {
            return Err(format!("{} needs more than {} observations", order, data.len()));
        }

        let (ar_coeffs, ma_coeffs, c) = match (p, q) {
            (0, 0) => (Vec::new(), Vec::new(), if constant { mean(&w).unwrap_or(0.0) } else { 0.0 }),
            (_, 0) => {
                let (beta, _) = regress_ar(&w, p, constant)?;
                split_coefficients(&beta, constant, p, 0)
            }
            _ => estimate_arma(&w, p, q, constant)?,
        };

        if ar_coeffs.iter().chain(ma_coeffs.iter()).any(|v| !v.is_finite()) || !c.is_finite() {
            return Err(format!("{} produced non-finite coefficients", order));
        }
        if !roots_outside_unit_circle(&ar_coeffs, false) {
            return Err(format!("{} is not stationary", order));
        }
        if !roots_outside_unit_circle(&ma_coeffs, true) {
            return Err(format!("{} is not invertible", order));
        }

        let residuals = conditional_residuals(&w, &ar_coeffs, &ma_coeffs, c);
        let n_eff = (w.len() - p) as f64;
        let ssr: f64 = residuals[p..].iter().map(|e| e * e).sum();
        let sigma2 = (ssr / n_eff).max(SIGMA2_FLOOR);
        let log_likelihood = -0.5 * n_eff * ((2.0 * PI * sigma2).ln() + 1.0);

        let n_params = (k + 1) as f64;
        let aic = -2.0 * log_likelihood + 2.0 * n_params;
        let aicc = if n_eff - n_params - 1.0 > 0.0 {
            aic + 2.0 * n_params * (n_params + 1.0) / (n_eff - n_params - 1.0)
        } else {
            f64::INFINITY
        };
        let bic = -2.0 * log_likelihood + n_params * n_eff.ln();
        if !aic.is_finite() || !bic.is_finite() {
            return Err(format!("{} has a non-finite likelihood", order));
        }

        Ok(Self {
            order,
            ar_coeffs,
            ma_coeffs,
            constant: c,
            sigma2,
            log_likelihood,
            aic,
            aicc,
            bic,
            history: data.to_vec(),
            differenced: w,
            residuals,
        })
    }

    pub fn criterion(&self, criterion: InformationCriterion) -> f64 {
        match criterion {
            InformationCriterion::Aic => self.aic,
            InformationCriterion::Aicc => self.aicc,
            InformationCriterion::Bic => self.bic,
        }
    }

    /// Point forecasts `h` steps past the end of the training slice, in price units.
    pub fn forecast(&self, h: usize) -> Vec<f64> {
        let p = self.order.p;
        let q = self.order.q;
        let mut w = self.differenced.clone();
        let mut e = self.residuals.clone();
        let mut out = Vec::with_capacity(h);

        for _ in 0..h {
            let mut next = self.constant;
            for i in 0..p {
                next += self.ar_coeffs[i] * w[w.len() - 1 - i];
            }
            for j in 0..q {
                if e.len() > j {
                    next += self.ma_coeffs[j] * e[e.len() - 1 - j];
                }
            }
            w.push(next);
            e.push(0.0);
            out.push(next);
        }

        undifference(&out, &self.history, self.order.d)
    }

    /// MA(∞) weights of the full model including the differencing operator.
    pub fn psi_weights(&self, h: usize) -> Vec<f64> {
        let mut poly = vec![1.0];
        poly.extend(self.ar_coeffs.iter().map(|phi| -phi));
        for _ in 0..self.order.d {
            poly = convolve(&poly, &[1.0, -1.0]);
        }
        let a: Vec<f64> = poly.iter().skip(1).map(|v| -v).collect();

        let mut psi = Vec::with_capacity(h);
        for j in 0..h {
            if j == 0 {
                psi.push(1.0);
                continue;
            }
            let mut value = self.ma_coeffs.get(j - 1).copied().unwrap_or(0.0);
            for (i, ai) in a.iter().enumerate().take(j) {
                value += ai * psi[j - 1 - i];
            }
            psi.push(value);
        }
        psi
    }

    /// Point forecasts with a symmetric normal interval whose width grows with
    /// the accumulated ψ-weight variance.
    pub fn forecast_band(&self, h: usize, level: f64, z: f64) -> (Vec<f64>, ConfidenceBand) {
        let points = self.forecast(h);
        let psi = self.psi_weights(h);

        let mut cumulative = 0.0;
        let mut lower = Vec::with_capacity(h);
        let mut upper = Vec::with_capacity(h);
        for (point, weight) in points.iter().zip(psi.iter()) {
            cumulative += weight * weight;
            let half_width = z * (self.sigma2 * cumulative).sqrt();
            lower.push(point - half_width);
            upper.push(point + half_width);
        }

        (points, ConfidenceBand { level, lower, upper })
    }

    pub fn summary(&self) -> String {
        let fmt_coeffs = |name: &str, coeffs: &[f64]| {
            coeffs
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{}{}={:.4}", name, i + 1, c))
                .collect::<Vec<_>>()
                .join(" ")
        };
        format!(
            "{} [{} {} c={:.4}] sigma2={:.6} aic={:.2} bic={:.2}",
            self.order,
            fmt_coeffs("ar", &self.ar_coeffs),
            fmt_coeffs("ma", &self.ma_coeffs),
            self.constant,
            self.sigma2,
            self.aic,
            self.bic
        )
    }
}

/// Two-sided normal quantile for the supported confidence levels.
pub fn z_score(level: f64) -> Option<f64> {
    const LEVELS: [(f64, f64); 4] = [(0.80, 1.2816), (0.90, 1.6449), (0.95, 1.9600), (0.99, 2.5758)];
    LEVELS
        .iter()
        .find(|(l, _)| (l - level).abs() < 1e-9)
        .map(|(_, z)| *z)
}

fn convolve(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// OLS of w_t on [1?, w_{t-1}, ..., w_{t-p}]. Returns coefficients and residuals
/// aligned to t = p..n.
fn regress_ar(w: &[f64], p: usize, constant: bool) -> Result<(Vec<f64>, Vec<f64>), String> {
    let n = w.len();
    let cols = p + usize::from(constant);
    if n <= p + cols + 1 {
        return Err(format!("AR({}) regression needs more than {} points", p, n));
    }

    let rows = n - p;
    let mut x = Vec::with_capacity(rows * cols);
    for t in p..n {
        if constant {
            x.push(1.0);
        }
        for i in 1..=p {
            x.push(w[t - i]);
        }
    }
    let x = DMatrix::from_row_slice(rows, cols, &x);
    let y = DVector::from_column_slice(&w[p..]);
    let beta = least_squares(&x, &y)?;
    let residuals = (&y - &x * &beta).iter().copied().collect();
    Ok((beta.iter().copied().collect(), residuals))
}

/// Hannan-Rissanen: a long autoregression supplies residual estimates that
/// enter a second regression as MA regressors.
fn estimate_arma(w: &[f64], p: usize, q: usize, constant: bool) -> Result<(Vec<f64>, Vec<f64>, f64), String> {
    let n = w.len();
    let long = (p + q).max(10).min(n / 4).max(1);
    let (_, long_residuals) = regress_ar(w, long, true)?;
    let mut innovations = vec![0.0; n];
    innovations[long..].copy_from_slice(&long_residuals);

    let start = p.max(long + q);
    let cols = p + q + usize::from(constant);
    if n <= start + cols + 1 {
        return Err(format!("ARMA({},{}) needs more than {} points", p, q, n));
    }

    let rows = n - start;
    let mut x = Vec::with_capacity(rows * cols);
    for t in start..n {
        if constant {
            x.push(1.0);
        }
        for i in 1..=p {
            x.push(w[t - i]);
        }
        for j in 1..=q {
            x.push(innovations[t - j]);
        }
    }
    let x = DMatrix::from_row_slice(rows, cols, &x);
    let y = DVector::from_column_slice(&w[start..]);
    let beta = least_squares(&x, &y)?;
    Ok(split_coefficients(beta.as_slice(), constant, p, q))
}

fn least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<DVector<f64>, String> {
    let xtx = x.transpose() * x;
    let xty = x.transpose() * y;
    let cholesky = xtx
        .cholesky()
        .ok_or_else(|| "singular design matrix".to_string())?;
    Ok(cholesky.solve(&xty))
}

fn split_coefficients(beta: &[f64], constant: bool, p: usize, q: usize) -> (Vec<f64>, Vec<f64>, f64) {
    let offset = usize::from(constant);
    let c = if constant { beta[0] } else { 0.0 };
    let ar = beta[offset..offset + p].to_vec();
    let ma = beta[offset + p..offset + p + q].to_vec();
    (ar, ma, c)
}

/// e_t = w_t - c - Σ φ_i w_{t-i} - Σ θ_j e_{t-j}, with e_t = 0 for t < p.
fn conditional_residuals(w: &[f64], ar: &[f64], ma: &[f64], c: f64) -> Vec<f64> {
    let p = ar.len();
    let mut e = vec![0.0; w.len()];
    for t in p..w.len() {
        let mut fitted = c;
        for (i, phi) in ar.iter().enumerate() {
            fitted += phi * w[t - 1 - i];
        }
        for (j, theta) in ma.iter().enumerate() {
            if t > j {
                fitted += theta * e[t - 1 - j];
            }
        }
        e[t] = w[t] - fitted;
    }
    e
}

/// Stationarity (AR) or invertibility (MA): every eigenvalue of the companion
/// matrix lies strictly inside the unit circle.
fn roots_outside_unit_circle(coeffs: &[f64], moving_average: bool) -> bool {
    let k = coeffs.len();
    if k == 0 {
        return true;
    }
    let mut companion = DMatrix::<f64>::zeros(k, k);
    for (i, c) in coeffs.iter().enumerate() {
        companion[(0, i)] = if moving_average { -c } else { *c };
    }
    for i in 1..k {
        companion[(i, i - 1)] = 1.0;
    }
    companion
        .complex_eigenvalues()
        .iter()
        .all(|lambda| lambda.norm_sqr() < (1.0 - 1e-8_f64).powi(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn ar1_process(phi: f64, n: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(7);
        let mut data = vec![0.0];
        for i in 1..n {
            let noise: f64 = rng.gen_range(-1.0..1.0);
            data.push(phi * data[i - 1] + noise);
        }
        data
    }

    #[test]
    fn test_ar_model_recovers_coefficient() {
        let data = ar1_process(0.7, 500);
        let model = ArimaModel::fit(&data, ArimaOrder::new(1, 0, 0, true)).unwrap();
        assert!((model.ar_coeffs[0] - 0.7).abs() < 0.2);
        assert!(model.aic.is_finite());
    }

    #[test]
    fn test_arma_fit_is_finite() {
        let data = ar1_process(0.5, 200);
        let model = ArimaModel::fit(&data, ArimaOrder::new(1, 0, 1, true)).unwrap();
        assert_eq!(model.ma_coeffs.len(), 1);
        assert!(model.sigma2 > 0.0);
    }

    #[test]
    fn test_explosive_ar_is_rejected() {
        assert!(!roots_outside_unit_circle(&[1.2], false));
        assert!(roots_outside_unit_circle(&[0.5, 0.3], false));
        assert!(!roots_outside_unit_circle(&[-1.5], true));
    }

    #[test]
    fn test_random_walk_forecast_is_flat_with_growing_band() {
        let data: Vec<f64> = (0..40).map(|i| 100.0 + ((i * 37) % 11) as f64 - 5.0).collect();
        let model = ArimaModel::fit(&data, ArimaOrder::new(0, 1, 0, false)).unwrap();
        let z = z_score(0.95).unwrap();
        let (points, band) = model.forecast_band(10, 0.95, z);
        assert!(points.iter().all(|p| (*p - data[39]).abs() < 1e-12));
        let widths: Vec<f64> = band.upper.iter().zip(&band.lower).map(|(u, l)| u - l).collect();
        for pair in widths.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert!(widths[9] > widths[0]);
    }

    #[test]
    fn test_psi_weights_of_integrated_ar() {
        let model = ArimaModel {
            order: ArimaOrder::new(1, 1, 0, false),
            ar_coeffs: vec![0.5],
            ma_coeffs: vec![],
            constant: 0.0,
            sigma2: 1.0,
            log_likelihood: 0.0,
            aic: 0.0,
            aicc: 0.0,
            bic: 0.0,
            history: vec![],
            differenced: vec![],
            residuals: vec![],
        };
        // (1 - 0.5B)(1 - B) = 1 - 1.5B + 0.5B^2
        let psi = model.psi_weights(4);
        assert_eq!(psi[0], 1.0);
        assert!((psi[1] - 1.5).abs() < 1e-12);
        assert!((psi[2] - (1.5 * 1.5 - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_constant_series_fits_mean_model() {
        let data = vec![100.0; 30];
        let model = ArimaModel::fit(&data, ArimaOrder::new(0, 0, 0, true)).unwrap();
        assert_eq!(model.forecast(5), vec![100.0; 5]);
        assert_eq!(model.sigma2, SIGMA2_FLOOR);
    }

    #[test]
    fn test_unit_circle_check_handles_complex_roots() {
        assert!(roots_outside_unit_circle(&[0.5], false));
        assert!(!roots_outside_unit_circle(&[1.2], false));
        // phi2 = -0.81 gives eigenvalues +-0.9i, -1.21 gives +-1.1i.
        assert!(roots_outside_unit_circle(&[0.0, -0.81], false));
        assert!(!roots_outside_unit_circle(&[0.0, -1.21], false));
        assert!(!roots_outside_unit_circle(&[-1.0], true));
    }

    #[test]
    fn test_z_score_table() {
        assert_eq!(z_score(0.95), Some(1.96));
        assert_eq!(z_score(0.5), None);
    }
}
