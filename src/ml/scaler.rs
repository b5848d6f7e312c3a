use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

/// Min-max normalization onto [0, 1], fitted once on one instrument's training slice.
///
/// A constant slice has zero range; the scaler then uses a unit range so that
/// values map to 0.0 and invert back exactly instead of dividing by zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: f64,
    max: f64,
    range: f64,
    degenerate: bool,
}

impl MinMaxScaler {
    pub fn fit(values: &[f64]) -> Result<Self, ForecastError> {
        if values.is_empty() {
            return Err(ForecastError::scaling("cannot fit scaler on an empty slice"));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::scaling("training slice contains non-finite values"));
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let raw_range = max - min;
        let tolerance = f64::EPSILON * max.abs().max(1.0);
        let degenerate = raw_range <= tolerance;

        Ok(Self {
            min,
            max,
            range: if degenerate { 1.0 } else { raw_range },
            degenerate,
        })
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.min) / self.range
    }

    pub fn inverse(&self, scaled: f64) -> f64 {
        scaled * self.range + self.min
    }

    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| self.transform(*v)).collect()
    }

    pub fn inverse_all(&self, scaled: &[f64]) -> Vec<f64> {
        scaled.iter().map(|v| self.inverse(*v)).collect()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Zero-range fit (constant training slice).
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }
}
