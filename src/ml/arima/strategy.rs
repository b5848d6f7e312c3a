use tracing::{debug, info};

use super::model::{z_score, ArimaModel, ArimaOrder};
use super::stationarity::select_differencing;
use super::stepwise::{SearchLimits, StepwiseSearch};
use crate::config::ClassicalSettings;
use crate::error::ForecastError;
use crate::indicators::variance;
use crate::ml::{FittedModel, Forecast, ForecastStrategy, StrategyKind};

/// Automatic ARIMA order selection over the most recent `training_window` closes.
pub struct ClassicalStrategy {
    settings: ClassicalSettings,
}

impl ClassicalStrategy {
    pub fn new(settings: ClassicalSettings) -> Self {
        Self { settings }
    }

    fn limits(&self) -> SearchLimits {
        SearchLimits {
            max_p: self.settings.max_p,
            max_q: self.settings.max_q,
            max_order: self.settings.max_order,
            max_steps: self.settings.max_steps,
        }
    }
}

impl ForecastStrategy for ClassicalStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Classical
    }

    fn min_points(&self, _horizon: usize) -> usize {
        self.settings.min_points
    }

    fn fit(&self, closes: &[f64], _horizon: usize) -> Result<Box<dyn FittedModel>, ForecastError> {
        let start = closes.len().saturating_sub(self.settings.training_window);
        let slice = &closes[start..];
        if slice.len() < self.settings.min_points {
            return Err(ForecastError::InsufficientHistory {
                required: self.settings.min_points,
                available: slice.len(),
            });
        }

        let z = z_score(self.settings.confidence_level).ok_or_else(|| {
            ForecastError::fit_failure(format!(
                "unsupported confidence level {}",
                self.settings.confidence_level
            ))
        })?;

        // A flat slice is modelled as its own mean.
        if variance(slice).unwrap_or(0.0) == 0.0 {
            let model = ArimaModel::fit(slice, ArimaOrder::new(0, 0, 0, true))
                .map_err(ForecastError::fit_failure)?;
            debug!("constant training slice, using mean model");
            return Ok(Box::new(ClassicalFit { model, level: self.settings.confidence_level, z }));
        }

        let d = select_differencing(slice, self.settings.max_d);
        debug!(d, points = slice.len(), "differencing order selected");

        let (model, trace) = StepwiseSearch::new(slice, d, self.settings.criterion, self.limits()).run();
        let model = model.ok_or_else(|| {
            ForecastError::fit_failure(format!(
                "all {} candidate orders were rejected (d={})",
                trace.len(),
                d
            ))
        })?;

        info!(
            model = %model.summary(),
            candidates = trace.len(),
            rejected = trace.iter().filter(|t| t.rejection.is_some()).count(),
            "classical model selected"
        );

        Ok(Box::new(ClassicalFit {
            model,
            level: self.settings.confidence_level,
            z,
        }))
    }
}

/// A selected ARIMA model ready to forecast with a symmetric interval.
pub struct ClassicalFit {
    model: ArimaModel,
    level: f64,
    z: f64,
}

impl ClassicalFit {
    pub fn model(&self) -> &ArimaModel {
        &self.model
    }
}

impl FittedModel for ClassicalFit {
    fn describe(&self) -> String {
        self.model.order.to_string()
    }

    fn forecast(&self, horizon: usize) -> Result<Forecast, ForecastError> {
        let (points, band) = self.model.forecast_band(horizon, self.level, self.z);
        Ok(Forecast { points, band: Some(band) })
    }
}
