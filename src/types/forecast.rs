use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

use super::{IngestStats, InstrumentId, PricePoint};
use crate::error::ForecastError;
use crate::indicators::FeatureSet;
use crate::ml::StrategyKind;

/// Forecast bundle handed to the presentation sink.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastResult {
    pub instrument: InstrumentId,
    pub strategy: StrategyKind,
    pub model: String,
    pub horizon_dates: Vec<NaiveDate>,
    pub point_forecast: Vec<f64>,
    pub lower_bound: Option<Vec<f64>>,
    pub upper_bound: Option<Vec<f64>>,
    pub confidence_level: Option<f64>,
}

/// Interval estimate aligned with the point forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceBand {
    pub level: f64,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl ForecastResult {
    /// Assemble a result, enforcing that every sequence has the horizon length
    /// and that no value is non-finite.
    pub fn new(
        instrument: InstrumentId,
        strategy: StrategyKind,
        model: String,
        horizon_dates: Vec<NaiveDate>,
        point_forecast: Vec<f64>,
        band: Option<ConfidenceBand>,
    ) -> Result<Self, ForecastError> {
        let horizon = horizon_dates.len();
        if horizon == 0 {
            return Err(ForecastError::fit_failure("empty forecast horizon"));
        }
        if point_forecast.len() != horizon {
            return Err(ForecastError::fit_failure(format!(
                "model produced {} points for a horizon of {}",
                point_forecast.len(),
                horizon
            )));
        }
        if point_forecast.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::fit_failure("model produced a non-finite forecast"));
        }

        let (lower_bound, upper_bound, confidence_level) = match band {
            Some(band) => {
                if band.lower.len() != horizon || band.upper.len() != horizon {
                    return Err(ForecastError::fit_failure(format!(
                        "confidence band length {}/{} does not match horizon {}",
                        band.lower.len(),
                        band.upper.len(),
                        horizon
                    )));
                }
                if band.lower.iter().chain(band.upper.iter()).any(|v| !v.is_finite()) {
                    return Err(ForecastError::fit_failure("model produced a non-finite interval"));
                }
                (Some(band.lower), Some(band.upper), Some(band.level))
            }
            None => (None, None, None),
        };

        Ok(Self {
            instrument,
            strategy,
            model,
            horizon_dates,
            point_forecast,
            lower_bound,
            upper_bound,
            confidence_level,
        })
    }

    pub fn horizon(&self) -> usize {
        self.horizon_dates.len()
    }

    pub fn has_bounds(&self) -> bool {
        self.lower_bound.is_some() && self.upper_bound.is_some()
    }

    /// Rows of (date, point, lower, upper) in horizon order.
    pub fn rows(&self) -> impl Iterator<Item = (NaiveDate, f64, Option<f64>, Option<f64>)> + '_ {
        self.horizon_dates.iter().enumerate().map(move |(i, date)| {
            (
                *date,
                self.point_forecast[i],
                self.lower_bound.as_ref().map(|l| l[i]),
                self.upper_bound.as_ref().map(|u| u[i]),
            )
        })
    }
}

/// States an instrument pipeline passes through on its way to a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Fetched,
    FeatureDerived,
    ModelFitted,
    Forecasted,
    Packaged,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Fetched => write!(f, "Fetched"),
            PipelineStage::FeatureDerived => write!(f, "FeatureDerived"),
            PipelineStage::ModelFitted => write!(f, "ModelFitted"),
            PipelineStage::Forecasted => write!(f, "Forecasted"),
            PipelineStage::Packaged => write!(f, "Packaged"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentForecast {
    pub result: ForecastResult,
    pub features: FeatureSet,
    pub recent_history: Vec<PricePoint>,
    pub ingest: IngestStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentFailure {
    pub instrument: InstrumentId,
    /// Last stage the pipeline completed before failing, if any.
    pub last_stage: Option<PipelineStage>,
    pub error: ForecastError,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstrumentOutcome {
    Success(Box<InstrumentForecast>),
    Failure(InstrumentFailure),
}

impl InstrumentOutcome {
    pub fn failure(instrument: InstrumentId, last_stage: Option<PipelineStage>, error: ForecastError) -> Self {
        Self::Failure(InstrumentFailure { instrument, last_stage, error })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn instrument(&self) -> &InstrumentId {
        match self {
            Self::Success(f) => &f.result.instrument,
            Self::Failure(f) => &f.instrument,
        }
    }

    pub fn as_success(&self) -> Option<&InstrumentForecast> {
        match self {
            Self::Success(f) => Some(f),
            Self::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ForecastError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(&f.error),
        }
    }
}
