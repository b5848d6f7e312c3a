use chrono::{Duration as DateDuration, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

use super::calendar::business_days_after;
use crate::config::ForecastConfig;
use crate::error::ForecastError;
use crate::indicators::{derive_features, FeatureSet};
use crate::market_data::DataSource;
use crate::ml::ForecastStrategy;
use crate::types::{
    ForecastResult, IngestStats, InstrumentForecast, InstrumentId, InstrumentOutcome, MissingClosePolicy,
    PipelineStage, PriceSeries,
};

/// Per-instrument pipeline parameters, taken from the run configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub horizon: usize,
    pub feature_windows: Vec<usize>,
    pub history_days: u32,
    pub recent_days: usize,
    pub missing_close: MissingClosePolicy,
    pub instrument_timeout: Option<Duration>,
}

impl PipelineSettings {
    pub fn from_config(config: &ForecastConfig) -> Self {
        Self {
            horizon: config.forecast_horizon,
            feature_windows: config.feature_windows.clone(),
            history_days: config.history_days,
            recent_days: config.recent_days,
            missing_close: config.missing_close,
            instrument_timeout: config.batch.instrument_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Runs fetch → features → fit → forecast → package for one instrument and
/// turns every failure into an outcome instead of an error.
pub struct ForecastOrchestrator {
    source: Arc<dyn DataSource>,
    strategy: Arc<dyn ForecastStrategy>,
    settings: PipelineSettings,
}

impl ForecastOrchestrator {
    pub fn new(source: Arc<dyn DataSource>, strategy: Arc<dyn ForecastStrategy>, settings: PipelineSettings) -> Self {
        Self {
            source,
            strategy,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn strategy(&self) -> &Arc<dyn ForecastStrategy> {
        &self.strategy
    }

    /// Run the pipeline for `instrument` with history ending at `as_of`.
    pub async fn run_instrument(&self, instrument: InstrumentId, as_of: NaiveDate) -> InstrumentOutcome {
        let span = info_span!("instrument", id = %instrument);
        async move {
            let (stage_tx, stage_rx) = watch::channel(None);
            let work = self.pipeline(&instrument, as_of, &stage_tx);

            let result = match self.settings.instrument_timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(result) => result,
                    Err(_) => Err(ForecastError::TimedOut {
                        seconds: limit.as_secs(),
                    }),
                },
                None => work.await,
            };

            match result {
                Ok(forecast) => {
                    info!(model = %forecast.result.model, horizon = forecast.result.horizon(), "forecast ready");
                    InstrumentOutcome::Success(Box::new(forecast))
                }
                Err(error) => {
                    let last_stage = *stage_rx.borrow();
                    warn!(stage = ?last_stage, kind = %error.kind(), "instrument failed: {}", error);
                    InstrumentOutcome::failure(instrument.clone(), last_stage, error)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Fetch and clean history for `instrument`, then derive its rolling
    /// features without fitting a model.
    pub async fn features(
        &self,
        instrument: &InstrumentId,
        as_of: NaiveDate,
    ) -> Result<(PriceSeries, FeatureSet), ForecastError> {
        let (series, _) = self.load_series(instrument, as_of).await?;
        let features = derive_features(&series, &self.settings.feature_windows);
        Ok((series, features))
    }

    async fn load_series(
        &self,
        instrument: &InstrumentId,
        as_of: NaiveDate,
    ) -> Result<(PriceSeries, IngestStats), ForecastError> {
        let start = as_of - DateDuration::days(i64::from(self.settings.history_days));
        let bars = self.source.fetch_bars(instrument, start, as_of).await?;
        PriceSeries::from_bars(instrument.clone(), bars, self.settings.missing_close)
    }

    async fn pipeline(
        &self,
        instrument: &InstrumentId,
        as_of: NaiveDate,
        stage: &watch::Sender<Option<PipelineStage>>,
    ) -> Result<InstrumentForecast, ForecastError> {
        let advance = |next: PipelineStage| {
            debug!(stage = %next, "stage complete");
            stage.send_replace(Some(next));
        };

        let (series, ingest) = self.load_series(instrument, as_of).await?;
        advance(PipelineStage::Fetched);

        let features = derive_features(&series, &self.settings.feature_windows);
        let absent = features.absent_windows();
        if !absent.is_empty() {
            debug!(?absent, points = series.len(), "history too short for some feature windows");
        }
        advance(PipelineStage::FeatureDerived);

        let horizon = self.settings.horizon;
        let closes = series.closes();
        let strategy = Arc::clone(&self.strategy);
        let model = tokio::task::spawn_blocking(move || strategy.fit(&closes, horizon))
            .await
            .map_err(|e| ForecastError::fit_failure(format!("model task failed: {}", e)))??;
        advance(PipelineStage::ModelFitted);

        let forecast = model.forecast(horizon)?;
        let last_date = series
            .last_date()
            .ok_or_else(|| ForecastError::data_unavailable("series has no observations"))?;
        let result = ForecastResult::new(
            instrument.clone(),
            self.strategy.kind(),
            model.describe(),
            business_days_after(last_date, horizon),
            forecast.points,
            forecast.band,
        )?;
        advance(PipelineStage::Forecasted);

        let packaged = InstrumentForecast {
            result,
            features,
            recent_history: series.last_n(self.settings.recent_days).to_vec(),
            ingest,
        };
        advance(PipelineStage::Packaged);
        Ok(packaged)
    }
}
