pub mod json;
pub mod table;

pub use json::JsonLinesSink;
pub use table::TableSink;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::BatchReport;
use crate::error::SinkError;
use crate::types::{ForecastResult, InstrumentId, InstrumentOutcome, PricePoint};

/// Receives one rendered forecast per successful instrument.
pub trait PresentationSink {
    fn render(
        &mut self,
        instrument: &InstrumentId,
        recent_history: &[PricePoint],
        result: &ForecastResult,
    ) -> Result<(), SinkError>;

    /// Called once after the last forecast.
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Feed every success of `report` to `sink` in universe order and log the
/// failures. Returns how many forecasts were rendered.
pub fn render_report(report: &BatchReport, sink: &mut dyn PresentationSink) -> Result<usize, SinkError> {
    let mut rendered = 0;
    for outcome in report.ordered() {
        match outcome {
            InstrumentOutcome::Success(forecast) => {
                sink.render(&forecast.result.instrument, &forecast.recent_history, &forecast.result)?;
                rendered += 1;
            }
            InstrumentOutcome::Failure(failure) => {
                let stage = failure
                    .last_stage
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".to_string());
                warn!(
                    "{}: {} (last stage: {}): {}",
                    failure.instrument,
                    failure.error.kind(),
                    stage,
                    failure.error
                );
            }
        }
    }
    sink.finish()?;
    info!("Rendered {} of {} instruments", rendered, report.outcomes.len());
    Ok(rendered)
}
