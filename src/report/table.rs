use rust_decimal::Decimal;
use std::io::Write;

use super::PresentationSink;
use crate::error::SinkError;
use crate::indicators::{highest, lowest, FeatureSet};
use crate::types::{ForecastResult, InstrumentId, PricePoint};

const WIDTH: usize = 64;

/// Round a price to cents for display. Non-finite values have no decimal form.
pub fn to_cents(value: f64) -> Option<Decimal> {
    let mut cents = Decimal::try_from(value).ok()?;
    cents.rescale(2);
    Some(cents)
}

fn cell(value: Option<f64>) -> String {
    value
        .and_then(to_cents)
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Console table: a short recent-history summary followed by one row per
/// forecast date.
pub struct TableSink<W: Write> {
    out: W,
}

impl<W: Write> TableSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> PresentationSink for TableSink<W> {
    fn render(
        &mut self,
        instrument: &InstrumentId,
        recent_history: &[PricePoint],
        result: &ForecastResult,
    ) -> Result<(), SinkError> {
        let closes: Vec<f64> = recent_history.iter().map(|p| p.close).collect();
        let out = &mut self.out;

        writeln!(out, "{}", "=".repeat(WIDTH))?;
        writeln!(out, "{}  {}  [{}]", instrument, result.model, result.strategy)?;
        writeln!(out, "{}", "-".repeat(WIDTH))?;
        if let (Some(first), Some(last)) = (recent_history.first(), recent_history.last()) {
            writeln!(out, "Recent:   {} to {} ({} closes)", first.date, last.date, recent_history.len())?;
            writeln!(
                out,
                "  Last: {}   High: {}   Low: {}",
                cell(Some(last.close)),
                cell(highest(&closes)),
                cell(lowest(&closes))
            )?;
        }

        let level = result
            .confidence_level
            .map(|l| format!("{:.0}%", l * 100.0))
            .unwrap_or_default();
        writeln!(
            out,
            "{:<12} {:>14} {:>14} {:>14}",
            "Date",
            "Forecast",
            format!("Lower {}", level).trim_end(),
            format!("Upper {}", level).trim_end()
        )?;
        for (date, point, lower, upper) in result.rows() {
            writeln!(
                out,
                "{:<12} {:>14} {:>14} {:>14}",
                date.to_string(),
                cell(Some(point)),
                cell(lower),
                cell(upper)
            )?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        writeln!(self.out, "{}", "=".repeat(WIDTH))?;
        self.out.flush()?;
        Ok(())
    }
}

/// Latest value of each rolling feature next to the last close.
pub fn write_feature_summary<W: Write>(
    out: &mut W,
    instrument: &InstrumentId,
    last: Option<&PricePoint>,
    features: &FeatureSet,
) -> Result<(), SinkError> {
    match last {
        Some(point) => write!(out, "{:<8} {}  close {:>10}", instrument.as_str(), point.date, cell(Some(point.close)))?,
        None => write!(out, "{:<8} no data", instrument.as_str())?,
    }
    for feature in &features.features {
        write!(out, "  {} {:>10}", feature.name, cell(feature.latest()))?;
    }
    writeln!(out)?;
    Ok(())
}
