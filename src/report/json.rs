use serde::Serialize;
use std::io::Write;

use super::PresentationSink;
use crate::error::SinkError;
use crate::types::{ForecastResult, InstrumentId, PricePoint};

#[derive(Serialize)]
struct Line<'a> {
    instrument: &'a InstrumentId,
    recent_history: &'a [PricePoint],
    forecast: &'a ForecastResult,
}

/// One JSON object per line, per instrument.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> PresentationSink for JsonLinesSink<W> {
    fn render(
        &mut self,
        instrument: &InstrumentId,
        recent_history: &[PricePoint],
        result: &ForecastResult,
    ) -> Result<(), SinkError> {
        let line = Line {
            instrument,
            recent_history,
            forecast: result,
        };
        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_forecast;

    #[test]
    fn test_writes_one_object_per_line() {
        let mut sink = JsonLinesSink::new(Vec::new());
        for symbol in ["AAPL", "^GSPC"] {
            let forecast = sample_forecast(symbol);
            sink.render(&forecast.result.instrument, &forecast.recent_history, &forecast.result)
                .unwrap();
        }
        sink.finish().unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(value["instrument"], "^GSPC");
        assert_eq!(value["forecast"]["strategy"], "classical");
        assert_eq!(value["forecast"]["horizon_dates"][0], "2025-01-06");
        assert_eq!(value["forecast"]["confidence_level"], 0.95);
        assert_eq!(value["recent_history"].as_array().unwrap().len(), 2);
    }
}
