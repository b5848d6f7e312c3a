use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::InstrumentId;
use crate::error::ForecastError;

/// Raw daily bar as delivered by a data source. The close may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub close: Option<f64>,
}

impl PriceBar {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close: Some(close) }
    }

    pub fn missing(date: NaiveDate) -> Self {
        Self { date, close: None }
    }

    /// A close is usable only when finite and strictly positive.
    fn usable_close(&self) -> Option<f64> {
        self.close.filter(|c| c.is_finite() && *c > 0.0)
    }
}

/// Cleaned observation: dates strictly increasing, close always finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// How missing or invalid closes are handled during ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingClosePolicy {
    /// Remove the bar entirely.
    #[default]
    Drop,
    /// Carry the previous valid close forward. Leading gaps are removed.
    ForwardFill,
}

/// Counters describing what ingestion did to the raw bars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub received: usize,
    pub duplicates: usize,
    pub dropped: usize,
    pub filled: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceSeries {
    pub instrument: InstrumentId,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a clean series from raw bars: sort by date, collapse duplicate dates
    /// (last observation wins) and apply the missing-close policy.
    pub fn from_bars(
        instrument: InstrumentId,
        mut bars: Vec<PriceBar>,
        policy: MissingClosePolicy,
    ) -> Result<(Self, IngestStats), ForecastError> {
        let mut stats = IngestStats { received: bars.len(), ..Default::default() };
        if bars.is_empty() {
            return Err(ForecastError::data_unavailable(format!("no data for {}", instrument)));
        }

        bars.sort_by_key(|b| b.date);
        let mut unique: Vec<PriceBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match unique.last_mut() {
                Some(prev) if prev.date == bar.date => {
                    // A later row only wins when it carries a usable close.
                    if bar.usable_close().is_some() || prev.usable_close().is_none() {
                        *prev = bar;
                    }
                    stats.duplicates += 1;
                }
                _ => unique.push(bar),
            }
        }

        let mut points = Vec::with_capacity(unique.len());
        let mut last_valid: Option<f64> = None;
        for bar in &unique {
            match (bar.usable_close(), policy, last_valid) {
                (Some(close), _, _) => {
                    last_valid = Some(close);
                    points.push(PricePoint { date: bar.date, close });
                }
                (None, MissingClosePolicy::ForwardFill, Some(close)) => {
                    points.push(PricePoint { date: bar.date, close });
                    stats.filled += 1;
                }
                _ => stats.dropped += 1,
            }
        }

        if points.is_empty() {
            return Err(ForecastError::data_unavailable(format!(
                "no valid closes for {} ({} bars received)",
                instrument, stats.received
            )));
        }

        debug!(
            "{}: ingested {} bars ({} duplicates, {} dropped, {} filled)",
            instrument, stats.received, stats.duplicates, stats.dropped, stats.filled
        );

        Ok((Self { instrument, points }, stats))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn last_n(&self, n: usize) -> &[PricePoint] {
        let len = self.points.len();
        if n >= len {
            &self.points[..]
        } else {
            &self.points[len - n..]
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_empty_bars_are_data_unavailable() {
        let err = PriceSeries::from_bars("AAPL".into(), vec![], MissingClosePolicy::Drop).unwrap_err();
        assert!(matches!(err, ForecastError::DataUnavailable { .. }));
    }

    #[test]
    fn test_drop_policy_removes_missing_closes() {
        let bars = vec![
            PriceBar::new(day(4), 10.0),
            PriceBar::missing(day(5)),
            PriceBar { date: day(6), close: Some(f64::NAN) },
            PriceBar::new(day(7), 11.0),
        ];
        let (series, stats) = PriceSeries::from_bars("AAPL".into(), bars, MissingClosePolicy::Drop).unwrap();
        assert_eq!(series.closes(), vec![10.0, 11.0]);
        assert_eq!(stats.dropped, 2);
        assert!(series.closes().iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_forward_fill_carries_last_close() {
        let bars = vec![
            PriceBar::missing(day(1)),
            PriceBar::new(day(4), 10.0),
            PriceBar::missing(day(5)),
            PriceBar::new(day(6), 12.0),
        ];
        let (series, stats) =
            PriceSeries::from_bars("AAPL".into(), bars, MissingClosePolicy::ForwardFill).unwrap();
        assert_eq!(series.closes(), vec![10.0, 10.0, 12.0]);
        assert_eq!(stats.filled, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_sorts_and_collapses_duplicate_dates() {
        let bars = vec![
            PriceBar::new(day(6), 3.0),
            PriceBar::new(day(4), 1.0),
            PriceBar::new(day(6), 4.0),
        ];
        let (series, stats) = PriceSeries::from_bars("MSFT".into(), bars, MissingClosePolicy::Drop).unwrap();
        assert_eq!(series.dates(), vec![day(4), day(6)]);
        assert_eq!(series.closes(), vec![1.0, 4.0]);
        assert_eq!(stats.duplicates, 1);
    }

    #[test]
    fn test_missing_duplicate_keeps_valid_close() {
        let bars = vec![
            PriceBar::new(day(4), 10.0),
            PriceBar::missing(day(4)),
            PriceBar::new(day(5), 11.0),
            PriceBar::missing(day(6)),
            PriceBar::new(day(6), 12.0),
        ];
        let (series, stats) = PriceSeries::from_bars("AAPL".into(), bars, MissingClosePolicy::Drop).unwrap();
        assert_eq!(series.closes(), vec![10.0, 11.0, 12.0]);
        assert_eq!(stats.duplicates, 2);
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn test_all_missing_is_data_unavailable() {
        let bars = vec![PriceBar::missing(day(4)), PriceBar::missing(day(5))];
        let err = PriceSeries::from_bars("TSLA".into(), bars, MissingClosePolicy::ForwardFill).unwrap_err();
        assert!(matches!(err, ForecastError::DataUnavailable { .. }));
    }

    #[test]
    fn test_last_n() {
        let bars = (1..=5).map(|d| PriceBar::new(day(d), d as f64)).collect();
        let (series, _) = PriceSeries::from_bars("META".into(), bars, MissingClosePolicy::Drop).unwrap();
        assert_eq!(series.last_n(2).len(), 2);
        assert_eq!(series.last_n(10).len(), 5);
        assert_eq!(series.last_date(), Some(day(5)));
    }
}
