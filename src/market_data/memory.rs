use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::time::Duration;

use super::DataSource;
use crate::engine::calendar::business_days_from;
use crate::error::SourceError;
use crate::types::{InstrumentId, PriceBar};

/// Fixed bars per instrument, served from memory. Instruments can be set up
/// to fail or to respond slowly.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    bars: HashMap<InstrumentId, Vec<PriceBar>>,
    failures: HashMap<InstrumentId, String>,
    delays: HashMap<InstrumentId, Duration>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, instrument: impl Into<InstrumentId>, bars: Vec<PriceBar>) -> Self {
        self.bars.insert(instrument.into(), bars);
        self
    }

    /// Consecutive weekday bars starting at `first`, one per close.
    pub fn with_closes(self, instrument: impl Into<InstrumentId>, first: NaiveDate, closes: &[f64]) -> Self {
        let bars = business_days_from(first, closes.len())
            .into_iter()
            .zip(closes)
            .map(|(date, close)| PriceBar::new(date, *close))
            .collect();
        self.with_bars(instrument, bars)
    }

    pub fn with_failure(mut self, instrument: impl Into<InstrumentId>, message: impl Into<String>) -> Self {
        self.failures.insert(instrument.into(), message.into());
        self
    }

    pub fn with_delay(mut self, instrument: impl Into<InstrumentId>, delay: Duration) -> Self {
        self.delays.insert(instrument.into(), delay);
        self
    }
}

#[async_trait]
impl DataSource for InMemorySource {
    async fn fetch_bars(
        &self,
        instrument: &InstrumentId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, SourceError> {
        if let Some(delay) = self.delays.get(instrument) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(message) = self.failures.get(instrument) {
            return Err(SourceError::Provider {
                symbol: instrument.to_string(),
                message: message.clone(),
            });
        }
        let bars = self
            .bars
            .get(instrument)
            .ok_or_else(|| SourceError::UnknownInstrument(instrument.to_string()))?;

        Ok(bars
            .iter()
            .filter(|bar| bar.date >= start && bar.date <= end)
            .cloned()
            .collect())
    }
}

/// Deterministic series for tests across the crate.
#[cfg(test)]
pub(crate) mod fixtures {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Positive random walk with a mild drift.
    pub fn random_walk(n: usize, start: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut price = start;
        (0..n)
            .map(|_| {
                price = (price * (1.0 + rng.gen_range(-0.02..0.021))).max(1.0);
                price
            })
            .collect()
    }
}
