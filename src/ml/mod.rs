pub mod arima;
pub mod lstm;
pub mod scaler;
pub mod windows;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::ForecastConfig;
use crate::error::ForecastError;
use crate::types::ConfidenceBand;

pub use arima::ClassicalStrategy;
pub use lstm::LearnedStrategy;
pub use scaler::MinMaxScaler;
pub use windows::{sample_windows, to_matrices};

/// Which forecasting family a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Classical,
    Learned,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classical => "classical",
            Self::Learned => "learned",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point forecast in price units, with an interval when the model provides one.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub points: Vec<f64>,
    pub band: Option<ConfidenceBand>,
}

/// A forecasting family. Implementations pick their own training slice from
/// the full close history; `fit` never sees data beyond what it is given.
pub trait ForecastStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Fewest usable closes `fit` accepts for the given horizon.
    fn min_points(&self, horizon: usize) -> usize;

    fn fit(&self, closes: &[f64], horizon: usize) -> Result<Box<dyn FittedModel>, ForecastError>;
}

pub trait FittedModel: Send {
    fn describe(&self) -> String;
    fn forecast(&self, horizon: usize) -> Result<Forecast, ForecastError>;
}

pub fn build_strategy(config: &ForecastConfig) -> Arc<dyn ForecastStrategy> {
    match config.strategy {
        StrategyKind::Classical => Arc::new(ClassicalStrategy::new(config.classical.clone())),
        StrategyKind::Learned => Arc::new(LearnedStrategy::new(config.learned.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_strategy_follows_config() {
        let mut config = ForecastConfig::default();
        assert_eq!(build_strategy(&config).kind(), StrategyKind::Classical);
        config.strategy = StrategyKind::Learned;
        let learned = build_strategy(&config);
        assert_eq!(learned.kind(), StrategyKind::Learned);
        assert_eq!(learned.min_points(10), config.learned.seq_len + 10);
    }

    #[test]
    fn test_strategy_kind_serde() {
        assert_eq!(serde_json::to_string(&StrategyKind::Learned).unwrap(), "\"learned\"");
        assert_eq!(StrategyKind::Classical.to_string(), "classical");
    }
}
