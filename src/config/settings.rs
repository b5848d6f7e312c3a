use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::profiles::ForecastProfile;
use crate::ml::arima::{z_score, InformationCriterion};
use crate::ml::StrategyKind;
use crate::types::{InstrumentId, MissingClosePolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Preset applied on load. `None` keeps file and environment values as they are.
    pub profile: Option<ForecastProfile>,
    pub universe: Vec<String>,
    pub benchmark: Option<String>,
    pub include_benchmark: bool,
    pub forecast_horizon: usize,
    pub feature_windows: Vec<usize>,
    pub strategy: StrategyKind,
    pub history_days: u32,
    pub recent_days: usize,
    pub missing_close: MissingClosePolicy,
    pub classical: ClassicalSettings,
    pub learned: LearnedSettings,
    pub batch: BatchSettings,
    pub source: SourceSettings,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            profile: None,
            universe: ["AAPL", "MSFT", "GOOGL", "AMZN", "META", "TSLA"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            benchmark: Some("^GSPC".to_string()),
            include_benchmark: false,
            forecast_horizon: 100,
            feature_windows: vec![50, 200],
            strategy: StrategyKind::Classical,
            history_days: 365 * 5,
            recent_days: 90,
            missing_close: MissingClosePolicy::Drop,
            classical: ClassicalSettings::default(),
            learned: LearnedSettings::default(),
            batch: BatchSettings::default(),
            source: SourceSettings::default(),
        }
    }
}

impl ForecastConfig {
    /// Apply `chosen`, falling back to the configured profile. Nothing is
    /// overwritten when neither names one.
    pub fn apply_profile(&mut self, chosen: Option<ForecastProfile>) -> Option<ForecastProfile> {
        let profile = chosen.or(self.profile)?;
        profile.apply(self);
        Some(profile)
    }

    /// Instruments to run, in configured order, with the benchmark appended
    /// when enabled and not already present.
    pub fn instruments(&self) -> Vec<InstrumentId> {
        let mut ids: Vec<InstrumentId> = self.universe.iter().map(|s| InstrumentId::new(s)).collect();
        if self.include_benchmark {
            if let Some(benchmark) = &self.benchmark {
                let id = InstrumentId::new(benchmark);
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Universe validation
        if self.universe.is_empty() {
            errors.push("universe must contain at least one instrument".to_string());
        }
        let mut seen = HashSet::new();
        for symbol in &self.universe {
            let id = InstrumentId::new(symbol);
            if id.as_str().is_empty() {
                errors.push("universe contains an empty instrument id".to_string());
            } else if !seen.insert(id.clone()) {
                errors.push(format!("universe lists {} more than once", id));
            }
        }

        if self.forecast_horizon == 0 {
            errors.push("forecast_horizon must be > 0".to_string());
        }
        if self.feature_windows.is_empty() {
            errors.push("feature_windows must not be empty".to_string());
        }
        if self.feature_windows.iter().any(|w| *w == 0) {
            errors.push("feature_windows must all be > 0".to_string());
        }
        if self.history_days == 0 {
            errors.push("history_days must be > 0".to_string());
        }

        // Classical validation
        let classical = &self.classical;
        if classical.min_points == 0 {
            errors.push("classical: min_points must be > 0".to_string());
        }
        if classical.training_window < classical.min_points {
            errors.push("classical: training_window must be >= min_points".to_string());
        }
        if classical.max_order == 0 && (classical.max_p > 0 || classical.max_q > 0) {
            errors.push("classical: max_order of 0 leaves max_p/max_q unreachable".to_string());
        }
        if z_score(classical.confidence_level).is_none() {
            errors.push("classical: confidence_level must be one of 0.80, 0.90, 0.95, 0.99".to_string());
        }

        // Learned validation
        let learned = &self.learned;
        if learned.seq_len == 0 {
            errors.push("learned: seq_len must be > 0".to_string());
        }
        if self.strategy == StrategyKind::Learned && learned.seq_len + self.forecast_horizon > learned.training_window {
            errors.push(format!(
                "learned: seq_len + forecast_horizon ({}) must be <= training_window ({})",
                learned.seq_len + self.forecast_horizon,
                learned.training_window
            ));
        }
        if learned.hidden_size == 0 {
            errors.push("learned: hidden_size must be > 0".to_string());
        }
        if learned.epochs == 0 {
            errors.push("learned: epochs must be > 0".to_string());
        }
        if learned.batch_size == 0 {
            errors.push("learned: batch_size must be > 0".to_string());
        }
        if !(learned.learning_rate > 0.0 && learned.learning_rate.is_finite()) {
            errors.push("learned: learning_rate must be > 0".to_string());
        }

        // Batch and source validation
        if self.batch.max_concurrency == 0 {
            errors.push("batch: max_concurrency must be > 0".to_string());
        }
        if self.batch.instrument_timeout_secs == Some(0) {
            errors.push("batch: instrument_timeout_secs must be > 0 when set".to_string());
        }
        if self.source.requests_per_second == 0 {
            errors.push("source: requests_per_second must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Automatic order search on a short recent slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassicalSettings {
    pub training_window: usize,
    pub min_points: usize,
    pub max_p: usize,
    pub max_q: usize,
    pub max_d: usize,
    pub max_order: usize,
    pub criterion: InformationCriterion,
    pub confidence_level: f64,
    pub max_steps: usize,
}

impl Default for ClassicalSettings {
    fn default() -> Self {
        Self {
            training_window: 30,
            min_points: 20,
            max_p: 5,
            max_q: 5,
            max_d: 2,
            max_order: 5,
            criterion: InformationCriterion::Aic,
            confidence_level: 0.95,
            max_steps: 100,
        }
    }
}

/// Windowed sequence model trained on a longer recent slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnedSettings {
    pub training_window: usize,
    pub seq_len: usize,
    pub hidden_size: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: Option<u64>,
}

impl Default for LearnedSettings {
    fn default() -> Self {
        Self {
            training_window: 2 * 126 + 60,
            seq_len: 60,
            hidden_size: 64,
            epochs: 50,
            batch_size: 16,
            learning_rate: 0.001,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub max_concurrency: usize,
    pub instrument_timeout_secs: Option<u64>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            instrument_timeout_secs: Some(300),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub base_url: String,
    pub requests_per_second: u32,
    pub request_timeout_secs: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            requests_per_second: 1,
            request_timeout_secs: 30,
        }
    }
}
