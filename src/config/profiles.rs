use serde::{Deserialize, Serialize};

use super::settings::ForecastConfig;
use crate::ml::StrategyKind;

/// Ready-made run shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ForecastProfile {
    /// Auto-selected ARIMA on the last 30 closes of five years of history.
    /// Forecasts 100 business days with a 95% band.
    #[default]
    ClassicalQuarter,

    /// LSTM trained on the last 312 closes of two years of history.
    /// Forecasts 10 business days, point estimates only.
    LearnedFortnight,

    /// User-defined settings
    Custom,
}

impl ForecastProfile {
    pub fn name(&self) -> &str {
        match self {
            Self::ClassicalQuarter => "Classical (100-day)",
            Self::LearnedFortnight => "Learned (10-day)",
            Self::Custom => "Custom",
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::ClassicalQuarter =>
                "Stepwise ARIMA on a 30-point slice of 5y history. 100 business days ahead, 95% interval.",
            Self::LearnedFortnight =>
                "LSTM over 60-point windows of a 312-point slice of 2y history. 10 business days ahead.",
            Self::Custom =>
                "User-defined custom settings.",
        }
    }

    /// Overwrite the profile-controlled fields of `config`. `Custom` leaves them untouched.
    pub fn apply(&self, config: &mut ForecastConfig) {
        match self {
            Self::ClassicalQuarter => {
                config.strategy = StrategyKind::Classical;
                config.forecast_horizon = 100;
                config.history_days = 365 * 5;
                config.recent_days = 90;
                config.classical.training_window = 30;
            }
            Self::LearnedFortnight => {
                config.strategy = StrategyKind::Learned;
                config.forecast_horizon = 10;
                config.history_days = 365 * 2;
                config.recent_days = 22;
                config.learned.seq_len = 60;
                config.learned.training_window = 2 * 126 + 60;
            }
            Self::Custom => {}
        }
        config.profile = Some(*self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_configs() {
        let mut config = ForecastConfig::default();
        ForecastProfile::LearnedFortnight.apply(&mut config);
        assert_eq!(config.strategy, StrategyKind::Learned);
        assert_eq!(config.forecast_horizon, 10);
        assert_eq!(config.learned.training_window, 312);
        assert!(config.validate().is_ok());

        ForecastProfile::ClassicalQuarter.apply(&mut config);
        assert_eq!(config.strategy, StrategyKind::Classical);
        assert_eq!(config.forecast_horizon, 100);
        assert_eq!(config.classical.training_window, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_profile_keeps_settings() {
        let mut config = ForecastConfig::default();
        config.forecast_horizon = 7;
        ForecastProfile::Custom.apply(&mut config);
        assert_eq!(config.forecast_horizon, 7);
        assert_eq!(config.profile, Some(ForecastProfile::Custom));
    }

    #[test]
    fn test_profile_metadata() {
        assert_eq!(ForecastProfile::ClassicalQuarter.name(), "Classical (100-day)");
        assert_eq!(ForecastProfile::LearnedFortnight.name(), "Learned (10-day)");
    }
}
