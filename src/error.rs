use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-instrument pipeline failure. Every variant is recovered at the instrument
/// boundary and recorded in the batch report; none aborts the batch.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForecastError {
    #[error("data unavailable: {reason}")]
    DataUnavailable { reason: String },

    #[error("insufficient history: need {required} points, have {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("model fit failed: {reason}")]
    ModelFitFailure { reason: String },

    #[error("scaling degenerate: {reason}")]
    ScalingDegenerate { reason: String },

    #[error("instrument exceeded its {seconds}s budget")]
    TimedOut { seconds: u64 },

    #[error("batch cancelled before the instrument completed")]
    Cancelled,
}

impl ForecastError {
    pub fn data_unavailable(reason: impl Into<String>) -> Self {
        Self::DataUnavailable { reason: reason.into() }
    }

    pub fn fit_failure(reason: impl Into<String>) -> Self {
        Self::ModelFitFailure { reason: reason.into() }
    }

    pub fn scaling(reason: impl Into<String>) -> Self {
        Self::ScalingDegenerate { reason: reason.into() }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::DataUnavailable { .. } => FailureKind::DataUnavailable,
            Self::InsufficientHistory { .. } => FailureKind::InsufficientHistory,
            Self::ModelFitFailure { .. } => FailureKind::ModelFitFailure,
            Self::ScalingDegenerate { .. } => FailureKind::ScalingDegenerate,
            Self::TimedOut { .. } => FailureKind::TimedOut,
            Self::Cancelled => FailureKind::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    DataUnavailable,
    InsufficientHistory,
    ModelFitFailure,
    ScalingDegenerate,
    TimedOut,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataUnavailable => "data_unavailable",
            Self::InsufficientHistory => "insufficient_history",
            Self::ModelFitFailure => "model_fit_failure",
            Self::ScalingDegenerate => "scaling_degenerate",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a market-data collaborator.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status} for {symbol}")]
    Status { symbol: String, status: u16 },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider error for {symbol}: {message}")]
    Provider { symbol: String, message: String },

    #[error("no bars returned for {0}")]
    Empty(String),

    #[error("unknown instrument {0}")]
    UnknownInstrument(String),
}

impl From<SourceError> for ForecastError {
    fn from(err: SourceError) -> Self {
        ForecastError::data_unavailable(err.to_string())
    }
}

/// Errors raised by a presentation sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("invalid configuration: {}", .0.join(", "))]
    Invalid(Vec<String>),

    #[error("TOML encode error: {0}")]
    Toml(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_errors_become_data_unavailable() {
        let err: ForecastError = SourceError::Empty("AAPL".to_string()).into();
        assert_eq!(err.kind(), FailureKind::DataUnavailable);
        assert!(err.to_string().contains("AAPL"));
    }

    #[test]
    fn test_error_serializes_with_kind_tag() {
        let err = ForecastError::InsufficientHistory { required: 70, available: 5 };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "insufficient_history");
        assert_eq!(json["required"], 70);
        assert_eq!(json["available"], 5);
    }

    #[test]
    fn test_config_error_joins_violations() {
        let err = ConfigError::Invalid(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "invalid configuration: a, b");
    }
}
