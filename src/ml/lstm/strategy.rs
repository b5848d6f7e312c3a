use tracing::info;

use super::network::{LstmNetwork, TrainingOptions, TrainingReport};
use crate::config::LearnedSettings;
use crate::error::ForecastError;
use crate::ml::{sample_windows, to_matrices, FittedModel, Forecast, ForecastStrategy, MinMaxScaler, StrategyKind};

/// Windowed LSTM trained on the most recent `training_window` closes.
pub struct LearnedStrategy {
    settings: LearnedSettings,
}

impl LearnedStrategy {
    pub fn new(settings: LearnedSettings) -> Self {
        Self { settings }
    }
}

impl ForecastStrategy for LearnedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Learned
    }

    /// At least one full window.
    fn min_points(&self, horizon: usize) -> usize {
        self.settings.seq_len + horizon
    }

    fn fit(&self, closes: &[f64], horizon: usize) -> Result<Box<dyn FittedModel>, ForecastError> {
        let seq_len = self.settings.seq_len;
        let start = closes.len().saturating_sub(self.settings.training_window);
        let slice = &closes[start..];
        let required = self.min_points(horizon);
        if slice.len() < required {
            return Err(ForecastError::InsufficientHistory {
                required,
                available: slice.len(),
            });
        }

        let scaler = MinMaxScaler::fit(slice)?;
        let scaled = scaler.transform_all(slice);
        let windows = sample_windows(&scaled, seq_len, horizon);
        let (inputs, targets) = to_matrices(&windows).ok_or(ForecastError::InsufficientHistory {
            required,
            available: slice.len(),
        })?;

        let mut network = LstmNetwork::new(self.settings.hidden_size, horizon, self.settings.seed);
        let report = network.train(
            &inputs,
            &targets,
            TrainingOptions {
                epochs: self.settings.epochs,
                batch_size: self.settings.batch_size,
                learning_rate: self.settings.learning_rate,
            },
        );
        if !report.final_loss.is_finite() {
            return Err(ForecastError::fit_failure("training loss diverged"));
        }

        info!(
            windows = report.samples,
            epochs = report.epochs,
            final_loss = report.final_loss,
            degenerate_scale = scaler.is_degenerate(),
            "learned model trained"
        );

        Ok(Box::new(LearnedFit {
            terminal_window: scaled[scaled.len() - seq_len..].to_vec(),
            network,
            scaler,
            seq_len,
            report,
        }))
    }
}

pub struct LearnedFit {
    network: LstmNetwork,
    scaler: MinMaxScaler,
    terminal_window: Vec<f64>,
    seq_len: usize,
    report: TrainingReport,
}

impl LearnedFit {
    pub fn report(&self) -> &TrainingReport {
        &self.report
    }
}

impl FittedModel for LearnedFit {
    fn describe(&self) -> String {
        format!(
            "LSTM(seq_len={}, horizon={}, loss={:.6})",
            self.seq_len,
            self.network.outputs(),
            self.report.final_loss
        )
    }

    fn forecast(&self, horizon: usize) -> Result<Forecast, ForecastError> {
        if horizon > self.network.outputs() {
            return Err(ForecastError::fit_failure(format!(
                "model was trained for {} steps, {} requested",
                self.network.outputs(),
                horizon
            )));
        }
        let mut scaled = self.network.predict(&self.terminal_window);
        scaled.truncate(horizon);
        Ok(Forecast {
            points: self.scaler.inverse_all(&scaled),
            band: None,
        })
    }
}
