use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::orchestrator::ForecastOrchestrator;
use crate::error::{FailureKind, ForecastError};
use crate::ml::StrategyKind;
use crate::types::{InstrumentForecast, InstrumentId, InstrumentOutcome};

/// Outcome of one batch run: exactly one outcome per requested instrument.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub strategy: StrategyKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    pub universe: Vec<InstrumentId>,
    pub outcomes: BTreeMap<InstrumentId, InstrumentOutcome>,
}

impl BatchReport {
    pub fn get(&self, instrument: &InstrumentId) -> Option<&InstrumentOutcome> {
        self.outcomes.get(instrument)
    }

    /// Outcomes in universe order.
    pub fn ordered(&self) -> impl Iterator<Item = &InstrumentOutcome> + '_ {
        self.universe.iter().filter_map(|id| self.outcomes.get(id))
    }

    pub fn successes(&self) -> impl Iterator<Item = &InstrumentForecast> + '_ {
        self.ordered().filter_map(|o| o.as_success())
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.len() - self.success_count()
    }

    pub fn failure_summary(&self) -> BTreeMap<FailureKind, usize> {
        let mut summary = BTreeMap::new();
        for error in self.outcomes.values().filter_map(|o| o.error()) {
            *summary.entry(error.kind()).or_insert(0) += 1;
        }
        summary
    }
}

/// Runs the orchestrator over a universe with bounded concurrency. A failing
/// instrument never affects another one.
pub struct BatchRunner {
    orchestrator: Arc<ForecastOrchestrator>,
    max_concurrency: usize,
}

impl BatchRunner {
    pub fn new(orchestrator: Arc<ForecastOrchestrator>, max_concurrency: usize) -> Self {
        Self {
            orchestrator,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Run every instrument until done or until `shutdown` resolves. On
    /// shutdown, outstanding instruments are recorded as `Cancelled` and
    /// completed ones are kept.
    pub async fn run<F>(&self, universe: &[InstrumentId], as_of: NaiveDate, shutdown: F) -> BatchReport
    where
        F: Future<Output = ()> + Send,
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let strategy = self.orchestrator.strategy().kind();

        let mut seen = HashSet::new();
        let universe: Vec<InstrumentId> = universe.iter().filter(|id| seen.insert((*id).clone())).cloned().collect();
        info!(%run_id, %strategy, instruments = universe.len(), concurrency = self.max_concurrency, "batch started");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        for (idx, instrument) in universe.iter().cloned().enumerate() {
            let orchestrator = Arc::clone(&self.orchestrator);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => orchestrator.run_instrument(instrument, as_of).await,
                    Err(_) => InstrumentOutcome::failure(instrument, None, ForecastError::Cancelled),
                };
                (idx, outcome)
            });
        }

        let mut slots: Vec<Option<InstrumentOutcome>> = universe.iter().map(|_| None).collect();
        let mut cancelled = false;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((idx, outcome))) => slots[idx] = Some(outcome),
                    Some(Err(e)) => error!("instrument task failed: {}", e),
                    None => break,
                },
                _ = &mut shutdown => {
                    warn!("cancellation requested, aborting outstanding instruments");
                    cancelled = true;
                    semaphore.close();
                    tasks.abort_all();
                    break;
                }
            }
        }

        if cancelled {
            while let Some(joined) = tasks.join_next().await {
                if let Ok((idx, outcome)) = joined {
                    slots[idx] = Some(outcome);
                }
            }
        }

        let outcomes: BTreeMap<InstrumentId, InstrumentOutcome> = universe
            .iter()
            .zip(slots)
            .map(|(id, slot)| {
                let outcome = slot.unwrap_or_else(|| {
                    let error = if cancelled {
                        ForecastError::Cancelled
                    } else {
                        ForecastError::fit_failure("pipeline task aborted")
                    };
                    InstrumentOutcome::failure(id.clone(), None, error)
                });
                (id.clone(), outcome)
            })
            .collect();

        let report = BatchReport {
            run_id,
            strategy,
            started_at,
            finished_at: Utc::now(),
            cancelled,
            universe,
            outcomes,
        };

        info!(
            %run_id,
            succeeded = report.success_count(),
            failed = report.failure_count(),
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "batch finished"
        );
        for (kind, count) in report.failure_summary() {
            info!("  {}: {}", kind, count);
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClassicalSettings, LearnedSettings};
    use crate::engine::orchestrator::PipelineSettings;
    use crate::market_data::memory::fixtures::random_walk;
    use crate::market_data::InMemorySource;
    use crate::ml::{ClassicalStrategy, ForecastStrategy, LearnedStrategy};
    use crate::types::{MissingClosePolicy, PipelineStage};
    use std::time::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn settings(horizon: usize) -> PipelineSettings {
        PipelineSettings {
            horizon,
            feature_windows: vec![50, 200],
            history_days: 365 * 5,
            recent_days: 22,
            missing_close: MissingClosePolicy::Drop,
            instrument_timeout: None,
        }
    }

    fn runner(source: InMemorySource, strategy: Arc<dyn ForecastStrategy>, horizon: usize) -> BatchRunner {
        let orchestrator = ForecastOrchestrator::new(Arc::new(source), strategy, settings(horizon));
        BatchRunner::new(Arc::new(orchestrator), 2)
    }

    fn ids(symbols: &[&str]) -> Vec<InstrumentId> {
        symbols.iter().map(|s| InstrumentId::new(*s)).collect()
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let source = InMemorySource::new()
            .with_closes("A", date(2022, 1, 3), &random_walk(3 * 252, 120.0, 7))
            .with_bars("B", Vec::new())
            .with_closes("C", date(2024, 12, 23), &[10.0, 10.4, 10.1, 10.9, 11.2]);
        let learned = LearnedStrategy::new(LearnedSettings {
            training_window: 312,
            seq_len: 60,
            hidden_size: 8,
            epochs: 3,
            batch_size: 16,
            learning_rate: 0.01,
            seed: Some(5),
        });

        let report = runner(source, Arc::new(learned), 10)
            .run(&ids(&["A", "B", "C"]), date(2025, 1, 1), std::future::pending())
            .await;

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.success_count(), 1);
        assert!(!report.cancelled);

        let a = report.get(&"A".into()).unwrap().as_success().unwrap();
        assert_eq!(a.result.horizon(), 10);
        assert!(!a.result.has_bounds());
        assert!(a.result.point_forecast.iter().all(|p| p.is_finite()));

        let b = report.get(&"B".into()).unwrap().error().unwrap();
        assert_eq!(b.kind(), FailureKind::DataUnavailable);

        let c = report.get(&"C".into()).unwrap().error().unwrap();
        assert_eq!(c, &ForecastError::InsufficientHistory { required: 70, available: 5 });

        let summary = report.failure_summary();
        assert_eq!(summary.get(&FailureKind::DataUnavailable), Some(&1));
        assert_eq!(summary.get(&FailureKind::InsufficientHistory), Some(&1));
    }

    #[tokio::test]
    async fn test_outcomes_follow_universe_order_and_dedupe() {
        let mut source = InMemorySource::new();
        for (i, symbol) in ["MSFT", "AAPL", "TSLA"].iter().enumerate() {
            source = source.with_closes(*symbol, date(2023, 1, 2), &random_walk(300, 100.0, i as u64));
        }
        let classical: Arc<dyn ForecastStrategy> = Arc::new(ClassicalStrategy::new(ClassicalSettings::default()));

        let report = runner(source, classical, 5)
            .run(&ids(&["MSFT", "AAPL", "msft", "TSLA"]), date(2025, 1, 1), std::future::pending())
            .await;

        let order: Vec<&str> = report.ordered().map(|o| o.instrument().as_str()).collect();
        assert_eq!(order, vec!["MSFT", "AAPL", "TSLA"]);
        assert_eq!(report.success_count(), 3);
        assert_eq!(report.successes().count(), 3);
    }

    #[tokio::test]
    async fn test_cancellation_keeps_completed_outcomes() {
        let source = InMemorySource::new()
            .with_closes("FAST", date(2023, 1, 2), &random_walk(300, 100.0, 1))
            .with_closes("SLOW", date(2023, 1, 2), &random_walk(300, 100.0, 2))
            .with_delay("SLOW", Duration::from_secs(30));
        let classical: Arc<dyn ForecastStrategy> = Arc::new(ClassicalStrategy::new(ClassicalSettings::default()));

        let report = runner(source, classical, 5)
            .run(
                &ids(&["FAST", "SLOW"]),
                date(2025, 1, 1),
                tokio::time::sleep(Duration::from_millis(500)),
            )
            .await;

        assert!(report.cancelled);
        assert!(report.get(&"FAST".into()).unwrap().is_success());
        match report.get(&"SLOW".into()).unwrap() {
            InstrumentOutcome::Failure(failure) => {
                assert_eq!(failure.error, ForecastError::Cancelled);
                assert_eq!(failure.last_stage, None::<PipelineStage>);
            }
            InstrumentOutcome::Success(_) => panic!("slow instrument should be cancelled"),
        }
    }

    #[tokio::test]
    async fn test_empty_universe_yields_empty_report() {
        let classical: Arc<dyn ForecastStrategy> = Arc::new(ClassicalStrategy::new(ClassicalSettings::default()));
        let report = runner(InMemorySource::new(), classical, 5)
            .run(&[], date(2025, 1, 1), std::future::pending())
            .await;
        assert!(report.outcomes.is_empty());
        assert_eq!(report.failure_count(), 0);
    }
}
