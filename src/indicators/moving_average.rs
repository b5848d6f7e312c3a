use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};

use super::Indicator;
use crate::types::PriceSeries;

/// Streaming simple moving average over the last `period` values.
#[derive(Debug, Clone)]
pub struct SMA {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl SMA {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            window: VecDeque::with_capacity(period),
            sum: 0.0,
        }
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        if self.period == 0 {
            return None;
        }

        self.window.push_back(value);
        self.sum += value;
        if self.window.len() > self.period {
            if let Some(oldest) = self.window.pop_front() {
                self.sum -= oldest;
            }
        }

        self.value()
    }

    pub fn value(&self) -> Option<f64> {
        if self.period > 0 && self.window.len() == self.period {
            Some(self.sum / self.period as f64)
        } else {
            None
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for SMA {
    fn name(&self) -> &'static str {
        "SMA"
    }

    fn is_ready(&self) -> bool {
        self.value().is_some()
    }

    fn reset(&mut self) {
        self.window.clear();
        self.sum = 0.0;
    }
}

/// Trailing mean aligned to the input index: `None` until `window` points exist.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut sma = SMA::new(window);
    values.iter().map(|v| sma.update(*v)).collect()
}

/// A named trailing-window statistic aligned with the series it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollingFeature {
    pub name: String,
    pub window: usize,
    pub values: Vec<Option<f64>>,
}

impl RollingFeature {
    pub fn moving_average(values: &[f64], window: usize) -> Self {
        Self {
            name: format!("MA{}", window),
            window,
            values: rolling_mean(values, window),
        }
    }

    /// True when the series was too short for even one value.
    pub fn is_absent(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.last().copied().flatten()
    }

    /// Index of the first defined value (`window - 1` when the series is long enough).
    pub fn first_defined(&self) -> Option<usize> {
        self.values.iter().position(Option::is_some)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureSet {
    pub features: Vec<RollingFeature>,
}

impl FeatureSet {
    pub fn get(&self, window: usize) -> Option<&RollingFeature> {
        self.features.iter().find(|f| f.window == window)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn absent_windows(&self) -> Vec<usize> {
        self.features
            .iter()
            .filter(|f| f.is_absent())
            .map(|f| f.window)
            .collect()
    }
}

/// Moving averages of the close for each distinct window, in ascending window order.
/// Never fails: windows longer than the series yield an entirely absent feature.
pub fn derive_features(series: &PriceSeries, windows: &[usize]) -> FeatureSet {
    let closes = series.closes();
    let unique: BTreeSet<usize> = windows.iter().copied().filter(|w| *w > 0).collect();

    FeatureSet {
        features: unique
            .into_iter()
            .map(|w| RollingFeature::moving_average(&closes, w))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MissingClosePolicy, PriceBar};
    use chrono::NaiveDate;

    fn series(values: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let bars = values
            .iter()
            .enumerate()
            .map(|(i, v)| PriceBar::new(start + chrono::Duration::days(i as i64), *v))
            .collect();
        PriceSeries::from_bars("AAPL".into(), bars, MissingClosePolicy::Drop).unwrap().0
    }

    #[test]
    fn test_rolling_mean_matches_arithmetic_mean() {
        let values: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        for w in [1usize, 3, 7, 40] {
            let ma = rolling_mean(&values, w);
            assert_eq!(ma.len(), values.len());
            for (i, v) in ma.iter().enumerate() {
                if i + 1 < w {
                    assert!(v.is_none(), "window {} index {} should be absent", w, i);
                } else {
                    let expected = values[i + 1 - w..=i].iter().sum::<f64>() / w as f64;
                    assert!((v.unwrap() - expected).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_short_series_yields_absent_feature() {
        let s = series(&[1.0, 2.0, 3.0]);
        let features = derive_features(&s, &[2, 50]);
        assert_eq!(features.len(), 2);
        assert!(!features.get(2).unwrap().is_absent());
        assert!(features.get(50).unwrap().is_absent());
        assert_eq!(features.absent_windows(), vec![50]);
    }

    #[test]
    fn test_features_are_sorted_and_deduplicated() {
        let s = series(&[1.0, 2.0, 3.0, 4.0]);
        let features = derive_features(&s, &[3, 2, 3, 0]);
        let windows: Vec<usize> = features.features.iter().map(|f| f.window).collect();
        assert_eq!(windows, vec![2, 3]);
        assert_eq!(features.get(3).unwrap().name, "MA3");
        assert_eq!(features.get(3).unwrap().first_defined(), Some(2));
        assert_eq!(features.get(2).unwrap().latest(), Some(3.5));
    }

    #[test]
    fn test_sma_reset() {
        let mut sma = SMA::new(2);
        assert_eq!(sma.update(1.0), None);
        assert_eq!(sma.update(3.0), Some(2.0));
        assert!(sma.is_ready());
        sma.reset();
        assert!(!sma.is_ready());
        assert_eq!(sma.period(), 2);
    }
}
