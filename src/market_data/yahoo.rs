use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::DataSource;
use crate::config::SourceSettings;
use crate::error::SourceError;
use crate::types::{InstrumentId, PriceBar};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) equity-forecaster/0.1";

/// Daily bars from the Yahoo Finance v8 chart endpoint. Requests share one
/// rate limiter, so concurrent fetches are paced globally.
#[derive(Clone)]
pub struct YahooSource {
    client: Client,
    base_url: String,
    limiter: Arc<DirectRateLimiter>,
}

impl YahooSource {
    pub fn new(settings: &SourceSettings) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        let per_second = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        })
    }
}

#[async_trait]
impl DataSource for YahooSource {
    async fn fetch_bars(
        &self,
        instrument: &InstrumentId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, SourceError> {
        self.limiter.until_ready().await;

        let period1 = Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN)).timestamp();
        let period2 = Utc
            .from_utc_datetime(&(end + chrono::Duration::days(1)).and_time(NaiveTime::MIN))
            .timestamp();
        let url = format!(
            "{}/v8/finance/chart/{}",
            self.base_url,
            instrument.as_str().replace('^', "%5E")
        );

        info!("Fetching daily bars for {} from {} to {}", instrument, start, end);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "div,split".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                symbol: instrument.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let bars = parse_chart(instrument, &body)?;
        debug!(instrument = %instrument, bars = bars.len(), "chart parsed");
        Ok(bars)
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
    #[serde(default)]
    adjclose: Option<Vec<ChartAdjClose>>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ChartAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Turn a chart payload into bars. Split/dividend adjusted closes are used
/// when present. Null closes are kept as missing bars.
fn parse_chart(instrument: &InstrumentId, body: &str) -> Result<Vec<PriceBar>, SourceError> {
    let response: ChartResponse = serde_json::from_str(body)?;

    if let Some(error) = response.chart.error {
        return Err(SourceError::Provider {
            symbol: instrument.to_string(),
            message: format!("{}: {}", error.code, error.description),
        });
    }

    let result = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| SourceError::Empty(instrument.to_string()))?;
    let Some(timestamps) = result.timestamp else {
        return Ok(Vec::new());
    };

    let offset = result.meta.map(|m| m.gmtoffset).unwrap_or(0);
    let closes = match result.indicators.adjclose.and_then(|a| a.into_iter().next()) {
        Some(adjusted) if adjusted.adjclose.len() == timestamps.len() => adjusted.adjclose,
        _ => result
            .indicators
            .quote
            .into_iter()
            .next()
            .map(|q| q.close)
            .unwrap_or_default(),
    };

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let Some(local) = Utc.timestamp_opt(ts + offset, 0).single() else {
            continue;
        };
        let close = closes.get(i).copied().flatten();
        bars.push(PriceBar {
            date: local.date_naive(),
            close,
        });
    }
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHART: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "AAPL", "gmtoffset": -14400},
                "timestamp": [1719840600, 1719927000, 1720013400],
                "indicators": {
                    "quote": [{"close": [216.75, null, 221.55]}],
                    "adjclose": [{"adjclose": [215.9, null, 220.7]}]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_parse_chart_prefers_adjusted_close() {
        let bars = parse_chart(&"AAPL".into(), CHART).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        assert_eq!(bars[0].close, Some(215.9));
        assert_eq!(bars[1].close, None);
        assert_eq!(bars[2].date, NaiveDate::from_ymd_opt(2024, 7, 3).unwrap());
    }

    #[test]
    fn test_parse_chart_error_payload() {
        let body = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        let err = parse_chart(&"XXXX".into(), body).unwrap_err();
        assert!(matches!(err, SourceError::Provider { .. }));
        assert!(err.to_string().contains("delisted"));
    }

    #[test]
    fn test_parse_chart_without_timestamps_is_empty() {
        let body = r#"{"chart": {"result": [{"meta": {}, "indicators": {"quote": [{}]}}], "error": null}}"#;
        assert!(parse_chart(&"AAPL".into(), body).unwrap().is_empty());
    }

    #[test]
    fn test_source_builds_from_settings() {
        let source = YahooSource::new(&SourceSettings::default()).unwrap();
        assert_eq!(source.base_url, "https://query1.finance.yahoo.com");
    }
}
