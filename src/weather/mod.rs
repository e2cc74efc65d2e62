//! Rain signal from an external forecast
//!
//! Reduces the next 6 hours of forecast to a [`RainSignal`]. Only entries whose
//! timestamp falls in `[now, now + 6h]` count: the highest precipitation
//! probability and the summed precipitation volume.
//!
//! `None` means "no information" (no coordinates, provider disabled, timeout,
//! transport or parse failure). Callers must not read it as "no rain".

mod openweather;

pub use openweather::OpenWeatherSource;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{defaults, WeatherConfig};
use crate::types::RainSignal;

/// One forecast bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastEntry {
    pub dt: DateTime<Utc>,
    /// Probability of precipitation, `[0, 1]`
    pub pop: f64,
    /// Precipitation volume for the bucket (mm)
    pub rain_mm: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed forecast: {0}")]
    Parse(String),
}

/// Source of forecast entries for a coordinate
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch(&self, lat: f64, lon: f64) -> Result<Vec<ForecastEntry>, ForecastError>;

    /// Source name for logging
    fn source_name(&self) -> &str;
}

/// Fixed forecast, identical for every coordinate
#[derive(Debug, Clone, Default)]
pub struct StaticForecast {
    entries: Vec<ForecastEntry>,
}

impl StaticForecast {
    pub fn new(entries: Vec<ForecastEntry>) -> Self {
        Self { entries }
    }

    /// Forecast of a single bucket `hours_ahead` from `now`
    pub fn single(now: DateTime<Utc>, hours_ahead: i64, pop: f64, rain_mm: f64) -> Self {
        Self::new(vec![ForecastEntry {
            dt: now + ChronoDuration::hours(hours_ahead),
            pop,
            rain_mm,
        }])
    }
}

#[async_trait]
impl ForecastSource for StaticForecast {
    async fn fetch(&self, _lat: f64, _lon: f64) -> Result<Vec<ForecastEntry>, ForecastError> {
        Ok(self.entries.clone())
    }

    fn source_name(&self) -> &str {
        "static"
    }
}

/// Reduce forecast entries in `[now, now + window]` to a rain signal.
pub fn aggregate_rain(entries: &[ForecastEntry], now: DateTime<Utc>, window: ChronoDuration) -> RainSignal {
    let end = now + window;
    let (max_pop, rain_mm) = entries
        .iter()
        .filter(|e| e.dt >= now && e.dt <= end)
        .fold((0.0_f64, 0.0_f64), |(pop, mm), e| {
            let p = if e.pop.is_finite() { e.pop } else { 0.0 };
            let r = if e.rain_mm.is_finite() { e.rain_mm.max(0.0) } else { 0.0 };
            (pop.max(p), mm + r)
        });
    RainSignal::from_aggregate(max_pop, rain_mm)
}

/// Queries a forecast source with a bounded timeout
pub struct RainSignalProvider {
    source: Option<Arc<dyn ForecastSource>>,
    timeout: Duration,
    window: ChronoDuration,
}

impl RainSignalProvider {
    pub fn new(source: Arc<dyn ForecastSource>, timeout: Duration) -> Self {
        Self {
            source: Some(source),
            timeout,
            window: ChronoDuration::hours(defaults::RAIN_WINDOW_HOURS),
        }
    }

    /// Provider that always answers "no information"
    pub fn disabled() -> Self {
        Self {
            source: None,
            timeout: Duration::from_secs(defaults::WEATHER_TIMEOUT_SECS),
            window: ChronoDuration::hours(defaults::RAIN_WINDOW_HOURS),
        }
    }

    /// Build from configuration; disabled without an API key.
    pub fn from_config(config: &WeatherConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        match config.api_key.as_deref() {
            Some(key) if !key.is_empty() => {
                match OpenWeatherSource::new(&config.base_url, key, timeout) {
                    Ok(source) => Self::new(Arc::new(source), timeout),
                    Err(e) => {
                        warn!(error = %e, "Forecast client unavailable, rain signal disabled");
                        Self::disabled()
                    }
                }
            }
            _ => {
                debug!("No forecast API key configured, rain signal disabled");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.source.is_some()
    }

    /// Rain signal at `(latitude, longitude)`, or `None` when unknown.
    ///
    /// Coordinates come from [`FarmRecord::coordinates`](crate::types::FarmRecord::coordinates).
    pub async fn get_rain_signal(
        &self,
        coordinates: Option<(f64, f64)>,
        now: DateTime<Utc>,
    ) -> Option<RainSignal> {
        let source = self.source.as_ref()?;
        let (lat, lon) = coordinates?;

        match tokio::time::timeout(self.timeout, source.fetch(lat, lon)).await {
            Ok(Ok(entries)) => Some(aggregate_rain(&entries, now, self.window)),
            Ok(Err(e)) => {
                debug!(source = source.source_name(), error = %e, "Forecast fetch failed");
                None
            }
            Err(_) => {
                debug!(
                    source = source.source_name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Forecast fetch timed out"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(now: DateTime<Utc>, minutes: i64, pop: f64, rain_mm: f64) -> ForecastEntry {
        ForecastEntry {
            dt: now + ChronoDuration::minutes(minutes),
            pop,
            rain_mm,
        }
    }

    #[test]
    fn test_aggregate_only_counts_window() {
        let now = Utc::now();
        let entries = [
            entry(now, -30, 0.9, 5.0),      // past
            entry(now, 0, 0.2, 0.3),        // at now
            entry(now, 180, 0.4, 0.4),
            entry(now, 360, 0.1, 0.2),      // window end, inclusive
            entry(now, 420, 1.0, 10.0),     // beyond 6h
        ];
        let signal = aggregate_rain(&entries, now, ChronoDuration::hours(6));
        assert!((signal.max_pop - 0.4).abs() < 1e-9);
        assert!((signal.rain_mm - 0.9).abs() < 1e-9);
        assert!(!signal.rain_likely_next_6h);
    }

    #[test]
    fn test_aggregate_rain_volume_triggers() {
        let now = Utc::now();
        let entries = [entry(now, 60, 0.1, 0.6), entry(now, 240, 0.1, 0.5)];
        let signal = aggregate_rain(&entries, now, ChronoDuration::hours(6));
        assert!(signal.rain_likely_next_6h);
    }

    #[test]
    fn test_empty_forecast_is_dry() {
        let signal = aggregate_rain(&[], Utc::now(), ChronoDuration::hours(6));
        assert!(!signal.rain_likely_next_6h);
        assert_eq!(signal.rain_mm, 0.0);
    }

    #[tokio::test]
    async fn test_missing_coordinates_is_unknown() {
        let now = Utc::now();
        let provider = RainSignalProvider::new(
            Arc::new(StaticForecast::single(now, 1, 0.9, 3.0)),
            Duration::from_secs(1),
        );
        assert!(provider.get_rain_signal(None, now).await.is_none());
        let signal = provider.get_rain_signal(Some((1.0, 2.0)), now).await.unwrap();
        assert!(signal.rain_likely_next_6h);
    }

    #[tokio::test]
    async fn test_disabled_provider_is_unknown() {
        let provider = RainSignalProvider::disabled();
        assert!(!provider.is_enabled());
        assert!(provider.get_rain_signal(Some((1.0, 2.0)), Utc::now()).await.is_none());
    }

    struct SlowSource;

    #[async_trait]
    impl ForecastSource for SlowSource {
        async fn fetch(&self, _lat: f64, _lon: f64) -> Result<Vec<ForecastEntry>, ForecastError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }

        fn source_name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_times_out() {
        let provider = RainSignalProvider::new(Arc::new(SlowSource), Duration::from_secs(2));
        assert!(provider
            .get_rain_signal(Some((1.0, 2.0)), Utc::now())
            .await
            .is_none());
    }

    struct FailingSource;

    #[async_trait]
    impl ForecastSource for FailingSource {
        async fn fetch(&self, _lat: f64, _lon: f64) -> Result<Vec<ForecastEntry>, ForecastError> {
            Err(ForecastError::Parse("truncated body".to_string()))
        }

        fn source_name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_failing_source_is_unknown() {
        let provider = RainSignalProvider::new(Arc::new(FailingSource), Duration::from_secs(2));
        assert!(provider
            .get_rain_signal(Some((1.0, 2.0)), Utc::now())
            .await
            .is_none());
    }
}
