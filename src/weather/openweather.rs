//! OpenWeather-style 5 day / 3 hour forecast client

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use super::{ForecastEntry, ForecastError, ForecastSource};

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    list: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    /// Unix seconds
    dt: i64,
    #[serde(default)]
    pop: Option<f64>,
    #[serde(default)]
    rain: Option<RawRain>,
}

#[derive(Debug, Deserialize)]
struct RawRain {
    #[serde(rename = "3h", default)]
    three_hours: Option<f64>,
}

/// HTTP forecast source
#[derive(Clone)]
pub struct OpenWeatherSource {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherSource {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, ForecastError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

/// Parse a forecast response body into entries.
///
/// Entries with an out-of-range `dt` are dropped.
pub(crate) fn parse_forecast(body: &[u8]) -> Result<Vec<ForecastEntry>, ForecastError> {
    let response: ForecastResponse =
        serde_json::from_slice(body).map_err(|e| ForecastError::Parse(e.to_string()))?;
    Ok(response
        .list
        .into_iter()
        .filter_map(|raw| {
            let dt = DateTime::<Utc>::from_timestamp(raw.dt, 0)?;
            Some(ForecastEntry {
                dt,
                pop: raw.pop.unwrap_or(0.0),
                rain_mm: raw.rain.and_then(|r| r.three_hours).unwrap_or(0.0),
            })
        })
        .collect())
}

#[async_trait]
impl ForecastSource for OpenWeatherSource {
    async fn fetch(&self, lat: f64, lon: f64) -> Result<Vec<ForecastEntry>, ForecastError> {
        let resp = self
            .http
            .get(format!("{}/data/2.5/forecast", self.base_url))
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ForecastError::Status(resp.status()));
        }

        let body = resp.bytes().await?;
        parse_forecast(&body)
    }

    fn source_name(&self) -> &str {
        "openweather"
    }
}
