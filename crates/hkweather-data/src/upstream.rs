//! Upstream fetcher for the Hong Kong Observatory open data API.
//!
//! One GET per call, no caching, no retries. Everything that can go wrong is
//! reported as an `UpstreamError` tagged with the dataset.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use hkweather_core::{Language, UpstreamConfig};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::UpstreamError;
use crate::types::{
    CurrentConditions, DatasetName, DayForecast, DistrictRainfall, Forecast, NormalizedRecord,
    Payload, RainfallReport, StationReading,
};

const USER_AGENT: &str = "hkweather/0.1.0";

/// Source of normalized records for the refresh cache.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    /// Fetch `dataset` once. Returned records always have status Ok.
    async fn fetch(&self, dataset: DatasetName) -> Result<NormalizedRecord, UpstreamError>;
}

#[derive(Debug, Clone)]
pub struct HkoFetcher {
    client: Arc<Client>,
    base_url: String,
    lang: Language,
}

impl HkoFetcher {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        Self::with_timeout(config.base_url.clone(), config.lang, config.timeout())
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        lang: Language,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.into(),
            lang,
        })
    }
}

#[async_trait]
impl UpstreamFetcher for HkoFetcher {
    async fn fetch(&self, dataset: DatasetName) -> Result<NormalizedRecord, UpstreamError> {
        tracing::debug!(%dataset, "Fetching from HKO");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("dataType", dataset.data_type()), ("lang", self.lang.as_str())])
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(dataset, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::http(
                dataset,
                Some(status.as_u16()),
                format!("HKO returned status {}", status),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::from_reqwest(dataset, &e))?;

        let payload = parse_payload(dataset, &body)?;
        Ok(NormalizedRecord::ok(payload, Utc::now()))
    }
}

/// Normalize a raw HKO response body for `dataset`.
pub fn parse_payload(dataset: DatasetName, body: &[u8]) -> Result<Payload, UpstreamError> {
    match dataset {
        DatasetName::CurrentWeather => {
            let raw: RegionalReadings = decode(dataset, body)?;
            let temperature = raw
                .temperature
                .ok_or_else(|| UpstreamError::parse(dataset, "missing temperature readings"))?;

            Ok(Payload::CurrentWeather(CurrentConditions {
                updated_at: parse_time(dataset, raw.icon_update_time.or(raw.update_time))?,
                temperatures: temperature.into_readings(),
                humidity: raw.humidity.map(ReadingSet::into_readings).unwrap_or_default(),
                warnings: raw
                    .warning_message
                    .map(WarningMessage::into_list)
                    .unwrap_or_default(),
            }))
        }
        DatasetName::Rainfall => {
            let raw: RegionalReadings = decode(dataset, body)?;
            let rainfall = raw
                .rainfall
                .ok_or_else(|| UpstreamError::parse(dataset, "missing rainfall readings"))?;

            let districts = rainfall
                .data
                .into_iter()
                .map(|r| DistrictRainfall {
                    district: r.place,
                    max_mm: r.max.unwrap_or(0.0),
                    under_maintenance: r.main.is_some_and(|m| m.eq_ignore_ascii_case("true")),
                })
                .collect();

            Ok(Payload::Rainfall(RainfallReport {
                updated_at: parse_time(dataset, raw.update_time)?,
                districts,
            }))
        }
        DatasetName::Forecast => {
            let raw: RawForecast = decode(dataset, body)?;

            let days = raw
                .weather_forecast
                .into_iter()
                .map(|d| d.normalize(dataset))
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Payload::Forecast(Forecast {
                updated_at: parse_time(dataset, raw.update_time)?,
                general_situation: raw.general_situation.unwrap_or_default(),
                days,
            }))
        }
    }
}

fn decode<'a, T: Deserialize<'a>>(dataset: DatasetName, body: &'a [u8]) -> Result<T, UpstreamError> {
    serde_json::from_slice(body).map_err(|e| UpstreamError::parse(dataset, e.to_string()))
}

fn parse_time(
    dataset: DatasetName,
    raw: Option<String>,
) -> Result<Option<DateTime<FixedOffset>>, UpstreamError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(Some)
            .map_err(|e| UpstreamError::parse(dataset, format!("bad timestamp {:?}: {}", s, e))),
    }
}

// HKO wire shapes. Only the fields we normalize are declared.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegionalReadings {
    update_time: Option<String>,
    icon_update_time: Option<String>,
    temperature: Option<ReadingSet>,
    humidity: Option<ReadingSet>,
    rainfall: Option<RainfallSet>,
    warning_message: Option<WarningMessage>,
}

#[derive(Debug, Deserialize)]
struct ReadingSet {
    #[serde(default)]
    data: Vec<RawReading>,
}

impl ReadingSet {
    fn into_readings(self) -> Vec<StationReading> {
        self.data
            .into_iter()
            .filter_map(|r| {
                r.value.map(|value| StationReading {
                    place: r.place,
                    value,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawReading {
    place: String,
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RainfallSet {
    #[serde(default)]
    data: Vec<RawRainfall>,
}

#[derive(Debug, Deserialize)]
struct RawRainfall {
    place: String,
    max: Option<f64>,
    main: Option<String>,
}

/// HKO sends `""` when there are no warnings and a list otherwise
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WarningMessage {
    List(Vec<String>),
    Text(String),
}

impl WarningMessage {
    fn into_list(self) -> Vec<String> {
        match self {
            Self::List(list) => list,
            Self::Text(text) if text.trim().is_empty() => Vec::new(),
            Self::Text(text) => vec![text],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawForecast {
    general_situation: Option<String>,
    #[serde(default)]
    weather_forecast: Vec<RawDay>,
    update_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDay {
    forecast_date: String,
    #[serde(default)]
    week: String,
    #[serde(default)]
    forecast_wind: String,
    #[serde(default)]
    forecast_weather: String,
    forecast_maxtemp: Option<RawValue>,
    forecast_mintemp: Option<RawValue>,
    forecast_maxrh: Option<RawValue>,
    forecast_minrh: Option<RawValue>,
}

impl RawDay {
    fn normalize(self, dataset: DatasetName) -> Result<DayForecast, UpstreamError> {
        let date = NaiveDate::parse_from_str(&self.forecast_date, "%Y%m%d").map_err(|e| {
            UpstreamError::parse(
                dataset,
                format!("bad forecast date {:?}: {}", self.forecast_date, e),
            )
        })?;

        Ok(DayForecast {
            date,
            day_of_week: self.week,
            weather: self.forecast_weather,
            wind: self.forecast_wind,
            max_temp: self.forecast_maxtemp.and_then(|v| v.value),
            min_temp: self.forecast_mintemp.and_then(|v| v.value),
            max_humidity: self.forecast_maxrh.and_then(|v| v.value),
            min_humidity: self.forecast_minrh.and_then(|v| v.value),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawValue {
    value: Option<f64>,
}
