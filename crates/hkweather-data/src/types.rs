use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::UpstreamErrorKind;

/// The fixed set of datasets served through the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetName {
    CurrentWeather,
    Rainfall,
    Forecast,
}

impl DatasetName {
    pub const ALL: [DatasetName; 3] = [Self::CurrentWeather, Self::Rainfall, Self::Forecast];

    /// HKO `dataType` query value
    ///
    /// Current weather and rainfall both come from the regional readings report.
    pub fn data_type(&self) -> &'static str {
        match self {
            Self::CurrentWeather | Self::Rainfall => "rhrread",
            Self::Forecast => "fnd",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentWeather => "current_weather",
            Self::Rainfall => "rainfall",
            Self::Forecast => "forecast",
        }
    }
}

impl std::fmt::Display for DatasetName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single value reported by a named station or district
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationReading {
    pub place: String,
    pub value: f64,
}

/// Current conditions from the regional readings report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub updated_at: Option<DateTime<FixedOffset>>,
    /// Degrees Celsius per station
    pub temperatures: Vec<StationReading>,
    /// Relative humidity (%) per station
    pub humidity: Vec<StationReading>,
    pub warnings: Vec<String>,
}

impl CurrentConditions {
    /// Mean station temperature, rounded to one decimal place
    pub fn average_temperature(&self) -> Option<f64> {
        if self.temperatures.is_empty() {
            return None;
        }
        let sum: f64 = self.temperatures.iter().map(|r| r.value).sum();
        let mean = sum / self.temperatures.len() as f64;
        Some((mean * 10.0).round() / 10.0)
    }

    /// Case-insensitive station lookup
    pub fn station(&self, name: &str) -> Option<&StationReading> {
        self.temperatures
            .iter()
            .find(|r| r.place.eq_ignore_ascii_case(name.trim()))
    }

    pub fn station_names(&self) -> impl Iterator<Item = &str> {
        self.temperatures.iter().map(|r| r.place.as_str())
    }
}

/// Maximum rainfall in one district over the past hour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictRainfall {
    pub district: String,
    pub max_mm: f64,
    /// The upstream flags districts whose gauges are down
    pub under_maintenance: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RainfallReport {
    pub updated_at: Option<DateTime<FixedOffset>>,
    pub districts: Vec<DistrictRainfall>,
}

impl RainfallReport {
    /// Districts where any rain was recorded
    pub fn raining(&self) -> impl Iterator<Item = &DistrictRainfall> {
        self.districts.iter().filter(|d| d.max_mm > 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayForecast {
    pub date: NaiveDate,
    pub day_of_week: String,
    pub weather: String,
    pub wind: String,
    pub max_temp: Option<f64>,
    pub min_temp: Option<f64>,
    pub max_humidity: Option<f64>,
    pub min_humidity: Option<f64>,
}

/// Nine-day forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub updated_at: Option<DateTime<FixedOffset>>,
    pub general_situation: String,
    pub days: Vec<DayForecast>,
}

impl Forecast {
    pub const MAX_DAYS: usize = 9;

    /// The first `n` days; counts outside `1..=9` return every day
    pub fn first_days(&self, n: usize) -> &[DayForecast] {
        if (1..=Self::MAX_DAYS).contains(&n) {
            &self.days[..n.min(self.days.len())]
        } else {
            &self.days
        }
    }
}

/// Normalized payload, one shape per dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    CurrentWeather(CurrentConditions),
    Rainfall(RainfallReport),
    Forecast(Forecast),
}

impl Payload {
    pub fn dataset(&self) -> DatasetName {
        match self {
            Self::CurrentWeather(_) => DatasetName::CurrentWeather,
            Self::Rainfall(_) => DatasetName::Rainfall,
            Self::Forecast(_) => DatasetName::Forecast,
        }
    }

    pub fn as_current(&self) -> Option<&CurrentConditions> {
        match self {
            Self::CurrentWeather(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_rainfall(&self) -> Option<&RainfallReport> {
        match self {
            Self::Rainfall(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_forecast(&self) -> Option<&Forecast> {
        match self {
            Self::Forecast(f) => Some(f),
            _ => None,
        }
    }
}

/// Health of a record as seen by the route layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    DegradedStale,
    Unavailable,
}

impl SourceStatus {
    /// Conventional HTTP status for a response carrying a record with this status
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Ok | Self::DegradedStale => 200,
            Self::Unavailable => 503,
        }
    }
}

/// Why a record is not fresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    Timeout,
    HttpError,
    ParseError,
    /// The refresh task ended without publishing a result
    RefreshAborted,
}

impl From<UpstreamErrorKind> for DegradeReason {
    fn from(kind: UpstreamErrorKind) -> Self {
        match kind {
            UpstreamErrorKind::Timeout => Self::Timeout,
            UpstreamErrorKind::HttpError => Self::HttpError,
            UpstreamErrorKind::ParseError => Self::ParseError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordState {
    Ok {
        payload: Arc<Payload>,
        fetched_at: DateTime<Utc>,
    },
    /// Last known-good payload, served because the refresh failed
    DegradedStale {
        payload: Arc<Payload>,
        fetched_at: DateTime<Utc>,
        reason: DegradeReason,
    },
    /// No payload has ever been fetched successfully
    Unavailable {
        attempted_at: DateTime<Utc>,
        reason: DegradeReason,
    },
}

/// What every cache read returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub dataset: DatasetName,
    #[serde(flatten)]
    pub state: RecordState,
}

impl NormalizedRecord {
    pub fn ok(payload: Payload, fetched_at: DateTime<Utc>) -> Self {
        Self {
            dataset: payload.dataset(),
            state: RecordState::Ok {
                payload: Arc::new(payload),
                fetched_at,
            },
        }
    }

    pub fn unavailable(dataset: DatasetName, reason: DegradeReason) -> Self {
        Self {
            dataset,
            state: RecordState::Unavailable {
                attempted_at: Utc::now(),
                reason,
            },
        }
    }

    pub fn status(&self) -> SourceStatus {
        match self.state {
            RecordState::Ok { .. } => SourceStatus::Ok,
            RecordState::DegradedStale { .. } => SourceStatus::DegradedStale,
            RecordState::Unavailable { .. } => SourceStatus::Unavailable,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status() == SourceStatus::Ok
    }

    /// `None` only when the dataset has never been fetched successfully
    pub fn payload(&self) -> Option<&Payload> {
        match &self.state {
            RecordState::Ok { payload, .. } | RecordState::DegradedStale { payload, .. } => {
                Some(payload)
            }
            RecordState::Unavailable { .. } => None,
        }
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            RecordState::Ok { fetched_at, .. } | RecordState::DegradedStale { fetched_at, .. } => {
                Some(fetched_at)
            }
            RecordState::Unavailable { .. } => None,
        }
    }

    pub fn degrade_reason(&self) -> Option<DegradeReason> {
        match self.state {
            RecordState::Ok { .. } => None,
            RecordState::DegradedStale { reason, .. } | RecordState::Unavailable { reason, .. } => {
                Some(reason)
            }
        }
    }
}
