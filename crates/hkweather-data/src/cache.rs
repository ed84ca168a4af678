//! Refresh cache: the latest record per dataset with single-flight revalidation.
//!
//! Each dataset gets one lazily created slot. A caller that finds the slot
//! stale either starts the refresh (check-and-set of the in-flight token under
//! the slot lock) or joins the refresh already running. The refresh itself runs
//! on its own task and publishes exactly one record through a `watch` channel,
//! so a caller that stops waiting never disturbs the others.
//!
//! `get` never fails: upstream errors become `DegradedStale` (previous payload
//! kept) or `Unavailable` (nothing fetched yet).

use chrono::{DateTime, Utc};
use hkweather_core::Config;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::UpstreamError;
use crate::retry::{with_retry, RetryConfig};
use crate::types::{DatasetName, DegradeReason, NormalizedRecord, Payload, RecordState, SourceStatus};
use crate::upstream::{HkoFetcher, UpstreamFetcher};

/// Max age used by `health` and by callers without their own preference
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

type Resolved = Option<NormalizedRecord>;

struct InFlight {
    generation: u64,
    result: watch::Receiver<Resolved>,
}

#[derive(Debug, Clone)]
struct Snapshot {
    payload: Arc<Payload>,
    fetched_at: DateTime<Utc>,
}

#[derive(Default)]
struct CacheEntry {
    latest: Option<Snapshot>,
    last_success: Option<Instant>,
    last_attempt: Option<Instant>,
    in_flight: Option<InFlight>,
    generation: u64,
}

impl CacheEntry {
    fn fresh(&self, dataset: DatasetName, max_age: Duration, now: Instant) -> Option<NormalizedRecord> {
        // Zero means the caller always wants a revalidation.
        if max_age.is_zero() {
            return None;
        }
        let last_success = self.last_success?;
        let snapshot = self.latest.as_ref()?;
        if now.saturating_duration_since(last_success) > max_age {
            return None;
        }
        Some(NormalizedRecord {
            dataset,
            state: RecordState::Ok {
                payload: snapshot.payload.clone(),
                fetched_at: snapshot.fetched_at,
            },
        })
    }

    /// Best record available without an upstream call.
    fn degraded(&self, dataset: DatasetName, reason: DegradeReason) -> NormalizedRecord {
        match &self.latest {
            Some(snapshot) => NormalizedRecord {
                dataset,
                state: RecordState::DegradedStale {
                    payload: snapshot.payload.clone(),
                    fetched_at: snapshot.fetched_at,
                    reason,
                },
            },
            None => NormalizedRecord::unavailable(dataset, reason),
        }
    }

    fn resolve(
        &mut self,
        dataset: DatasetName,
        outcome: Result<NormalizedRecord, UpstreamError>,
        now: Instant,
    ) -> NormalizedRecord {
        self.last_attempt = Some(now);

        match outcome {
            Ok(NormalizedRecord {
                state: RecordState::Ok { payload, fetched_at },
                ..
            }) if payload.dataset() == dataset => {
                self.latest = Some(Snapshot {
                    payload: payload.clone(),
                    fetched_at,
                });
                self.last_success = Some(now);
                tracing::info!(%dataset, "Refreshed from upstream");
                NormalizedRecord {
                    dataset,
                    state: RecordState::Ok { payload, fetched_at },
                }
            }
            Ok(unexpected) => {
                tracing::warn!(
                    %dataset,
                    got = %unexpected.dataset,
                    status = ?unexpected.status(),
                    "Fetcher returned an unusable record"
                );
                self.degraded(dataset, DegradeReason::ParseError)
            }
            Err(e) => {
                let record = self.degraded(dataset, e.kind.into());
                tracing::warn!(%dataset, status = ?record.status(), "Refresh failed: {}", e);
                record
            }
        }
    }

    /// Release the in-flight token if it still belongs to `generation`.
    fn release(&mut self, generation: u64) {
        if self
            .in_flight
            .as_ref()
            .is_some_and(|f| f.generation == generation)
        {
            self.in_flight = None;
        }
    }
}

/// Clears the in-flight token if the refresh task ends without resolving.
struct InFlightGuard {
    slot: Arc<Mutex<CacheEntry>>,
    generation: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.slot.lock().release(self.generation);
    }
}

/// Point-in-time view of one cache entry
#[derive(Debug, Clone, Serialize)]
pub struct EntryStatus {
    pub dataset: DatasetName,
    pub has_payload: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    /// Time since the last successful refresh; `None` if never refreshed or invalidated
    pub since_success: Option<Duration>,
    pub since_attempt: Option<Duration>,
    pub refreshing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub upstream: SourceStatus,
    pub entries: usize,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.upstream == SourceStatus::Ok
    }
}

struct Inner {
    fetcher: Arc<dyn UpstreamFetcher>,
    retry: RetryConfig,
    default_max_age: Duration,
    entries: Mutex<HashMap<DatasetName, Arc<Mutex<CacheEntry>>>>,
}

/// Shared cache of normalized records, cheap to clone.
///
/// Build one per process and hand clones to whatever serves requests.
#[derive(Clone)]
pub struct RefreshCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RefreshCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCache")
            .field("retry", &self.inner.retry)
            .field("default_max_age", &self.inner.default_max_age)
            .field("entries", &self.entry_count())
            .finish()
    }
}

impl RefreshCache {
    pub fn new(fetcher: Arc<dyn UpstreamFetcher>, retry: RetryConfig) -> Self {
        Self::with_default_max_age(fetcher, retry, DEFAULT_MAX_AGE)
    }

    pub fn with_default_max_age(
        fetcher: Arc<dyn UpstreamFetcher>,
        retry: RetryConfig,
        default_max_age: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                retry,
                default_max_age,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Cache backed by the HKO fetcher described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let fetcher = HkoFetcher::new(&config.upstream)?;
        Ok(Self::with_default_max_age(
            Arc::new(fetcher),
            RetryConfig::from(&config.cache),
            config.cache.default_max_age(),
        ))
    }

    pub fn default_max_age(&self) -> Duration {
        self.inner.default_max_age
    }

    /// Latest record for `dataset`, refreshed if older than `max_age`.
    ///
    /// Fresh hits return without suspending. Otherwise the caller waits for the
    /// single in-flight refresh of `dataset`, starting it if there is none.
    pub async fn get(&self, dataset: DatasetName, max_age: Duration) -> NormalizedRecord {
        let slot = self.slot(dataset);

        let mut result = {
            let mut entry = slot.lock();
            if let Some(record) = entry.fresh(dataset, max_age, Instant::now()) {
                tracing::debug!(%dataset, "Cache hit");
                return record;
            }

            let joined = entry.in_flight.as_ref().map(|f| f.result.clone());
            if let Some(rx) = joined {
                tracing::debug!(%dataset, "Joining in-flight refresh");
                rx
            } else {
                entry.generation += 1;
                let generation = entry.generation;
                let (tx, rx) = watch::channel(None);
                entry.in_flight = Some(InFlight {
                    generation,
                    result: rx.clone(),
                });
                tracing::debug!(%dataset, generation, "Starting refresh");
                self.spawn_refresh(dataset, slot.clone(), generation, tx);
                rx
            }
        };

        let resolved = match result.wait_for(Option::is_some).await {
            Ok(record) => record.clone(),
            Err(_) => None,
        };

        resolved.unwrap_or_else(|| {
            tracing::warn!(%dataset, "Refresh ended without a result");
            slot.lock().degraded(dataset, DegradeReason::RefreshAborted)
        })
    }

    /// `get` with the configured default max age.
    pub async fn get_default(&self, dataset: DatasetName) -> NormalizedRecord {
        self.get(dataset, self.inner.default_max_age).await
    }

    fn spawn_refresh(
        &self,
        dataset: DatasetName,
        slot: Arc<Mutex<CacheEntry>>,
        generation: u64,
        tx: watch::Sender<Resolved>,
    ) {
        let fetcher = self.inner.fetcher.clone();
        let retry = self.inner.retry.clone();

        tokio::spawn(async move {
            let _guard = InFlightGuard {
                slot: slot.clone(),
                generation,
            };

            let upstream: &dyn UpstreamFetcher = fetcher.as_ref();
            let outcome = with_retry(&retry, || upstream.fetch(dataset)).await;

            // Publish and release under one lock so no caller can start a
            // second refresh before the first result is visible.
            let mut entry = slot.lock();
            let record = entry.resolve(dataset, outcome, Instant::now());
            tx.send_replace(Some(record));
            entry.release(generation);
        });
    }

    fn slot(&self, dataset: DatasetName) -> Arc<Mutex<CacheEntry>> {
        self.inner
            .entries
            .lock()
            .entry(dataset)
            .or_default()
            .clone()
    }

    fn existing_slots(&self) -> Vec<(DatasetName, Arc<Mutex<CacheEntry>>)> {
        let mut slots: Vec<_> = self
            .inner
            .entries
            .lock()
            .iter()
            .map(|(dataset, slot)| (*dataset, slot.clone()))
            .collect();
        slots.sort_by_key(|(dataset, _)| *dataset);
        slots
    }

    /// Number of datasets that have been requested at least once
    pub fn entry_count(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn status(&self) -> Vec<EntryStatus> {
        let now = Instant::now();
        self.existing_slots()
            .into_iter()
            .map(|(dataset, slot)| {
                let entry = slot.lock();
                EntryStatus {
                    dataset,
                    has_payload: entry.latest.is_some(),
                    fetched_at: entry.latest.as_ref().map(|s| s.fetched_at),
                    since_success: entry.last_success.map(|t| now.saturating_duration_since(t)),
                    since_attempt: entry.last_attempt.map(|t| now.saturating_duration_since(t)),
                    refreshing: entry.in_flight.is_some(),
                }
            })
            .collect()
    }

    /// Force the next `get` for `dataset` to revalidate.
    ///
    /// The payload is kept so a failed revalidation can still serve it stale.
    /// Returns whether there was a fresh entry to invalidate.
    pub fn invalidate(&self, dataset: DatasetName) -> bool {
        let slot = self.inner.entries.lock().get(&dataset).cloned();
        match slot {
            Some(slot) => slot.lock().last_success.take().is_some(),
            None => false,
        }
    }

    /// `invalidate` every entry; returns how many were invalidated.
    pub fn invalidate_all(&self) -> usize {
        let count = self
            .existing_slots()
            .into_iter()
            .filter(|(_, slot)| slot.lock().last_success.take().is_some())
            .count();
        tracing::info!("Invalidated {} cache entries", count);
        count
    }

    /// Probe upstream health through the cache using current conditions.
    pub async fn health(&self) -> HealthReport {
        let record = self.get_default(DatasetName::CurrentWeather).await;
        HealthReport {
            upstream: record.status(),
            entries: self.entry_count(),
            checked_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamErrorKind;
    use crate::types::{CurrentConditions, DistrictRainfall, RainfallReport, StationReading};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Step = Result<Payload, UpstreamErrorKind>;

    /// Fetcher that replays scripted outcomes, then succeeds with a default payload.
    struct ScriptedFetcher {
        calls: AtomicUsize,
        delay: Duration,
        script: Mutex<VecDeque<Step>>,
    }

    impl ScriptedFetcher {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Self::with_delay(steps, Duration::ZERO)
        }

        fn with_delay(steps: Vec<Step>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                script: Mutex::new(steps.into()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UpstreamFetcher for ScriptedFetcher {
        async fn fetch(&self, dataset: DatasetName) -> Result<NormalizedRecord, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let step = self.script.lock().pop_front();
            match step {
                Some(Ok(payload)) => Ok(NormalizedRecord::ok(payload, Utc::now())),
                Some(Err(kind)) => Err(UpstreamError {
                    dataset,
                    kind,
                    status: None,
                    detail: "scripted failure".to_string(),
                }),
                None => Ok(NormalizedRecord::ok(default_payload(dataset), Utc::now())),
            }
        }
    }

    struct PanickingFetcher;

    #[async_trait]
    impl UpstreamFetcher for PanickingFetcher {
        async fn fetch(&self, _dataset: DatasetName) -> Result<NormalizedRecord, UpstreamError> {
            panic!("fetcher blew up");
        }
    }

    fn current(temp: f64) -> Payload {
        Payload::CurrentWeather(CurrentConditions {
            updated_at: None,
            temperatures: vec![StationReading {
                place: "Hong Kong Observatory".to_string(),
                value: temp,
            }],
            humidity: vec![],
            warnings: vec![],
        })
    }

    fn rain(mm: f64) -> Payload {
        Payload::Rainfall(RainfallReport {
            updated_at: None,
            districts: vec![DistrictRainfall {
                district: "Sai Kung".to_string(),
                max_mm: mm,
                under_maintenance: false,
            }],
        })
    }

    fn default_payload(dataset: DatasetName) -> Payload {
        match dataset {
            DatasetName::CurrentWeather => current(25.0),
            DatasetName::Rainfall => rain(0.0),
            DatasetName::Forecast => Payload::Forecast(crate::types::Forecast {
                updated_at: None,
                general_situation: "Fine.".to_string(),
                days: vec![],
            }),
        }
    }

    fn cache(fetcher: Arc<ScriptedFetcher>) -> RefreshCache {
        RefreshCache::new(fetcher, RetryConfig::none())
    }

    fn temperature(record: &NormalizedRecord) -> Option<f64> {
        record
            .payload()
            .and_then(Payload::as_current)
            .and_then(|c| c.station("Hong Kong Observatory"))
            .map(|r| r.value)
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_get_within_max_age_uses_cache() {
        let fetcher = ScriptedFetcher::new(vec![]);
        let cache = cache(fetcher.clone());
        let max_age = Duration::from_secs(60);

        let first = cache.get(DatasetName::Forecast, max_age).await;
        tokio::time::advance(Duration::from_secs(59)).await;
        let second = cache.get(DatasetName::Forecast, max_age).await;

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(second.status(), SourceStatus::Ok);
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_weather_scenario() {
        let fetcher = ScriptedFetcher::new(vec![Ok(current(28.5)), Ok(current(30.1))]);
        let cache = cache(fetcher.clone());
        let max_age = Duration::from_secs(300);

        let at_0 = cache.get(DatasetName::CurrentWeather, max_age).await;
        assert_eq!(temperature(&at_0), Some(28.5));
        assert_eq!(fetcher.calls(), 1);

        tokio::time::advance(Duration::from_secs(100)).await;
        let at_100 = cache.get(DatasetName::CurrentWeather, max_age).await;
        assert_eq!(at_100, at_0);
        assert_eq!(fetcher.calls(), 1);

        tokio::time::advance(Duration::from_secs(300)).await;
        let at_400 = cache.get(DatasetName::CurrentWeather, max_age).await;
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(temperature(&at_400), Some(30.1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rainfall_failure_scenario() {
        let fetcher = ScriptedFetcher::new(vec![
            Err(UpstreamErrorKind::Timeout),
            Ok(rain(12.5)),
            Err(UpstreamErrorKind::Timeout),
        ]);
        let cache = cache(fetcher.clone());

        let first = cache.get(DatasetName::Rainfall, Duration::ZERO).await;
        assert_eq!(first.status(), SourceStatus::Unavailable);
        assert!(first.payload().is_none());
        assert_eq!(first.degrade_reason(), Some(DegradeReason::Timeout));

        let second = cache.get(DatasetName::Rainfall, Duration::ZERO).await;
        assert_eq!(second.status(), SourceStatus::Ok);

        let third = cache.get(DatasetName::Rainfall, Duration::ZERO).await;
        assert_eq!(third.status(), SourceStatus::DegradedStale);
        assert_eq!(third.payload(), second.payload());
        assert_eq!(third.fetched_at(), second.fetched_at());
        assert_eq!(third.degrade_reason(), Some(DegradeReason::Timeout));
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_failure_without_previous_payload_is_unavailable() {
        let fetcher = ScriptedFetcher::new(vec![Err(UpstreamErrorKind::HttpError)]);
        let cache = cache(fetcher.clone());

        let record = cache.get(DatasetName::Forecast, DEFAULT_MAX_AGE).await;

        assert_eq!(record.status(), SourceStatus::Unavailable);
        assert!(record.payload().is_none());
        assert_eq!(record.degrade_reason(), Some(DegradeReason::HttpError));

        // A failed attempt does not count as fresh data.
        let retry = cache.get(DatasetName::Forecast, DEFAULT_MAX_AGE).await;
        assert_eq!(retry.status(), SourceStatus::Ok);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_fetch() {
        const CALLERS: usize = 32;
        let fetcher = ScriptedFetcher::with_delay(vec![Ok(current(28.5))], Duration::from_millis(200));
        let cache = cache(fetcher.clone());
        let barrier = Arc::new(tokio::sync::Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    cache.get(DatasetName::CurrentWeather, Duration::ZERO).await
                })
            })
            .collect();

        let mut records = Vec::with_capacity(CALLERS);
        for handle in handles {
            records.push(handle.await.unwrap());
        }

        assert_eq!(fetcher.calls(), 1);
        assert!(records.iter().all(|r| *r == records[0]));
        assert_eq!(temperature(&records[0]), Some(28.5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_reads_do_not_touch_last_success() {
        let fetcher = ScriptedFetcher::new(vec![]);
        let cache = cache(fetcher.clone());
        let max_age = Duration::from_secs(300);

        cache.get(DatasetName::Rainfall, max_age).await;
        let before = cache.status();

        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(10)).await;
            cache.get(DatasetName::Rainfall, max_age).await;
        }
        let after = cache.status();

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(before[0].fetched_at, after[0].fetched_at);
        assert_eq!(after[0].since_success, Some(Duration::from_secs(50)));
        assert_eq!(after[0].since_attempt, Some(Duration::from_secs(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_caller_does_not_cancel_refresh() {
        let fetcher = ScriptedFetcher::with_delay(vec![Ok(current(27.0))], Duration::from_millis(50));
        let cache = cache(fetcher.clone());

        let owner = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(DatasetName::CurrentWeather, Duration::ZERO).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.status()[0].refreshing);

        let joiner = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(DatasetName::CurrentWeather, Duration::ZERO).await })
        };
        tokio::task::yield_now().await;
        owner.abort();

        let record = joiner.await.unwrap();
        assert_eq!(temperature(&record), Some(27.0));
        assert_eq!(fetcher.calls(), 1);
        assert!(!cache.status()[0].refreshing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_datasets_refresh_independently() {
        let fetcher = ScriptedFetcher::with_delay(vec![], Duration::from_millis(100));
        let cache = cache(fetcher.clone());

        let (current, forecast) = tokio::join!(
            cache.get(DatasetName::CurrentWeather, DEFAULT_MAX_AGE),
            cache.get(DatasetName::Forecast, DEFAULT_MAX_AGE),
        );

        assert_eq!(fetcher.calls(), 2);
        assert_eq!(current.dataset, DatasetName::CurrentWeather);
        assert_eq!(forecast.dataset, DatasetName::Forecast);
        assert!(current.is_ok() && forecast.is_ok());
        assert_eq!(cache.entry_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_revalidation_but_keeps_payload() {
        let fetcher = ScriptedFetcher::new(vec![Ok(rain(3.0)), Err(UpstreamErrorKind::ParseError)]);
        let cache = cache(fetcher.clone());

        assert!(!cache.invalidate(DatasetName::Rainfall));
        let first = cache.get(DatasetName::Rainfall, DEFAULT_MAX_AGE).await;

        assert!(cache.invalidate(DatasetName::Rainfall));
        assert!(!cache.invalidate(DatasetName::Rainfall));

        let second = cache.get(DatasetName::Rainfall, DEFAULT_MAX_AGE).await;
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(second.status(), SourceStatus::DegradedStale);
        assert_eq!(second.payload(), first.payload());
        assert_eq!(second.degrade_reason(), Some(DegradeReason::ParseError));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_all_counts_fresh_entries() {
        let fetcher = ScriptedFetcher::new(vec![]);
        let cache = cache(fetcher.clone());

        for dataset in DatasetName::ALL {
            cache.get(dataset, DEFAULT_MAX_AGE).await;
        }
        assert_eq!(cache.invalidate_all(), 3);
        assert_eq!(cache.invalidate_all(), 0);
        assert!(cache.status().iter().all(|s| s.has_payload && s.since_success.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried_within_one_refresh() {
        let fetcher = ScriptedFetcher::new(vec![Err(UpstreamErrorKind::Timeout), Ok(current(26.0))]);
        let cache = RefreshCache::new(fetcher.clone(), RetryConfig::new(1, 100, 100));

        let record = cache.get(DatasetName::CurrentWeather, DEFAULT_MAX_AGE).await;

        assert_eq!(record.status(), SourceStatus::Ok);
        assert_eq!(temperature(&record), Some(26.0));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_mismatched_payload_is_rejected() {
        let fetcher = ScriptedFetcher::new(vec![Ok(rain(1.0))]);
        let cache = cache(fetcher.clone());

        let record = cache.get(DatasetName::CurrentWeather, DEFAULT_MAX_AGE).await;

        assert_eq!(record.status(), SourceStatus::Unavailable);
        assert_eq!(record.degrade_reason(), Some(DegradeReason::ParseError));
    }

    #[tokio::test]
    async fn test_aborted_refresh_degrades_and_releases_token() {
        let cache = RefreshCache::new(Arc::new(PanickingFetcher), RetryConfig::none());

        let record = cache.get(DatasetName::Forecast, DEFAULT_MAX_AGE).await;

        assert_eq!(record.status(), SourceStatus::Unavailable);
        assert_eq!(record.degrade_reason(), Some(DegradeReason::RefreshAborted));
        assert!(!cache.status()[0].refreshing);
    }

    #[tokio::test]
    async fn test_health_reports_upstream_status() {
        let fetcher = ScriptedFetcher::new(vec![Err(UpstreamErrorKind::Timeout)]);
        let cache = cache(fetcher.clone());

        let report = cache.health().await;
        assert_eq!(report.upstream, SourceStatus::Unavailable);
        assert!(!report.is_healthy());
        assert_eq!(report.entries, 1);

        let report = cache.health().await;
        assert!(report.is_healthy());
    }
}
