//! Per-zone weather ingestion: cache, bounded concurrent fetch with retry,
//! and cleaning.

use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;
use futures_util::StreamExt;
use futures_util::stream;
use rand::Rng;
use tracing::{debug, info, warn};

use super::cache::{CacheEntry, CacheLookup, Fingerprint, WeatherCache};
use super::clean::{CleaningParams, clean_series};
use super::source::{FetchError, WeatherHour, WeatherRequest, WeatherSource};
use crate::batch::BatchOutcome;
use crate::config::WeatherConfig;
use crate::grid::Zone;

/// Bounded retry with exponential backoff and jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, first try included.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub backoff_base: Duration,
    /// Upper bound of the random delay added to each backoff.
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt number `attempt` (1-based),
    /// without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor)
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let extra = if jitter_ms > 0 {
            rand::rng().random_range(0..=jitter_ms)
        } else {
            0
        };
        self.backoff(attempt) + Duration::from_millis(extra)
    }
}

impl From<&WeatherConfig> for RetryPolicy {
    fn from(w: &WeatherConfig) -> Self {
        Self {
            max_attempts: w.max_attempts.max(1),
            backoff_base: Duration::from_millis(w.backoff_base_ms),
            jitter: Duration::from_millis(w.jitter_ms),
        }
    }
}

/// Everything the ingestion batch needs besides the zones.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// First date.
    pub start: NaiveDate,
    /// Last date.
    pub end: NaiveDate,
    /// City time zone.
    pub tz: Tz,
    /// Requests in flight.
    pub workers: usize,
    /// Retry behaviour.
    pub retry: RetryPolicy,
    /// Cleaning behaviour.
    pub cleaning: CleaningParams,
}

impl From<&WeatherConfig> for IngestSettings {
    fn from(w: &WeatherConfig) -> Self {
        Self {
            start: w.start_date,
            end: w.resolved_end_date(),
            tz: w.timezone,
            workers: w.workers.max(1),
            retry: RetryPolicy::from(w),
            cleaning: CleaningParams::from(w),
        }
    }
}

/// Cleaned series for one zone.
#[derive(Debug, Clone)]
pub struct ZoneWeather {
    /// Zone identifier.
    pub zone_id: String,
    /// Cleaned hourly series.
    pub hours: Vec<WeatherHour>,
    /// Whether the raw series came from the cache.
    pub from_cache: bool,
}

/// Calls `source` until it succeeds or the policy's attempts run out.
///
/// Only transient errors (see [`FetchError::is_transient`]) are retried.
///
/// # Errors
///
/// The first permanent error, or the last attempt's error once all
/// attempts have failed.
pub async fn fetch_with_retry<S: WeatherSource>(
    source: &S,
    request: &WeatherRequest,
    policy: &RetryPolicy,
) -> Result<Vec<WeatherHour>, FetchError> {
    let mut attempt = 1;
    loop {
        match source.fetch(request).await {
            Ok(hours) => return Ok(hours),
            Err(e) if attempt >= policy.max_attempts || !e.is_transient() => return Err(e),
            Err(e) => {
                let delay = policy.delay_with_jitter(attempt);
                warn!(
                    zone = %request.zone_id,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Loads, fetches and cleans weather for every zone.
///
/// At most `settings.workers` zones are in flight. Zones whose fetch fails
/// after all retries, or whose series is empty after cleaning, are reported
/// in `failed`; outputs are sorted by ZoneID.
pub async fn ingest_zones<S, C>(
    zones: &[Zone],
    source: &S,
    cache: &C,
    settings: &IngestSettings,
) -> BatchOutcome<ZoneWeather>
where
    S: WeatherSource,
    C: WeatherCache,
{
    info!(
        zones = zones.len(),
        start = %settings.start,
        end = %settings.end,
        workers = settings.workers,
        "ingesting weather"
    );
    let mut results: Vec<(String, Result<ZoneWeather, FetchError>)> = stream::iter(zones)
        .map(|zone| async move {
            let request = WeatherRequest {
                zone_id: zone.id.clone(),
                lat: zone.centroid_lat,
                lon: zone.centroid_lon,
                start: settings.start,
                end: settings.end,
                tz: settings.tz,
            };
            let result = ingest_one(&request, source, cache, settings).await;
            (zone.id.clone(), result)
        })
        .buffer_unordered(settings.workers.max(1))
        .collect()
        .await;
    results.sort_by(|a, b| a.0.cmp(&b.0));

    let mut outcome = BatchOutcome::from_results(results);
    outcome.succeeded.sort_by(|a, b| a.zone_id.cmp(&b.zone_id));
    let cached = outcome.succeeded.iter().filter(|z| z.from_cache).count();
    for failure in &outcome.failed {
        warn!(zone = %failure.zone_id, reason = %failure.reason, "zone skipped");
    }
    info!(
        succeeded = outcome.succeeded.len(),
        from_cache = cached,
        skipped = outcome.failed.len(),
        "weather ingestion finished"
    );
    outcome
}

async fn ingest_one<S, C>(
    request: &WeatherRequest,
    source: &S,
    cache: &C,
    settings: &IngestSettings,
) -> Result<ZoneWeather, FetchError>
where
    S: WeatherSource,
    C: WeatherCache,
{
    let fingerprint = Fingerprint::of(request);
    let lookup = cache.lookup(&request.zone_id, &fingerprint).unwrap_or_else(|e| {
        warn!(zone = %request.zone_id, error = %e, "cache lookup failed");
        CacheLookup::Absent
    });

    let stale = lookup == CacheLookup::Stale;
    let (raw, from_cache) = match lookup {
        CacheLookup::Present(hours) => {
            debug!(zone = %request.zone_id, "cache hit");
            (hours, true)
        }
        CacheLookup::Absent | CacheLookup::Stale => {
            if stale {
                info!(zone = %request.zone_id, "cache entry stale, refetching");
            }
            let hours = fetch_with_retry(source, request, &settings.retry).await?;
            let entry = CacheEntry {
                fingerprint,
                hours,
            };
            if let Err(e) = cache.store(&request.zone_id, &entry) {
                warn!(zone = %request.zone_id, error = %e, "cache write failed");
            }
            (entry.hours, false)
        }
    };

    let hours = clean_series(&raw, &settings.cleaning);
    if hours.is_empty() {
        return Err(FetchError::Empty);
    }
    Ok(ZoneWeather {
        zone_id: request.zone_id.clone(),
        hours,
        from_cache,
    })
}
