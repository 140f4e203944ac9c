//! Per-zone raw weather cache keyed by ZoneID.
//!
//! Each entry stores the request fingerprint next to the raw series so a
//! changed location or date range is detected as [`CacheLookup::Stale`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::source::{WeatherHour, WeatherRequest};
use crate::error::Result;

/// The parts of a request that determine its response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Latitude (deg).
    pub lat: f64,
    /// Longitude (deg).
    pub lon: f64,
    /// First date.
    pub start: NaiveDate,
    /// Last date.
    pub end: NaiveDate,
    /// Time zone the cached timestamps are in.
    pub tz: Tz,
}

impl Fingerprint {
    /// Coordinates closer than this are the same point (deg).
    const COORD_TOLERANCE: f64 = 1e-6;

    /// Fingerprint of a request.
    pub fn of(request: &WeatherRequest) -> Self {
        Self {
            lat: request.lat,
            lon: request.lon,
            start: request.start,
            end: request.end,
            tz: request.tz,
        }
    }

    /// Whether a cached entry with this fingerprint answers `other`.
    pub fn matches(&self, other: &Fingerprint) -> bool {
        (self.lat - other.lat).abs() < Self::COORD_TOLERANCE
            && (self.lon - other.lon).abs() < Self::COORD_TOLERANCE
            && self.start == other.start
            && self.end == other.end
            && self.tz == other.tz
    }
}

/// A stored raw series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request that produced `hours`.
    pub fingerprint: Fingerprint,
    /// Uncleaned series.
    pub hours: Vec<WeatherHour>,
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// A matching raw series.
    Present(Vec<WeatherHour>),
    /// Nothing stored for the zone.
    Absent,
    /// An entry exists but was made for a different request.
    Stale,
}

/// Store of raw series keyed by ZoneID.
pub trait WeatherCache: Sync {
    /// Looks up `zone_id` for a request with fingerprint `fingerprint`.
    ///
    /// # Errors
    ///
    /// Storage failures other than a missing entry.
    fn lookup(&self, zone_id: &str, fingerprint: &Fingerprint) -> Result<CacheLookup>;

    /// Stores (or replaces) the entry for `zone_id`.
    ///
    /// # Errors
    ///
    /// Storage write failures.
    fn store(&self, zone_id: &str, entry: &CacheEntry) -> Result<()>;
}

/// JSON files at `<dir>/<ZoneID>.json`.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Creates a cache rooted at `dir`; the directory is created on first store.
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// Path of the entry for `zone_id`.
    pub fn entry_path(&self, zone_id: &str) -> PathBuf {
        self.dir.join(format!("{zone_id}.json"))
    }
}

impl WeatherCache for FileCache {
    fn lookup(&self, zone_id: &str, fingerprint: &Fingerprint) -> Result<CacheLookup> {
        let path = self.entry_path(zone_id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CacheLookup::Absent),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => Ok(classify(entry, fingerprint)),
            Err(e) => {
                warn!(zone = zone_id, error = %e, "unreadable cache entry, refetching");
                Ok(CacheLookup::Stale)
            }
        }
    }

    fn store(&self, zone_id: &str, entry: &CacheEntry) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(zone_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(entry)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-process cache for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored zones.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WeatherCache for MemoryCache {
    fn lookup(&self, zone_id: &str, fingerprint: &Fingerprint) -> Result<CacheLookup> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| std::io::Error::other("memory cache poisoned"))?;
        Ok(match entries.get(zone_id) {
            Some(entry) => classify(entry.clone(), fingerprint),
            None => CacheLookup::Absent,
        })
    }

    fn store(&self, zone_id: &str, entry: &CacheEntry) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| std::io::Error::other("memory cache poisoned"))?
            .insert(zone_id.to_string(), entry.clone());
        Ok(())
    }
}

fn classify(entry: CacheEntry, fingerprint: &Fingerprint) -> CacheLookup {
    if entry.fingerprint.matches(fingerprint) {
        CacheLookup::Present(entry.hours)
    } else {
        CacheLookup::Stale
    }
}
