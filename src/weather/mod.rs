//! Hourly weather ingestion, caching and cleaning.

pub mod cache;
pub mod clean;
pub mod ingest;
pub mod source;

pub use cache::{CacheEntry, CacheLookup, FileCache, Fingerprint, MemoryCache, WeatherCache};
pub use clean::{CleaningParams, clean_series};
pub use ingest::{IngestSettings, RetryPolicy, ZoneWeather, fetch_with_retry, ingest_zones};
pub use source::{
    ClearSkySource, FetchError, PowerApiSource, WeatherHour, WeatherRequest, WeatherSource,
};
