//! Shared test fixtures for integration tests.

use std::path::PathBuf;

use chrono::{Duration, NaiveDate};
use geo::{Coord, LineString, MultiPolygon, Polygon};

use solar_zones::config::PipelineConfig;
use solar_zones::grid::StaticBoundary;
use solar_zones::grid::projection::{to_geographic, to_mercator};
use solar_zones::weather::{ClearSkySource, FetchError, WeatherHour, WeatherRequest, WeatherSource};

/// Zone whose weather is cut short by [`TruncatingSource`].
pub const SHORT_ZONE: &str = "T-0004";

/// Days of weather served for [`SHORT_ZONE`].
pub const SHORT_ZONE_DAYS: i64 = 200;

/// Zone whose weather fetch always fails in [`UnreachableZoneSource`].
pub const DOWN_ZONE: &str = "T-0003";

/// Square boundary of `km` x `km` in projected metres, anchored in Bengaluru.
pub fn square_boundary(km: f64) -> StaticBoundary {
    let o = to_mercator(Coord { x: 77.5, y: 12.9 });
    let d = km * 1000.0;
    let ring: Vec<Coord<f64>> = [(0.0, 0.0), (d, 0.0), (d, d), (0.0, d), (0.0, 0.0)]
        .iter()
        .map(|(dx, dy)| to_geographic(Coord { x: o.x + dx, y: o.y + dy }))
        .collect();
    StaticBoundary(MultiPolygon::new(vec![Polygon::new(LineString::new(ring), vec![])]))
}

/// Fresh, empty output directory unique to `name`.
pub fn output_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("solar-zones-it-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Two calendar years of weather over 2 km cells, no retry delays.
pub fn two_year_config(out: PathBuf) -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.grid.cell_km = 2.0;
    cfg.grid.zone_prefix = "T".to_string();
    cfg.weather.start_date = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
    cfg.weather.end_date = Some(NaiveDate::from_ymd_opt(2022, 12, 31).unwrap());
    cfg.weather.backoff_base_ms = 0;
    cfg.weather.jitter_ms = 0;
    cfg.output.dir = out;
    cfg
}

/// Clear-sky weather, except [`SHORT_ZONE`] which only gets its first
/// [`SHORT_ZONE_DAYS`] days.
#[derive(Debug, Default)]
pub struct TruncatingSource {
    inner: ClearSkySource,
}

impl WeatherSource for TruncatingSource {
    async fn fetch(&self, request: &WeatherRequest) -> Result<Vec<WeatherHour>, FetchError> {
        let mut hours = self.inner.fetch(request).await?;
        if request.zone_id == SHORT_ZONE {
            let cutoff = request.start + Duration::days(SHORT_ZONE_DAYS);
            hours.retain(|h| h.ts.date() < cutoff);
        }
        Ok(hours)
    }
}

/// Clear-sky weather, except [`DOWN_ZONE`] whose every fetch is a network
/// error.
#[derive(Debug, Default)]
pub struct UnreachableZoneSource {
    inner: ClearSkySource,
}

impl WeatherSource for UnreachableZoneSource {
    async fn fetch(&self, request: &WeatherRequest) -> Result<Vec<WeatherHour>, FetchError> {
        if request.zone_id == DOWN_ZONE {
            return Err(FetchError::Network("connection refused".to_string()));
        }
        self.inner.fetch(request).await
    }
}
