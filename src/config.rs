//! TOML-based pipeline configuration.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::qa::QaThresholds;

/// Top-level pipeline configuration parsed from TOML.
///
/// All fields have defaults matching the Bengaluru baseline run. Load from
/// TOML with [`PipelineConfig::from_toml_file`] or use
/// [`PipelineConfig::default`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// City boundary resolution.
    pub boundary: BoundaryConfig,
    /// Square grid parameters.
    pub grid: GridConfig,
    /// Weather service, retry and cleaning parameters.
    pub weather: WeatherConfig,
    /// Reference PV system.
    pub pv: PvConfig,
    /// QA/QC thresholds.
    pub qa: QaThresholds,
    /// Output locations.
    pub output: OutputConfig,
}

/// City boundary resolution.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoundaryConfig {
    /// Place name passed to the geocoder.
    pub place: String,
    /// Local GeoJSON file used instead of the geocoder when set.
    pub geojson: Option<PathBuf>,
    /// Geocoder search endpoint.
    pub geocoder_url: String,
    /// User-Agent sent to the geocoder (required by Nominatim usage policy).
    pub user_agent: String,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            place: "Bengaluru, India".to_string(),
            geojson: None,
            geocoder_url: "https://nominatim.openstreetmap.org/search".to_string(),
            user_agent: "solar-zones/0.1".to_string(),
        }
    }
}

/// Square grid parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Cell edge length (km, projected).
    pub cell_km: f64,
    /// Fragments below this fraction of the nominal cell area are dropped.
    pub min_cell_fraction: f64,
    /// ZoneID prefix, e.g. `"BLR"` yields `"BLR-0001"`.
    pub zone_prefix: String,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_km: 2.0,
            min_cell_fraction: 0.01,
            zone_prefix: "BLR".to_string(),
        }
    }
}

/// Weather service, retry and cleaning parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeatherConfig {
    /// First local date to request (inclusive).
    pub start_date: NaiveDate,
    /// Last local date to request (inclusive); yesterday (UTC) when unset.
    pub end_date: Option<NaiveDate>,
    /// IANA time zone of the city; hours and dates are in its civil time.
    pub timezone: Tz,
    /// Hourly point endpoint.
    pub base_url: String,
    /// Total attempts per zone, first try included.
    pub max_attempts: u32,
    /// Backoff before the second attempt (ms); doubles per attempt.
    pub backoff_base_ms: u64,
    /// Upper bound of the random jitter added to each backoff (ms).
    pub jitter_ms: u64,
    /// Maximum requests in flight.
    pub workers: usize,
    /// Per-request timeout (s).
    pub timeout_secs: u64,
    /// Longest run of missing hours that is forward-filled.
    pub max_fill_hours: usize,
    /// Lower winsorization percentile (0.0-1.0).
    pub winsor_lower: f64,
    /// Upper winsorization percentile (0.0-1.0).
    pub winsor_upper: f64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            end_date: None,
            timezone: chrono_tz::Asia::Kolkata,
            base_url: "https://power.larc.nasa.gov/api/temporal/hourly/point".to_string(),
            max_attempts: 3,
            backoff_base_ms: 600,
            jitter_ms: 250,
            workers: 4,
            timeout_secs: 60,
            max_fill_hours: 3,
            winsor_lower: 0.01,
            winsor_upper: 0.99,
        }
    }
}

impl WeatherConfig {
    /// Resolved end date: the configured one, else yesterday in UTC.
    pub fn resolved_end_date(&self) -> NaiveDate {
        self.end_date
            .unwrap_or_else(|| (Utc::now() - Duration::days(1)).date_naive())
    }
}

/// Reference PV system parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PvConfig {
    /// Rated DC power (kW).
    pub system_kw_dc: f64,
    /// Surface tilt from horizontal (deg).
    pub surface_tilt: f64,
    /// Surface azimuth, clockwise from north (deg).
    pub surface_azimuth: f64,
    /// Ground reflectance.
    pub albedo: f64,
    /// DC temperature coefficient (1/°C).
    pub gamma_pdc: f64,
    /// Nominal inverter efficiency.
    pub inverter_eff: f64,
    /// Reference inverter efficiency of the part-load curve.
    pub inverter_eff_ref: f64,
    /// Inverter model: `"pvwatts"` (falls back when unusable) or `"constant"`.
    pub inverter: String,
    /// SAPM `a` coefficient.
    pub sapm_a: f64,
    /// SAPM `b` coefficient (s/m).
    pub sapm_b: f64,
    /// SAPM cell/module temperature difference at 1000 W/m² (°C).
    pub sapm_delta_t: f64,
    /// Minimum valid hourly readings for a day to be reported.
    pub min_hours_per_day: usize,
}

impl Default for PvConfig {
    fn default() -> Self {
        Self {
            system_kw_dc: 10.0,
            surface_tilt: 13.0,
            surface_azimuth: 180.0,
            albedo: 0.20,
            gamma_pdc: -0.004,
            inverter_eff: 0.96,
            inverter_eff_ref: 0.9637,
            inverter: "pvwatts".to_string(),
            sapm_a: -3.56,
            sapm_b: -0.075,
            sapm_delta_t: 3.0,
            min_hours_per_day: 20,
        }
    }
}

/// Output locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Root data directory; tables go to `processed/`, cache to `raw/weather/`.
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
        }
    }
}

impl OutputConfig {
    /// Directory holding the persisted stage tables.
    pub fn processed_dir(&self) -> PathBuf {
        self.dir.join("processed")
    }

    /// Directory holding the raw per-zone weather cache.
    pub fn weather_cache_dir(&self) -> PathBuf {
        self.dir.join("raw").join("weather")
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"grid.cell_km"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

impl PipelineConfig {
    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: &str| {
            errors.push(ConfigError {
                field: field.into(),
                message: message.into(),
            });
        };

        if self.boundary.place.trim().is_empty() && self.boundary.geojson.is_none() {
            push("boundary.place", "must be set when boundary.geojson is absent");
        }

        let g = &self.grid;
        if !(g.cell_km > 0.0) {
            push("grid.cell_km", "must be > 0");
        }
        if !(0.0..1.0).contains(&g.min_cell_fraction) {
            push("grid.min_cell_fraction", "must be in [0.0, 1.0)");
        }
        if g.zone_prefix.trim().is_empty() {
            push("grid.zone_prefix", "must not be empty");
        }

        let w = &self.weather;
        if let Some(end) = w.end_date {
            if end < w.start_date {
                push("weather.end_date", "must be >= weather.start_date");
            }
        }
        if w.max_attempts == 0 {
            push("weather.max_attempts", "must be > 0");
        }
        if w.workers == 0 {
            push("weather.workers", "must be > 0");
        }
        if !(0.0..=1.0).contains(&w.winsor_lower)
            || !(0.0..=1.0).contains(&w.winsor_upper)
            || w.winsor_lower >= w.winsor_upper
        {
            push(
                "weather.winsor_lower",
                "percentiles must satisfy 0 <= lower < upper <= 1",
            );
        }

        let pv = &self.pv;
        if !(pv.system_kw_dc > 0.0) {
            push("pv.system_kw_dc", "must be > 0");
        }
        if !(0.0..=90.0).contains(&pv.surface_tilt) {
            push("pv.surface_tilt", "must be in [0, 90]");
        }
        if !(0.0..360.0).contains(&pv.surface_azimuth) {
            push("pv.surface_azimuth", "must be in [0, 360)");
        }
        if !(0.0..=1.0).contains(&pv.albedo) {
            push("pv.albedo", "must be in [0.0, 1.0]");
        }
        if !(pv.inverter_eff > 0.0 && pv.inverter_eff <= 1.0) {
            push("pv.inverter_eff", "must be in (0.0, 1.0]");
        }
        if pv.inverter != "pvwatts" && pv.inverter != "constant" {
            push("pv.inverter", "must be \"pvwatts\" or \"constant\"");
        }
        if pv.min_hours_per_day == 0 || pv.min_hours_per_day > 24 {
            push("pv.min_hours_per_day", "must be in [1, 24]");
        }

        let qa = &self.qa;
        if qa.cap_factor_lo > qa.cap_factor_hi {
            push("qa.cap_factor_lo", "must be <= qa.cap_factor_hi");
        }
        if qa.mean_kwh_lo > qa.mean_kwh_hi {
            push("qa.mean_kwh_lo", "must be <= qa.mean_kwh_hi");
        }

        errors
    }
}
