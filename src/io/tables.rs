//! CSV persistence for stage tables.
//!
//! Every table is written with a header row derived from its record type and
//! read back only after its header has been checked for required columns.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::weather::{WeatherHour, ZoneWeather};

/// File names under the processed directory.
pub mod names {
    /// Zone geometries.
    pub const ZONES: &str = "zones.geojson";
    /// Cleaned hourly weather.
    pub const WEATHER_HOURLY: &str = "weather_hourly.csv";
    /// Daily AC energy.
    pub const DAILY_ENERGY: &str = "daily_energy.csv";
    /// QA zone-year detail.
    pub const QA_DETAIL: &str = "qa_detail.csv";
    /// QA zone summary.
    pub const QA_SUMMARY: &str = "qa_summary.csv";
    /// Daily features.
    pub const FEATURES: &str = "features.csv";
    /// City rollup.
    pub const CITY_ROLLUP: &str = "city_rollup.csv";
    /// Zone suitability table.
    pub const ZONE_ANNUAL: &str = "zone_annual.csv";
}

/// Columns a reader needs, per table.
pub mod columns {
    /// `weather_hourly.csv`.
    pub const WEATHER_HOURLY: &[&str] = &["ZoneID", "ts", "ghi_whm2", "t2m_c", "ws10_ms"];
    /// `daily_energy.csv`.
    pub const DAILY_ENERGY: &[&str] = &["ZoneID", "date", "energy_kwh"];
    /// `qa_detail.csv`.
    pub const QA_DETAIL: &[&str] = &[
        "ZoneID",
        "year",
        "days",
        "zero_days",
        "annual_kwh",
        "cap_factor",
        "mean_kwh",
        "p5_kwh",
        "p95_kwh",
        "is_full_year",
        "ok_days",
        "ok_zero_days",
        "ok_cf",
        "ok_mean",
        "qa_pass_year",
    ];
    /// `qa_summary.csv`.
    pub const QA_SUMMARY: &[&str] = &[
        "ZoneID",
        "status",
        "qa_pass_zone",
        "n_years",
        "n_full_years",
        "n_full_pass",
        "latest_full_year",
        "latest_full_year_pass",
    ];
    /// `features.csv`.
    pub const FEATURES: &[&str] = &["ZoneID", "date", "energy_kwh"];
}

/// One row of `weather_hourly.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyWeatherRecord {
    /// Zone identifier.
    #[serde(rename = "ZoneID")]
    pub zone_id: String,
    /// Local timestamp.
    pub ts: NaiveDateTime,
    /// Irradiance (Wh/m²).
    pub ghi_whm2: Option<f64>,
    /// Air temperature (°C).
    pub t2m_c: Option<f64>,
    /// Wind speed (m/s).
    pub ws10_ms: Option<f64>,
}

/// Flattens per-zone series into table rows.
pub fn weather_rows(zones: &[ZoneWeather]) -> Vec<HourlyWeatherRecord> {
    zones
        .iter()
        .flat_map(|z| {
            z.hours.iter().map(|h| HourlyWeatherRecord {
                zone_id: z.zone_id.clone(),
                ts: h.ts,
                ghi_whm2: h.ghi_whm2,
                t2m_c: h.t2m_c,
                ws10_ms: h.ws10_ms,
            })
        })
        .collect()
}

/// Groups table rows back into per-zone series, sorted by timestamp.
pub fn group_weather(rows: Vec<HourlyWeatherRecord>) -> BTreeMap<String, Vec<WeatherHour>> {
    let mut by_zone: BTreeMap<String, Vec<WeatherHour>> = BTreeMap::new();
    for r in rows {
        by_zone.entry(r.zone_id).or_default().push(WeatherHour {
            ts: r.ts,
            ghi_whm2: r.ghi_whm2,
            t2m_c: r.t2m_c,
            ws10_ms: r.ws10_ms,
        });
    }
    for hours in by_zone.values_mut() {
        hours.sort_by_key(|h| h.ts);
    }
    by_zone
}

/// Writes `rows` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be created or a row fails to serialize.
pub fn write_table<T: Serialize>(rows: &[T], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    write_rows(rows, io::BufWriter::new(file))
}

/// Writes `rows` as CSV to any writer.
///
/// The header comes from the first row, so an empty table is an empty file;
/// [`read_rows`] reads it back as zero rows.
///
/// # Errors
///
/// Returns an error if writing or serialization fails.
pub fn write_rows<T: Serialize>(rows: &[T], writer: impl Write) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reads a table after checking its header for `required` columns.
///
/// An empty file is a table with no rows.
///
/// # Errors
///
/// [`PipelineError::Schema`] when the file is missing or lacks a column;
/// CSV errors for malformed rows.
pub fn read_table<T: DeserializeOwned>(path: &Path, required: &[&str]) -> Result<Vec<T>> {
    let file = File::open(path).map_err(|e| PipelineError::Schema {
        path: path.to_path_buf(),
        message: format!("cannot open table: {e}"),
    })?;
    read_rows(file, required).map_err(|e| match e {
        PipelineError::Schema { message, .. } => PipelineError::Schema {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    })
}

/// Reads CSV rows from any reader after the header check.
///
/// # Errors
///
/// See [`read_table`]; schema errors carry an empty path.
pub fn read_rows<T: DeserializeOwned>(reader: impl io::Read, required: &[&str]) -> Result<Vec<T>> {
    let mut rdr = csv::ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();
    if headers.is_empty() {
        return Ok(Vec::new());
    }
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::Schema {
            path: Default::default(),
            message: format!("missing columns: {}", missing.join(", ")),
        });
    }
    rdr.deserialize()
        .collect::<std::result::Result<Vec<T>, csv::Error>>()
        .map_err(PipelineError::from)
}
