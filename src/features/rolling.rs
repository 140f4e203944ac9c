//! Per zone-day calendar, rolling-window and climatology features.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::pv::DailyEnergyRecord;
use crate::qa::{ZoneQaSummary, passing_zones};
use crate::stats::{mean, std_population};

/// Rolling windows count rows, not calendar days.
const ROLL7_WINDOW: usize = 7;
const ROLL7_MIN: usize = 3;
const ROLL30_WINDOW: usize = 30;
const ROLL30_MIN: usize = 10;

/// Features for one zone-day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Zone identifier.
    #[serde(rename = "ZoneID")]
    pub zone_id: String,
    /// Local date.
    pub date: NaiveDate,
    /// Daily AC energy (kWh).
    pub energy_kwh: f64,
    /// Calendar year.
    pub year: i32,
    /// Month, 1-12.
    pub month: u32,
    /// Day of year, 1-366.
    pub doy: u32,
    /// Day of week, Monday = 0.
    pub dow: u32,
    /// Saturday or Sunday.
    pub is_weekend: bool,
    /// Mean of the last 7 rows (at least 3).
    pub roll7_mean: Option<f64>,
    /// Population std of the last 7 rows (at least 3).
    pub roll7_std: Option<f64>,
    /// `(energy - roll7_mean) / roll7_std`; absent when std is zero or absent.
    pub roll7_z: Option<f64>,
    /// Mean of the last 30 rows (at least 10).
    pub roll30_mean: Option<f64>,
    /// Zone mean for this calendar month across all years.
    pub clim_month_kwh: f64,
    /// `energy_kwh - clim_month_kwh`.
    pub anom_month_kwh: f64,
}

/// Keeps records of QA-passing zones.
///
/// Falls back to every zone, with a warning, when there is no QA summary or
/// no zone passes.
pub fn select_zones(records: Vec<DailyEnergyRecord>, qa: Option<&[ZoneQaSummary]>) -> Vec<DailyEnergyRecord> {
    let good: BTreeSet<String> = qa.map(passing_zones).unwrap_or_default();
    if good.is_empty() {
        warn!("no QA list found or no zones passed; using all zones");
        return records;
    }
    let selected: Vec<DailyEnergyRecord> = records
        .into_iter()
        .filter(|r| good.contains(&r.zone_id))
        .collect();
    info!(zones = good.len(), rows = selected.len(), "zones passing QA selected");
    selected
}

/// Builds features for every zone, in parallel, sorted by zone then date.
///
/// Non-finite energies are dropped; duplicate dates keep the last record.
pub fn build_features(records: &[DailyEnergyRecord]) -> Vec<FeatureRecord> {
    let mut by_zone: BTreeMap<&str, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    for r in records.iter().filter(|r| r.energy_kwh.is_finite()) {
        by_zone
            .entry(r.zone_id.as_str())
            .or_default()
            .insert(r.date, r.energy_kwh);
    }
    let zones: Vec<(&str, Vec<(NaiveDate, f64)>)> = by_zone
        .into_iter()
        .map(|(zone, days)| (zone, days.into_iter().collect()))
        .collect();

    let per_zone: Vec<Vec<FeatureRecord>> = zones
        .par_iter()
        .map(|(zone, days)| zone_features(zone, days))
        .collect();
    per_zone.into_iter().flatten().collect()
}

/// Features for one zone's date-sorted series.
pub fn zone_features(zone_id: &str, days: &[(NaiveDate, f64)]) -> Vec<FeatureRecord> {
    let energy: Vec<f64> = days.iter().map(|(_, e)| *e).collect();
    let roll7_mean = rolling(&energy, ROLL7_WINDOW, ROLL7_MIN, mean);
    let roll7_std = rolling(&energy, ROLL7_WINDOW, ROLL7_MIN, std_population);
    let roll30_mean = rolling(&energy, ROLL30_WINDOW, ROLL30_MIN, mean);

    let mut month_sums: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for (date, e) in days {
        let m = month_sums.entry(date.month()).or_insert((0.0, 0));
        m.0 += e;
        m.1 += 1;
    }

    days.iter()
        .enumerate()
        .map(|(i, (date, e))| {
            let clim = month_sums
                .get(&date.month())
                .map_or(*e, |(sum, n)| sum / *n as f64);
            let dow = date.weekday().num_days_from_monday();
            let z = match (roll7_mean[i], roll7_std[i]) {
                (Some(m), Some(s)) if s > 0.0 => Some((e - m) / s),
                _ => None,
            };
            FeatureRecord {
                zone_id: zone_id.to_string(),
                date: *date,
                energy_kwh: *e,
                year: date.year(),
                month: date.month(),
                doy: date.ordinal(),
                dow,
                is_weekend: dow >= 5,
                roll7_mean: roll7_mean[i],
                roll7_std: roll7_std[i],
                roll7_z: z,
                roll30_mean: roll30_mean[i],
                clim_month_kwh: clim,
                anom_month_kwh: e - clim,
            }
        })
        .collect()
}

/// Trailing window statistic over the last `window` values ending at each
/// position; `None` where fewer than `min_periods` values are available.
pub fn rolling(
    values: &[f64],
    window: usize,
    min_periods: usize,
    stat: fn(&[f64]) -> Option<f64>,
) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            if slice.len() < min_periods {
                None
            } else {
                stat(slice)
            }
        })
        .collect()
}
