//! Zone-year quality checks on daily energy and the zone-level verdict.
//!
//! A zone-year passes when it has enough days, few zero-energy days, and a
//! plausible capacity factor and daily mean. A zone passes when **any** of
//! its full years passes; partial years are reported but never count for or
//! against the zone, so a zone without a full year is
//! [`QaStatus::Undetermined`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::pv::DailyEnergyRecord;
use crate::stats::{mean, quantile_linear};

/// Thresholds for the zone-year rules.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QaThresholds {
    /// Days with data for a year to count as full.
    pub full_year_min_days: u32,
    /// Minimum days with data.
    pub min_days: u32,
    /// Maximum zero-energy days.
    pub max_zero_days: u32,
    /// Energy at or below which a day counts as zero (kWh).
    pub zero_energy_kwh: f64,
    /// Lowest plausible capacity factor.
    pub cap_factor_lo: f64,
    /// Highest plausible capacity factor.
    pub cap_factor_hi: f64,
    /// Lowest plausible mean daily energy (kWh).
    pub mean_kwh_lo: f64,
    /// Highest plausible mean daily energy (kWh).
    pub mean_kwh_hi: f64,
}

impl Default for QaThresholds {
    fn default() -> Self {
        Self {
            full_year_min_days: 360,
            min_days: 330,
            max_zero_days: 40,
            zero_energy_kwh: 0.01,
            cap_factor_lo: 0.12,
            cap_factor_hi: 0.28,
            mean_kwh_lo: 5.0,
            mean_kwh_hi: 60.0,
        }
    }
}

/// Aggregates and rule outcomes for one zone-year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneYearStat {
    /// Zone identifier.
    #[serde(rename = "ZoneID")]
    pub zone_id: String,
    /// Calendar year.
    pub year: i32,
    /// Distinct dates with energy.
    pub days: u32,
    /// Days at or below the zero threshold.
    pub zero_days: u32,
    /// Sum of daily energy (kWh).
    pub annual_kwh: f64,
    /// `annual_kwh / (rated_kw * 24 * 365)`.
    pub cap_factor: f64,
    /// Mean daily energy (kWh).
    pub mean_kwh: f64,
    /// 5th percentile of daily energy (kWh).
    pub p5_kwh: f64,
    /// 95th percentile of daily energy (kWh).
    pub p95_kwh: f64,
    /// Enough days to take part in the zone verdict.
    pub is_full_year: bool,
    /// `days >= min_days`.
    pub ok_days: bool,
    /// `zero_days <= max_zero_days`.
    pub ok_zero_days: bool,
    /// Capacity factor within bounds.
    pub ok_cf: bool,
    /// Mean daily energy within bounds.
    pub ok_mean: bool,
    /// All four rules hold.
    pub qa_pass_year: bool,
}

/// Zone verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QaStatus {
    /// At least one full year passes.
    Pass,
    /// Full years exist and none passes.
    Fail,
    /// No full year to judge.
    Undetermined,
}

impl QaStatus {
    /// `Some(true)` for pass, `Some(false)` for fail, `None` otherwise.
    pub fn as_flag(self) -> Option<bool> {
        match self {
            Self::Pass => Some(true),
            Self::Fail => Some(false),
            Self::Undetermined => None,
        }
    }
}

impl fmt::Display for QaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Undetermined => "undetermined",
        };
        f.write_str(s)
    }
}

/// Zone-level QA summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneQaSummary {
    /// Zone identifier.
    #[serde(rename = "ZoneID")]
    pub zone_id: String,
    /// Verdict.
    pub status: QaStatus,
    /// Verdict as a nullable flag.
    pub qa_pass_zone: Option<bool>,
    /// Years with any data.
    pub n_years: u32,
    /// Full years.
    pub n_full_years: u32,
    /// Passing full years.
    pub n_full_pass: u32,
    /// Most recent full year.
    pub latest_full_year: Option<i32>,
    /// Whether that year passed.
    pub latest_full_year_pass: Option<bool>,
}

/// Per zone-year detail plus per-zone summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QaReport {
    /// Sorted by zone, then year.
    pub detail: Vec<ZoneYearStat>,
    /// Sorted by zone.
    pub summary: Vec<ZoneQaSummary>,
}

impl QaReport {
    /// Zones whose verdict is [`QaStatus::Pass`].
    pub fn passing_zones(&self) -> BTreeSet<String> {
        passing_zones(&self.summary)
    }
}

/// Zones whose summary says pass.
pub fn passing_zones(summary: &[ZoneQaSummary]) -> BTreeSet<String> {
    summary
        .iter()
        .filter(|s| s.status == QaStatus::Pass)
        .map(|s| s.zone_id.clone())
        .collect()
}

/// Classifies daily energy records.
///
/// # Arguments
///
/// * `records` - Daily energy for any number of zones
/// * `rated_kw` - Rated DC power of the reference system
/// * `th` - Rule thresholds
pub fn classify(records: &[DailyEnergyRecord], rated_kw: f64, th: &QaThresholds) -> QaReport {
    let detail = zone_year_stats(records, rated_kw, th);
    let summary = summarize_zones(&detail);

    let count = |st: QaStatus| summary.iter().filter(|s| s.status == st).count();
    let undetermined = count(QaStatus::Undetermined);
    info!(
        zones = summary.len(),
        pass = count(QaStatus::Pass),
        fail = count(QaStatus::Fail),
        undetermined,
        "QA classification finished"
    );
    if undetermined > 0 {
        warn!(undetermined, "zones without a full year neither pass nor fail");
    }
    QaReport { detail, summary }
}

/// Aggregates and evaluates each zone-year.
pub fn zone_year_stats(records: &[DailyEnergyRecord], rated_kw: f64, th: &QaThresholds) -> Vec<ZoneYearStat> {
    // (zone, year) -> date -> energy; a BTreeMap keeps one value per date
    let mut groups: BTreeMap<(&str, i32), BTreeMap<chrono::NaiveDate, f64>> = BTreeMap::new();
    for r in records {
        groups
            .entry((r.zone_id.as_str(), r.date.year()))
            .or_default()
            .insert(r.date, r.energy_kwh);
    }

    groups
        .into_iter()
        .map(|((zone_id, year), by_date)| {
            let energies: Vec<f64> = by_date.into_values().collect();
            let days = energies.len() as u32;
            let zero_days = energies.iter().filter(|e| **e <= th.zero_energy_kwh).count() as u32;
            let annual_kwh: f64 = energies.iter().sum();
            let cap_factor = annual_kwh / (rated_kw * 24.0 * 365.0);
            let mean_kwh = mean(&energies).unwrap_or(0.0);

            let ok_days = days >= th.min_days;
            let ok_zero_days = zero_days <= th.max_zero_days;
            let ok_cf = (th.cap_factor_lo..=th.cap_factor_hi).contains(&cap_factor);
            let ok_mean = (th.mean_kwh_lo..=th.mean_kwh_hi).contains(&mean_kwh);
            ZoneYearStat {
                zone_id: zone_id.to_string(),
                year,
                days,
                zero_days,
                annual_kwh,
                cap_factor,
                mean_kwh,
                p5_kwh: quantile_linear(&energies, 0.05).unwrap_or(0.0),
                p95_kwh: quantile_linear(&energies, 0.95).unwrap_or(0.0),
                is_full_year: days >= th.full_year_min_days,
                ok_days,
                ok_zero_days,
                ok_cf,
                ok_mean,
                qa_pass_year: ok_days && ok_zero_days && ok_cf && ok_mean,
            }
        })
        .collect()
}

/// Folds zone-year stats into one verdict per zone.
pub fn summarize_zones(stats: &[ZoneYearStat]) -> Vec<ZoneQaSummary> {
    let mut by_zone: BTreeMap<&str, Vec<&ZoneYearStat>> = BTreeMap::new();
    for s in stats {
        by_zone.entry(s.zone_id.as_str()).or_default().push(s);
    }

    by_zone
        .into_iter()
        .map(|(zone_id, years)| {
            let full: Vec<&ZoneYearStat> = years.iter().copied().filter(|s| s.is_full_year).collect();
            let n_full_pass = full.iter().filter(|s| s.qa_pass_year).count() as u32;
            let status = if full.is_empty() {
                QaStatus::Undetermined
            } else if n_full_pass > 0 {
                QaStatus::Pass
            } else {
                QaStatus::Fail
            };
            let latest = full.iter().max_by_key(|s| s.year);
            let n_years = years.iter().map(|s| s.year).collect::<BTreeSet<_>>().len() as u32;
            ZoneQaSummary {
                zone_id: zone_id.to_string(),
                status,
                qa_pass_zone: status.as_flag(),
                n_years,
                n_full_years: full.len() as u32,
                n_full_pass,
                latest_full_year: latest.map(|s| s.year),
                latest_full_year_pass: latest.map(|s| s.qa_pass_year),
            }
        })
        .collect()
}
