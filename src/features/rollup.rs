//! City-wide daily rollup and the per-zone annual suitability table.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::rolling::FeatureRecord;
use crate::grid::Region;
use crate::qa::ZoneYearStat;
use crate::stats::{mean, median, quantile_linear};

/// Distribution of zone energies on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRollup {
    /// Local date.
    pub date: NaiveDate,
    /// Zones with a record that day.
    pub n_zones: usize,
    /// Mean energy (kWh).
    pub mean_kwh: f64,
    /// Median energy (kWh).
    pub median_kwh: f64,
    /// 5th percentile (kWh).
    pub p05_kwh: f64,
    /// 95th percentile (kWh).
    pub p95_kwh: f64,
    /// Minimum (kWh).
    pub min_kwh: f64,
    /// Maximum (kWh).
    pub max_kwh: f64,
}

/// Aggregates feature rows by date.
pub fn city_rollup(features: &[FeatureRecord]) -> Vec<CityRollup> {
    let mut by_date: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for f in features {
        by_date.entry(f.date).or_default().push(f.energy_kwh);
    }
    by_date
        .into_iter()
        .filter_map(|(date, values)| {
            Some(CityRollup {
                date,
                n_zones: values.len(),
                mean_kwh: mean(&values)?,
                median_kwh: median(&values)?,
                p05_kwh: quantile_linear(&values, 0.05)?,
                p95_kwh: quantile_linear(&values, 0.95)?,
                min_kwh: values.iter().copied().fold(f64::INFINITY, f64::min),
                max_kwh: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            })
        })
        .collect()
}

/// Annual yield and relative suitability of one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneAnnualRecord {
    /// Zone identifier.
    #[serde(rename = "ZoneID")]
    pub zone_id: String,
    /// Compass octant, when the zone is known to the grid.
    pub region: Option<Region>,
    /// Mean annual energy over full years, or over all years when none is full (kWh).
    pub annual_kwh: f64,
    /// `annual_kwh` per rated kW.
    pub annual_kwh_per_kw: f64,
    /// Min-max scaled `annual_kwh_per_kw`, rounded; 100 when all zones tie.
    pub score_0_100: u8,
}

/// Builds the suitability table from QA zone-year detail.
///
/// # Arguments
///
/// * `detail` - Zone-year statistics
/// * `regions` - Region label per ZoneID
/// * `rated_kw` - Rated DC power of the reference system
pub fn zone_annual(
    detail: &[ZoneYearStat],
    regions: &BTreeMap<String, Region>,
    rated_kw: f64,
) -> Vec<ZoneAnnualRecord> {
    let mut by_zone: BTreeMap<&str, Vec<&ZoneYearStat>> = BTreeMap::new();
    for s in detail {
        by_zone.entry(s.zone_id.as_str()).or_default().push(s);
    }

    let annual: Vec<(&str, f64)> = by_zone
        .into_iter()
        .filter_map(|(zone, years)| {
            let full: Vec<f64> = years.iter().filter(|s| s.is_full_year).map(|s| s.annual_kwh).collect();
            let kwh = if full.is_empty() {
                let all: Vec<f64> = years.iter().map(|s| s.annual_kwh).collect();
                mean(&all)?
            } else {
                mean(&full)?
            };
            Some((zone, kwh))
        })
        .collect();

    let per_kw: Vec<f64> = annual.iter().map(|(_, kwh)| kwh / rated_kw).collect();
    let lo = per_kw.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = per_kw.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    annual
        .into_iter()
        .zip(per_kw)
        .map(|((zone, kwh), kwh_per_kw)| {
            let score = if hi > lo {
                ((kwh_per_kw - lo) / (hi - lo) * 100.0).round()
            } else {
                100.0
            };
            ZoneAnnualRecord {
                zone_id: zone.to_string(),
                region: regions.get(zone).copied(),
                annual_kwh: kwh,
                annual_kwh_per_kw: kwh_per_kw,
                score_0_100: score.clamp(0.0, 100.0) as u8,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::rolling::zone_features;

    fn stat(zone: &str, year: i32, annual: f64, full: bool) -> ZoneYearStat {
        ZoneYearStat {
            zone_id: zone.to_string(),
            year,
            days: if full { 365 } else { 100 },
            zero_days: 0,
            annual_kwh: annual,
            cap_factor: annual / 87_600.0,
            mean_kwh: annual / 365.0,
            p5_kwh: 0.0,
            p95_kwh: 0.0,
            is_full_year: full,
            ok_days: full,
            ok_zero_days: true,
            ok_cf: true,
            ok_mean: true,
            qa_pass_year: full,
        }
    }

    #[test]
    fn rollup_per_date() {
        let d = NaiveDate::from_ymd_opt(2023, 5, 1).unwrap();
        let mut rows = zone_features("A", &[(d, 10.0)]);
        rows.extend(zone_features("B", &[(d, 20.0)]));
        rows.extend(zone_features("C", &[(d, 30.0), (d.succ_opt().unwrap(), 5.0)]));
        let r = city_rollup(&rows);
        assert_eq!(r.len(), 2);
        assert_eq!(r[0].n_zones, 3);
        assert_eq!(r[0].mean_kwh, 20.0);
        assert_eq!(r[0].median_kwh, 20.0);
        assert_eq!((r[0].min_kwh, r[0].max_kwh), (10.0, 30.0));
        assert!((r[0].p05_kwh - 11.0).abs() < 1e-9);
        assert!((r[0].p95_kwh - 29.0).abs() < 1e-9);
        assert_eq!(r[1].n_zones, 1);
    }

    #[test]
    fn annual_prefers_full_years_and_scores() {
        let detail = vec![
            stat("A", 2022, 14_000.0, true),
            stat("A", 2023, 16_000.0, true),
            stat("A", 2024, 1_000.0, false),
            stat("B", 2023, 12_000.0, true),
            stat("C", 2023, 5_000.0, false),
        ];
        let regions = BTreeMap::from([("A".to_string(), Region::N), ("B".to_string(), Region::S)]);
        let t = zone_annual(&detail, &regions, 10.0);
        assert_eq!(t.len(), 3);
        assert_eq!(t[0].annual_kwh, 15_000.0);
        assert_eq!(t[0].annual_kwh_per_kw, 1_500.0);
        assert_eq!(t[0].score_0_100, 100);
        assert_eq!(t[0].region, Some(Region::N));
        // partial-only zone uses its partial years
        assert_eq!(t[2].annual_kwh, 5_000.0);
        assert_eq!(t[2].score_0_100, 0);
        assert_eq!(t[2].region, None);
        // (1200 - 500) / (1500 - 500) = 70
        assert_eq!(t[1].score_0_100, 70);
    }

    #[test]
    fn single_zone_scores_full() {
        let t = zone_annual(&[stat("A", 2023, 10_000.0, true)], &BTreeMap::new(), 10.0);
        assert_eq!(t[0].score_0_100, 100);
    }
}
