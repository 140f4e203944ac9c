//! Hourly weather to daily AC energy, per zone and across zones.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use chrono_tz::Tz;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::inverter::{InverterModel, select_inverter};
use super::module::{SapmParams, pvwatts_dc};
use super::solar::{Plane, erbs, sun_position};
use crate::batch::BatchOutcome;
use crate::config::PvConfig;
use crate::grid::Zone;
use crate::weather::WeatherHour;

/// Energy produced by one zone on one local date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEnergyRecord {
    /// Zone identifier.
    #[serde(rename = "ZoneID")]
    pub zone_id: String,
    /// Local civil date.
    pub date: NaiveDate,
    /// AC energy (kWh).
    pub energy_kwh: f64,
}

/// Why a zone could not be simulated.
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// Centroid outside valid latitude/longitude ranges.
    InvalidCoordinates {
        /// Latitude (deg).
        lat: f64,
        /// Longitude (deg).
        lon: f64,
    },
    /// No weather rows for the zone.
    EmptySeries,
    /// Solar position could not be computed.
    SolarPosition(String),
    /// A computed hourly value was NaN or infinite.
    NonFinite(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCoordinates { lat, lon } => {
                write!(f, "invalid coordinates ({lat}, {lon})")
            }
            Self::EmptySeries => write!(f, "empty weather series"),
            Self::SolarPosition(msg) => write!(f, "solar position: {msg}"),
            Self::NonFinite(at) => write!(f, "non-finite output at {at}"),
        }
    }
}

impl std::error::Error for SimError {}

/// Reference fixed-tilt system together with its inverter.
#[derive(Debug)]
pub struct PvModel {
    pdc0_w: f64,
    gamma_pdc: f64,
    plane: Plane,
    sapm: SapmParams,
    inverter: Box<dyn InverterModel>,
    min_hours_per_day: usize,
    tz: Tz,
}

impl PvModel {
    /// Builds the model from configuration; the inverter is selected here,
    /// once for the whole run. Weather timestamps are civil time in `tz`.
    pub fn from_config(pv: &PvConfig, tz: Tz) -> Self {
        Self {
            pdc0_w: pv.system_kw_dc * 1000.0,
            gamma_pdc: pv.gamma_pdc,
            plane: Plane {
                tilt: pv.surface_tilt,
                azimuth: pv.surface_azimuth,
                albedo: pv.albedo,
            },
            sapm: SapmParams {
                a: pv.sapm_a,
                b: pv.sapm_b,
                delta_t: pv.sapm_delta_t,
            },
            inverter: select_inverter(pv),
            min_hours_per_day: pv.min_hours_per_day,
            tz,
        }
    }

    /// Rated DC power (kW).
    pub fn rated_kw(&self) -> f64 {
        self.pdc0_w / 1000.0
    }

    /// AC power (W) for one hour.
    ///
    /// `None` when any input is missing or the local time was skipped by a
    /// DST transition.
    ///
    /// # Errors
    ///
    /// Solar position failures and non-finite results.
    pub fn hourly_ac(&self, lat: f64, lon: f64, hour: &WeatherHour) -> Result<Option<f64>, SimError> {
        let (Some(ghi), Some(temp_air), Some(wind)) = (hour.ghi_whm2, hour.t2m_c, hour.ws10_ms) else {
            return Ok(None);
        };
        let Some(time) = hour.ts.and_local_timezone(self.tz).earliest() else {
            return Ok(None);
        };
        let ghi = ghi.max(0.0);
        let poa = if ghi > 0.0 {
            let sun = sun_position(lat, lon, time.fixed_offset()).map_err(SimError::SolarPosition)?;
            let parts = erbs(ghi, sun.zenith, hour.ts.ordinal());
            self.plane.poa_global(ghi, parts, sun)
        } else {
            0.0
        };
        let temp_cell = self.sapm.cell_temperature(poa, temp_air, wind);
        let pdc = pvwatts_dc(poa, temp_cell, self.pdc0_w, self.gamma_pdc);
        let pac = self.inverter.ac_power(pdc);
        if !pac.is_finite() {
            return Err(SimError::NonFinite(hour.ts.to_string()));
        }
        Ok(Some(pac))
    }

    /// Daily AC energy for one zone.
    ///
    /// Days with fewer than `min_hours_per_day` valid hours are omitted.
    ///
    /// # Errors
    ///
    /// Invalid centroid, empty series, or any hourly failure.
    pub fn simulate_zone(
        &self,
        zone_id: &str,
        lat: f64,
        lon: f64,
        hours: &[WeatherHour],
    ) -> Result<Vec<DailyEnergyRecord>, SimError> {
        if !(lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0) {
            return Err(SimError::InvalidCoordinates { lat, lon });
        }
        if hours.is_empty() {
            return Err(SimError::EmptySeries);
        }

        // date -> (valid hours, AC watt-hours)
        let mut days: BTreeMap<NaiveDate, (usize, f64)> = BTreeMap::new();
        for hour in hours {
            if let Some(pac) = self.hourly_ac(lat, lon, hour)? {
                let day = days.entry(hour.ts.date()).or_insert((0, 0.0));
                day.0 += 1;
                day.1 += pac;
            }
        }

        let records: Vec<DailyEnergyRecord> = days
            .into_iter()
            .filter(|(_, (n, _))| *n >= self.min_hours_per_day)
            .map(|(date, (_, wh))| DailyEnergyRecord {
                zone_id: zone_id.to_string(),
                date,
                energy_kwh: wh / 1000.0,
            })
            .collect();
        debug!(zone = zone_id, days = records.len(), "zone simulated");
        Ok(records)
    }
}

/// Simulates every zone on the rayon pool.
///
/// `inputs` pairs each zone with its cleaned weather. Failed zones are
/// logged and reported; the rest are concatenated in ZoneID order.
pub fn simulate_zones(model: &PvModel, inputs: &[(&Zone, &[WeatherHour])]) -> BatchOutcome<Vec<DailyEnergyRecord>> {
    info!(zones = inputs.len(), inverter = model.inverter.name(), "simulating PV output");
    let mut results: Vec<(String, Result<Vec<DailyEnergyRecord>, SimError>)> = inputs
        .par_iter()
        .map(|(zone, hours)| {
            let result = model.simulate_zone(&zone.id, zone.centroid_lat, zone.centroid_lon, hours);
            (zone.id.clone(), result)
        })
        .collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));

    let outcome = BatchOutcome::from_results(results);
    for failure in &outcome.failed {
        warn!(zone = %failure.zone_id, reason = %failure.reason, "zone skipped");
    }
    info!(
        succeeded = outcome.succeeded.len(),
        skipped = outcome.failed.len(),
        "simulation finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::{ClearSkySource, WeatherRequest};
    use chrono::Duration;
    use geo::{LineString, Polygon};

    fn model() -> PvModel {
        PvModel::from_config(&PvConfig::default(), chrono_tz::Asia::Kolkata)
    }

    fn day_hours(date: NaiveDate, n: u32) -> Vec<WeatherHour> {
        (0..n)
            .map(|h| WeatherHour {
                ts: date.and_hms_opt(h, 0, 0).unwrap(),
                ghi_whm2: Some(if (7..18).contains(&h) { 500.0 } else { 0.0 }),
                t2m_c: Some(25.0),
                ws10_ms: Some(2.0),
            })
            .collect()
    }

    #[test]
    fn nineteen_hours_is_absent_twenty_is_present() {
        let m = model();
        let d = NaiveDate::from_ymd_opt(2023, 3, 15).unwrap();
        let short = m.simulate_zone("Z", 12.97, 77.59, &day_hours(d, 19)).unwrap();
        assert!(short.is_empty());
        let enough = m.simulate_zone("Z", 12.97, 77.59, &day_hours(d, 20)).unwrap();
        assert_eq!(enough.len(), 1);
        assert_eq!(enough[0].date, d);
        assert!(enough[0].energy_kwh > 0.0);
    }

    #[test]
    fn missing_inputs_do_not_count_as_valid_hours() {
        let m = model();
        let d = NaiveDate::from_ymd_opt(2023, 3, 15).unwrap();
        let mut hours = day_hours(d, 24);
        for h in hours.iter_mut().take(5) {
            h.t2m_c = None;
        }
        assert!(m.simulate_zone("Z", 12.97, 77.59, &hours).unwrap().is_empty());
    }

    #[test]
    fn hourly_ac_never_exceeds_rated() {
        let m = model();
        let ts = NaiveDate::from_ymd_opt(2023, 3, 21).unwrap().and_hms_opt(12, 0, 0).unwrap();
        for ghi in [0.0, 200.0, 600.0, 1000.0, 1400.0] {
            let hour = WeatherHour {
                ts,
                ghi_whm2: Some(ghi),
                t2m_c: Some(5.0),
                ws10_ms: Some(6.0),
            };
            let ac = m.hourly_ac(12.97, 77.59, &hour).unwrap().unwrap();
            assert!(ac <= 0.96 * 10_000.0 + 1e-9 && ac >= 0.0, "ac {ac} at ghi {ghi}");
        }
    }

    #[test]
    fn dst_gap_hour_is_not_a_valid_hour() {
        let m = PvModel::from_config(&PvConfig::default(), chrono_tz::America::New_York);
        // 02:00 does not exist in New York on 2023-03-12
        let d = NaiveDate::from_ymd_opt(2023, 3, 12).unwrap();
        let gap = WeatherHour {
            ts: d.and_hms_opt(2, 0, 0).unwrap(),
            ghi_whm2: Some(0.0),
            t2m_c: Some(5.0),
            ws10_ms: Some(3.0),
        };
        assert_eq!(m.hourly_ac(40.71, -74.0, &gap), Ok(None));

        // a 24-row day with the gap hour filled still has 23 valid hours
        let mut hours = day_hours(d, 24);
        hours[2].ts = gap.ts;
        let days = m.simulate_zone("NYC", 40.71, -74.0, &hours).unwrap();
        assert_eq!(days.len(), 1);

        // summer noon is daylight at EDT, so the model sees the sun
        let july = NaiveDate::from_ymd_opt(2023, 7, 1).unwrap().and_hms_opt(13, 0, 0).unwrap();
        let noon = WeatherHour {
            ts: july,
            ghi_whm2: Some(800.0),
            t2m_c: Some(25.0),
            ws10_ms: Some(2.0),
        };
        assert!(m.hourly_ac(40.71, -74.0, &noon).unwrap().unwrap() > 1000.0);
    }

    #[test]
    fn invalid_coordinates_and_empty_series_fail() {
        let m = model();
        let d = NaiveDate::from_ymd_opt(2023, 3, 15).unwrap();
        assert_eq!(
            m.simulate_zone("Z", 120.0, 77.0, &day_hours(d, 24)),
            Err(SimError::InvalidCoordinates { lat: 120.0, lon: 77.0 })
        );
        assert_eq!(m.simulate_zone("Z", 12.0, 77.0, &[]), Err(SimError::EmptySeries));
    }

    #[test]
    fn clear_sky_year_has_plausible_yield() {
        let m = model();
        let req = WeatherRequest {
            zone_id: "Z".to_string(),
            lat: 12.97,
            lon: 77.59,
            start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
            tz: chrono_tz::Asia::Kolkata,
        };
        let hours = ClearSkySource::default().generate(&req);
        let days = m.simulate_zone("Z", req.lat, req.lon, &hours).unwrap();
        assert_eq!(days.len(), 365);
        let annual: f64 = days.iter().map(|d| d.energy_kwh).sum();
        let cf = annual / (m.rated_kw() * 24.0 * 365.0);
        assert!((0.13..0.25).contains(&cf), "capacity factor {cf}");
    }

    #[test]
    fn batch_skips_failing_zone() {
        let m = model();
        let ring = LineString::from(vec![(77.5, 12.9), (77.6, 12.9), (77.6, 13.0), (77.5, 12.9)]);
        let good = Zone {
            id: "Z-0001".to_string(),
            geometry: Polygon::new(ring, vec![]),
            centroid_lat: 12.95,
            centroid_lon: 77.55,
            region: crate::grid::Region::E,
        };
        let bad = Zone {
            id: "Z-0002".to_string(),
            centroid_lat: f64::NAN,
            ..good.clone()
        };
        let d = NaiveDate::from_ymd_opt(2023, 3, 15).unwrap();
        let hours: Vec<WeatherHour> = (0..48)
            .map(|h| WeatherHour {
                ts: d.and_hms_opt(0, 0, 0).unwrap() + Duration::hours(h),
                ghi_whm2: Some(0.0),
                t2m_c: Some(20.0),
                ws10_ms: Some(1.0),
            })
            .collect();
        let inputs = vec![(&bad, hours.as_slice()), (&good, hours.as_slice())];
        let outcome = simulate_zones(&m, &inputs);
        assert_eq!(outcome.succeeded.len(), 1);
        assert_eq!(outcome.succeeded[0].len(), 2);
        assert_eq!(outcome.failed[0].zone_id, "Z-0002");
    }
}
