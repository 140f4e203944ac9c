//! Solar geometry and irradiance transposition.
//!
//! Angles are in degrees; azimuths are clockwise from north.

use std::f64::consts::PI;

use chrono::{DateTime, FixedOffset};
use solar_positioning::time::DeltaT;
use solar_positioning::{RefractionCorrection, spa};

/// Erbs decomposition: lower bound on cos(zenith) for the clearness index.
pub const MIN_COS_ZENITH: f64 = 0.065;

/// Erbs decomposition: upper bound on the clearness index.
pub const MAX_CLEARNESS_INDEX: f64 = 2.0;

/// Erbs decomposition: zenith above which DNI is zeroed (deg).
pub const MAX_ZENITH: f64 = 87.0;

/// Apparent sun position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunPosition {
    /// Apparent zenith (refraction corrected).
    pub zenith: f64,
    /// Azimuth, clockwise from north.
    pub azimuth: f64,
}

/// Sun position by NREL SPA with standard-atmosphere refraction at sea level.
///
/// # Errors
///
/// Returns the library's message for out-of-range coordinates or dates.
pub fn sun_position(
    lat: f64,
    lon: f64,
    time: DateTime<FixedOffset>,
) -> Result<SunPosition, String> {
    let delta_t = DeltaT::estimate_from_date_like(time).map_err(|e| e.to_string())?;
    let pos = spa::solar_position(
        time,
        lat,
        lon,
        0.0,
        delta_t,
        Some(RefractionCorrection::standard()),
    )
    .map_err(|e| e.to_string())?;
    Ok(SunPosition {
        zenith: pos.zenith_angle(),
        azimuth: pos.azimuth(),
    })
}

/// Extraterrestrial normal irradiance (W/m²), Spencer's series.
pub fn extraterrestrial_irradiance(day_of_year: u32) -> f64 {
    let b = 2.0 * PI * (f64::from(day_of_year) - 1.0) / 365.0;
    1366.1
        * (1.00011 + 0.034221 * b.cos() + 0.00128 * b.sin() + 0.000719 * (2.0 * b).cos()
            + 0.000077 * (2.0 * b).sin())
}

/// Beam and diffuse components of GHI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decomposition {
    /// Direct normal irradiance.
    pub dni: f64,
    /// Diffuse horizontal irradiance.
    pub dhi: f64,
}

/// Erbs decomposition of GHI into DNI and DHI. Both are non-negative.
pub fn erbs(ghi: f64, zenith: f64, day_of_year: u32) -> Decomposition {
    let cos_z = zenith.to_radians().cos();
    let kt = (ghi / (extraterrestrial_irradiance(day_of_year) * cos_z.max(MIN_COS_ZENITH)))
        .clamp(0.0, MAX_CLEARNESS_INDEX);

    let df = if kt <= 0.22 {
        1.0 - 0.09 * kt
    } else if kt <= 0.8 {
        0.9511 - 0.1604 * kt + 4.388 * kt.powi(2) - 16.638 * kt.powi(3) + 12.336 * kt.powi(4)
    } else {
        0.165
    };

    let mut dhi = df * ghi;
    let mut dni = (ghi - dhi) / cos_z;
    if zenith > MAX_ZENITH || ghi < 0.0 || !(dni >= 0.0) {
        dni = 0.0;
        dhi = ghi;
    }
    Decomposition {
        dni: dni.max(0.0),
        dhi: dhi.max(0.0),
    }
}

/// Cosine of the angle of incidence on a tilted plane, in `[-1, 1]`.
pub fn cos_incidence(tilt: f64, surface_azimuth: f64, zenith: f64, azimuth: f64) -> f64 {
    let (t, z) = (tilt.to_radians(), zenith.to_radians());
    (t.cos() * z.cos() + t.sin() * z.sin() * (azimuth - surface_azimuth).to_radians().cos())
        .clamp(-1.0, 1.0)
}

/// Fixed plane orientation and ground reflectance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Tilt from horizontal.
    pub tilt: f64,
    /// Azimuth, clockwise from north.
    pub azimuth: f64,
    /// Ground albedo.
    pub albedo: f64,
}

impl Plane {
    /// Isotropic-sky plane-of-array global irradiance, clamped at zero.
    pub fn poa_global(&self, ghi: f64, parts: Decomposition, sun: SunPosition) -> f64 {
        let cos_t = self.tilt.to_radians().cos();
        let beam = parts.dni * cos_incidence(self.tilt, self.azimuth, sun.zenith, sun.azimuth).max(0.0);
        let sky = parts.dhi * (1.0 + cos_t) / 2.0;
        let ground = ghi * self.albedo * (1.0 - cos_t) / 2.0;
        (beam + sky + ground).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ist(y: i32, m: u32, d: u32, h: u32) -> DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(330 * 60).unwrap();
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
            .and_local_timezone(offset)
            .unwrap()
    }

    #[test]
    fn noon_sun_is_high_and_south_in_winter() {
        let pos = sun_position(12.97, 77.59, ist(2023, 12, 21, 12)).unwrap();
        // declination about -23.4 at the solstice
        assert!((pos.zenith - 36.4).abs() < 2.0, "zenith {}", pos.zenith);
        assert!((150.0..210.0).contains(&pos.azimuth), "azimuth {}", pos.azimuth);
    }

    #[test]
    fn night_sun_is_below_horizon() {
        let pos = sun_position(12.97, 77.59, ist(2023, 6, 1, 0));
        assert!(pos.is_ok_and(|p| p.zenith > 90.0));
    }

    #[test]
    fn invalid_latitude_is_rejected() {
        assert!(sun_position(95.0, 77.59, ist(2023, 6, 1, 12)).is_err());
    }

    #[test]
    fn spencer_peaks_near_perihelion() {
        let jan = extraterrestrial_irradiance(3);
        let jul = extraterrestrial_irradiance(185);
        assert!(jan > 1400.0 && jul < 1330.0, "jan {jan} jul {jul}");
    }

    #[test]
    fn erbs_components_close_the_budget() {
        let zenith: f64 = 30.0;
        let ghi = 800.0;
        let parts = erbs(ghi, zenith, 172);
        let closure = parts.dni * zenith.to_radians().cos() + parts.dhi;
        assert!((closure - ghi).abs() < 1e-9);
        assert!(parts.dni > 0.0 && parts.dhi > 0.0);
    }

    #[test]
    fn erbs_low_sun_is_all_diffuse() {
        let parts = erbs(40.0, 88.0, 172);
        assert_eq!(parts.dni, 0.0);
        assert_eq!(parts.dhi, 40.0);
    }

    #[test]
    fn erbs_dark_sky_is_zero() {
        let parts = erbs(0.0, 40.0, 10);
        assert_eq!((parts.dni, parts.dhi), (0.0, 0.0));
    }

    #[test]
    fn horizontal_plane_sees_ghi() {
        let plane = Plane {
            tilt: 0.0,
            azimuth: 180.0,
            albedo: 0.2,
        };
        let sun = SunPosition {
            zenith: 40.0,
            azimuth: 150.0,
        };
        let parts = erbs(600.0, sun.zenith, 100);
        let poa = plane.poa_global(600.0, parts, sun);
        assert!((poa - 600.0).abs() < 1e-6, "poa {poa}");
    }

    #[test]
    fn incidence_is_normal_when_facing_sun() {
        let c = cos_incidence(30.0, 180.0, 30.0, 180.0);
        assert!((c - 1.0).abs() < 1e-12);
    }
}
