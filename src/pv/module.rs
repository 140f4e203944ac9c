//! Cell temperature and DC power.

/// Sandia (SAPM) cell temperature coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SapmParams {
    /// Upper limit coefficient.
    pub a: f64,
    /// Wind coefficient (s/m).
    pub b: f64,
    /// Cell minus back-of-module temperature at 1000 W/m² (°C).
    pub delta_t: f64,
}

impl SapmParams {
    /// Open-rack, glass/cell/glass-back module.
    pub const OPEN_RACK_GLASS: Self = Self {
        a: -3.56,
        b: -0.075,
        delta_t: 3.0,
    };

    /// Cell temperature (°C).
    ///
    /// # Arguments
    ///
    /// * `poa` - Plane-of-array irradiance (W/m²)
    /// * `temp_air` - Ambient temperature (°C)
    /// * `wind_speed` - Wind speed (m/s)
    pub fn cell_temperature(&self, poa: f64, temp_air: f64, wind_speed: f64) -> f64 {
        let module = poa * (self.a + self.b * wind_speed).exp() + temp_air;
        module + poa / 1000.0 * self.delta_t
    }
}

/// PVWatts DC power (W) at cell temperature `temp_cell`.
pub fn pvwatts_dc(poa: f64, temp_cell: f64, pdc0_w: f64, gamma_pdc: f64) -> f64 {
    poa / 1000.0 * pdc0_w * (1.0 + gamma_pdc * (temp_cell - 25.0))
}
