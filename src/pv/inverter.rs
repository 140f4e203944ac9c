//! DC to AC conversion strategies.

use std::fmt;

use tracing::{info, warn};

use crate::config::PvConfig;

/// Converts DC power to AC power (W).
pub trait InverterModel: fmt::Debug + Send + Sync {
    /// AC output for `pdc_w`, within `[0, rated_ac_w()]`.
    fn ac_power(&self, pdc_w: f64) -> f64;

    /// AC clipping limit (W).
    fn rated_ac_w(&self) -> f64;

    /// Short model name for logs.
    fn name(&self) -> &'static str;
}

/// PVWatts part-load efficiency curve.
#[derive(Debug, Clone, PartialEq)]
pub struct PvWattsInverter {
    pdc0_w: f64,
    eta_nom: f64,
    eta_ref: f64,
}

impl PvWattsInverter {
    /// Creates the model, or `None` when its parameters are unusable.
    pub fn new(pdc0_w: f64, eta_nom: f64, eta_ref: f64) -> Option<Self> {
        let usable = pdc0_w.is_finite()
            && pdc0_w > 0.0
            && eta_nom > 0.0
            && eta_nom <= 1.0
            && eta_ref > 0.0
            && eta_ref <= 1.0;
        usable.then_some(Self {
            pdc0_w,
            eta_nom,
            eta_ref,
        })
    }
}

impl InverterModel for PvWattsInverter {
    fn ac_power(&self, pdc_w: f64) -> f64 {
        let zeta = pdc_w / self.pdc0_w;
        if !(zeta > 0.0) {
            return 0.0;
        }
        let eta = self.eta_nom / self.eta_ref * (-0.0162 * zeta - 0.0059 / zeta + 0.9858);
        (eta * pdc_w).clamp(0.0, self.rated_ac_w())
    }

    fn rated_ac_w(&self) -> f64 {
        self.eta_nom * self.pdc0_w
    }

    fn name(&self) -> &'static str {
        "pvwatts"
    }
}

/// Constant efficiency with clipping at `eta * pdc0`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantEfficiencyInverter {
    pdc0_w: f64,
    eta: f64,
}

impl ConstantEfficiencyInverter {
    /// Creates the model.
    pub fn new(pdc0_w: f64, eta: f64) -> Self {
        Self { pdc0_w, eta }
    }
}

impl InverterModel for ConstantEfficiencyInverter {
    fn ac_power(&self, pdc_w: f64) -> f64 {
        (self.eta * pdc_w).clamp(0.0, self.rated_ac_w())
    }

    fn rated_ac_w(&self) -> f64 {
        self.eta * self.pdc0_w
    }

    fn name(&self) -> &'static str {
        "constant"
    }
}

/// Picks the inverter once for the run.
///
/// `"pvwatts"` yields the part-load model unless its parameters are unusable,
/// in which case the constant-efficiency model is used with a warning.
pub fn select_inverter(pv: &PvConfig) -> Box<dyn InverterModel> {
    let pdc0_w = pv.system_kw_dc * 1000.0;
    let model: Box<dyn InverterModel> = if pv.inverter == "constant" {
        Box::new(ConstantEfficiencyInverter::new(pdc0_w, pv.inverter_eff))
    } else {
        match PvWattsInverter::new(pdc0_w, pv.inverter_eff, pv.inverter_eff_ref) {
            Some(m) => Box::new(m),
            None => {
                warn!(
                    eta_nom = pv.inverter_eff,
                    eta_ref = pv.inverter_eff_ref,
                    "pvwatts inverter parameters unusable, using constant efficiency"
                );
                Box::new(ConstantEfficiencyInverter::new(pdc0_w, pv.inverter_eff))
            }
        }
    };
    info!(model = model.name(), rated_ac_w = model.rated_ac_w(), "inverter selected");
    model
}
