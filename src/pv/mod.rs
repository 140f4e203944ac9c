//! Photovoltaic energy simulation for the reference fixed-tilt system.

pub mod inverter;
pub mod module;
pub mod simulate;
pub mod solar;

pub use inverter::{ConstantEfficiencyInverter, InverterModel, PvWattsInverter, select_inverter};
pub use simulate::{DailyEnergyRecord, PvModel, SimError, simulate_zones};
