//! Daily features for QA-passing zones and their city-wide aggregates.

pub mod rolling;
pub mod rollup;

pub use rolling::{FeatureRecord, build_features, select_zones};
pub use rollup::{CityRollup, ZoneAnnualRecord, city_rollup, zone_annual};
