//! Persistence of stage tables and zone geometries.

pub mod geojson;
pub mod tables;
