//! Boundary resolution and zone tessellation.

pub mod boundary;
pub mod projection;
pub mod zones;

pub use boundary::{
    Boundary, BoundarySource, GeoJsonFileSource, NominatimSource, StaticBoundary, resolve_boundary,
};
pub use zones::{CoverageReport, Region, Zone, ZoneGrid, ZoneGridBuilder, ZoneIndex};
