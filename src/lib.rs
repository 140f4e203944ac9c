//! City-scale rooftop solar zoning, simulation and QA pipeline.

pub mod batch;
pub mod config;
pub mod error;
pub mod features;
/// Boundary resolution, projection and zone grid.
pub mod grid;
pub mod io;
pub mod pipeline;
/// PV performance modelling.
pub mod pv;
pub mod qa;
pub mod stats;
/// Weather sources, cache, cleaning and ingestion.
pub mod weather;
