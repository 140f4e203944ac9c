//! Square-grid tessellation of the boundary into zones.

use std::fmt;
use std::str::FromStr;

use geo::{Area, BooleanOps, BoundingRect, Centroid, Coord, Intersects, MultiPolygon, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::boundary::Boundary;
use super::projection::{polygon_to_geographic, to_geographic};
use crate::error::{PipelineError, Result};

/// Compass octant of a zone relative to the mean zone centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    E,
    NE,
    N,
    NW,
    W,
    SW,
    S,
    SE,
}

impl Region {
    /// All octants, counter-clockwise from east.
    pub const ALL: [Region; 8] = [
        Region::E,
        Region::NE,
        Region::N,
        Region::NW,
        Region::W,
        Region::SW,
        Region::S,
        Region::SE,
    ];

    /// Maps an angle in degrees (0 = east, 90 = north, range [-180, 180]) to
    /// its octant using half-open ranges, e.g. E = [-22.5, 22.5).
    pub fn from_angle(deg: f64) -> Self {
        // shift so E starts at 0 and normalize into [0, 360)
        let a = (deg + 22.5).rem_euclid(360.0);
        let idx = ((a / 45.0).floor() as usize).min(7);
        Self::ALL[idx]
    }

    /// Short label (`"NE"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::E => "E",
            Region::NE => "NE",
            Region::N => "N",
            Region::NW => "NW",
            Region::W => "W",
            Region::SW => "SW",
            Region::S => "S",
            Region::SE => "SE",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown region label \"{s}\""))
    }
}

/// A grid cell clipped to the city boundary.
#[derive(Debug, Clone)]
pub struct Zone {
    /// Stable sequential identifier.
    pub id: String,
    /// Clipped cell in lon/lat degrees.
    pub geometry: Polygon<f64>,
    /// Centroid latitude (deg).
    pub centroid_lat: f64,
    /// Centroid longitude (deg).
    pub centroid_lon: f64,
    /// Octant relative to the mean centroid.
    pub region: Region,
}

/// Diagnostics comparing the zone union with the boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageReport {
    /// Boundary area (km², projected).
    pub boundary_km2: f64,
    /// Area of the union of all zones (km², projected).
    pub zones_km2: f64,
    /// `zones_km2 / boundary_km2`, capped at 100.
    pub coverage_pct: f64,
    /// Number of zones.
    pub n_zones: usize,
    /// Mean zone area (km²).
    pub avg_cell_km2: f64,
}

impl fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "boundary {:.2} km², zones {:.2} km² ({:.2}%), {} zones, avg {:.3} km²",
            self.boundary_km2, self.zones_km2, self.coverage_pct, self.n_zones, self.avg_cell_km2
        )
    }
}

/// Output of the grid builder.
#[derive(Debug, Clone)]
pub struct ZoneGrid {
    /// Zones in ID order.
    pub zones: Vec<Zone>,
    /// Coverage diagnostics.
    pub coverage: CoverageReport,
}

/// Builds zones from a boundary with a fixed square cell.
#[derive(Debug, Clone)]
pub struct ZoneGridBuilder {
    cell_m: f64,
    min_cell_fraction: f64,
    prefix: String,
}

impl ZoneGridBuilder {
    /// Creates a builder.
    ///
    /// * `cell_km` - Cell edge in projected kilometres
    /// * `min_cell_fraction` - Fragments under this share of the cell area are dropped
    /// * `prefix` - ZoneID prefix
    pub fn new(cell_km: f64, min_cell_fraction: f64, prefix: &str) -> Self {
        Self {
            cell_m: cell_km * 1000.0,
            min_cell_fraction,
            prefix: prefix.to_string(),
        }
    }

    /// Tessellates `boundary`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoZones`] when no fragment survives, and
    /// [`PipelineError::Boundary`] for an empty boundary.
    pub fn build(&self, boundary: &Boundary) -> Result<ZoneGrid> {
        let projected = boundary.projected();
        let bbox = projected
            .bounding_rect()
            .ok_or_else(|| PipelineError::Boundary("boundary has no extent".to_string()))?;
        let step = self.cell_m;
        let cols = ((bbox.width() / step).ceil() as usize).max(1);
        let rows = ((bbox.height() / step).ceil() as usize).max(1);
        let min_area = self.min_cell_fraction * step * step;

        let mut pieces: Vec<Polygon<f64>> = Vec::new();
        let mut dropped = 0_usize;
        for i in 0..cols {
            for j in 0..rows {
                let x = bbox.min().x + i as f64 * step;
                let y = bbox.min().y + j as f64 * step;
                let cell = Rect::new(Coord { x, y }, Coord { x: x + step, y: y + step }).to_polygon();
                for part in cell.intersection(&projected) {
                    if part.unsigned_area() >= min_area {
                        pieces.push(part);
                    } else {
                        dropped += 1;
                    }
                }
            }
        }
        if pieces.is_empty() {
            return Err(PipelineError::NoZones);
        }

        let centroids: Vec<Coord<f64>> = pieces
            .iter()
            .map(|p| {
                p.centroid()
                    .map(|c| to_geographic(c.0))
                    .ok_or(PipelineError::NoZones)
            })
            .collect::<Result<_>>()?;
        let n = centroids.len() as f64;
        let lat0 = centroids.iter().map(|c| c.y).sum::<f64>() / n;
        let lon0 = centroids.iter().map(|c| c.x).sum::<f64>() / n;

        let zones: Vec<Zone> = pieces
            .iter()
            .zip(&centroids)
            .enumerate()
            .map(|(k, (piece, c))| Zone {
                id: format!("{}-{:04}", self.prefix, k + 1),
                geometry: polygon_to_geographic(piece),
                centroid_lat: c.y,
                centroid_lon: c.x,
                region: Region::from_angle((c.y - lat0).atan2(c.x - lon0).to_degrees()),
            })
            .collect();

        let coverage = coverage_report(boundary, &pieces);
        if dropped > 0 {
            info!(dropped, "dropped sliver fragments");
        }
        if coverage.coverage_pct < 95.0 {
            warn!(coverage_pct = coverage.coverage_pct, "grid covers less than 95% of boundary");
        }
        info!(%coverage, "zone grid built");
        Ok(ZoneGrid { zones, coverage })
    }
}

/// Coverage of projected zone pieces against the boundary.
fn coverage_report(boundary: &Boundary, pieces: &[Polygon<f64>]) -> CoverageReport {
    let boundary_km2 = boundary.area_km2();
    let union = pieces.iter().fold(MultiPolygon::<f64>::new(Vec::new()), |acc, p| {
        acc.union(&MultiPolygon::new(vec![p.clone()]))
    });
    let zones_km2 = union.unsigned_area() / 1e6;
    let coverage_pct = if boundary_km2 > 0.0 {
        (zones_km2 / boundary_km2 * 100.0).min(100.0)
    } else {
        0.0
    };
    let avg_cell_km2 = pieces.iter().map(|p| p.unsigned_area()).sum::<f64>() / 1e6 / pieces.len() as f64;
    CoverageReport {
        boundary_km2,
        zones_km2,
        coverage_pct,
        n_zones: pieces.len(),
        avg_cell_km2,
    }
}

/// Point-in-zone lookup over disjoint zone geometries.
#[derive(Debug, Clone)]
pub struct ZoneIndex {
    entries: Vec<(Rect<f64>, Zone)>,
}

impl ZoneIndex {
    /// Indexes zones by bounding box.
    pub fn new(zones: &[Zone]) -> Self {
        let entries = zones
            .iter()
            .filter_map(|z| z.geometry.bounding_rect().map(|r| (r, z.clone())))
            .collect();
        Self { entries }
    }

    /// The zone covering (`lat`, `lon`), boundary included, if any.
    ///
    /// A point on an edge shared by several zones resolves to the lowest ID.
    pub fn locate(&self, lat: f64, lon: f64) -> Option<&Zone> {
        let pt = Point::new(lon, lat);
        self.entries
            .iter()
            .filter(|(r, _)| r.intersects(&pt))
            .map(|(_, z)| z)
            .filter(|z| z.geometry.intersects(&pt))
            .min_by(|a, b| a.id.cmp(&b.id))
    }
}
