//! Spherical Web-Mercator projection (EPSG:3857 equivalent).
//!
//! Gridding, clipping, areas and centroids are computed in projected metres;
//! stored geometries and centroids are geographic lon/lat degrees.

use geo::{Coord, MapCoords, MultiPolygon, Polygon};

/// WGS84 semi-major axis used by Web-Mercator (m).
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Latitude limit of the projection (deg).
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Projects a lon/lat coordinate (deg) to Web-Mercator metres.
pub fn to_mercator(c: Coord<f64>) -> Coord<f64> {
    let lat = c.y.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    Coord {
        x: EARTH_RADIUS_M * c.x.to_radians(),
        y: EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}

/// Inverse of [`to_mercator`].
pub fn to_geographic(c: Coord<f64>) -> Coord<f64> {
    let lon = (c.x / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (c.y / EARTH_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    Coord { x: lon, y: lat }
}

/// Projects every vertex of a polygon.
pub fn polygon_to_mercator(p: &Polygon<f64>) -> Polygon<f64> {
    p.map_coords(to_mercator)
}

/// Unprojects every vertex of a polygon.
pub fn polygon_to_geographic(p: &Polygon<f64>) -> Polygon<f64> {
    p.map_coords(to_geographic)
}

/// Projects every vertex of a multi-polygon.
pub fn multi_to_mercator(mp: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    mp.map_coords(to_mercator)
}
