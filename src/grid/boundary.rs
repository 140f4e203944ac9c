//! City boundary resolution: geocoding, GeoJSON parsing and repair.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use geo::{Area, BooleanOps, Coord, LineString, MultiPolygon, Polygon};
use serde_json::Value;
use tracing::{debug, info};

use super::projection::{multi_to_mercator, polygon_to_mercator};
use crate::error::{PipelineError, Result};

/// The city extent: a single repaired polygon in lon/lat degrees.
#[derive(Debug, Clone)]
pub struct Boundary {
    polygon: Polygon<f64>,
}

impl Boundary {
    /// Builds a boundary from a possibly multi-part geometry.
    ///
    /// Each part is repaired by a boolean normalization (resolves
    /// self-intersections and ring orientation), then the part with the
    /// largest projected area is kept.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Boundary`] when no part has positive area.
    pub fn from_parts(parts: MultiPolygon<f64>) -> Result<Self> {
        let empty = MultiPolygon::<f64>::new(Vec::new());
        let repaired = parts.union(&empty);
        let polygon = repaired
            .into_iter()
            .map(|p| {
                let area = polygon_to_mercator(&p).unsigned_area();
                (area, p)
            })
            .filter(|(area, _)| *area > 0.0)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, p)| p)
            .ok_or_else(|| PipelineError::Boundary("geometry has no area".to_string()))?;
        Ok(Self { polygon })
    }

    /// Geographic polygon (lon/lat).
    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Polygon in Web-Mercator metres.
    pub fn projected(&self) -> Polygon<f64> {
        polygon_to_mercator(&self.polygon)
    }

    /// Projected area (km²).
    pub fn area_km2(&self) -> f64 {
        self.projected().unsigned_area() / 1e6
    }
}

/// Resolves a place identifier to a (possibly multi-part) polygon.
pub trait BoundarySource {
    /// Geocodes `place`.
    fn resolve(&self, place: &str) -> impl Future<Output = Result<MultiPolygon<f64>>> + Send;
}

/// Nominatim search with `polygon_geojson=1`.
#[derive(Debug, Clone)]
pub struct NominatimSource {
    client: reqwest::Client,
    url: String,
}

impl NominatimSource {
    /// Creates a geocoder client for `url`, identifying as `user_agent`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Boundary`] if the HTTP client cannot be built.
    pub fn new(url: &str, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| PipelineError::Boundary(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl BoundarySource for NominatimSource {
    async fn resolve(&self, place: &str) -> Result<MultiPolygon<f64>> {
        info!(place, "geocoding boundary");
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("q", place),
                ("format", "jsonv2"),
                ("polygon_geojson", "1"),
                ("limit", "1"),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| PipelineError::Boundary(format!("geocoder request failed: {e}")))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::Boundary(format!("geocoder response: {e}")))?;
        let geometry = body
            .as_array()
            .and_then(|hits| hits.first())
            .and_then(|hit| hit.get("geojson"))
            .ok_or_else(|| PipelineError::Boundary(format!("no polygon found for \"{place}\"")))?;
        parse_geojson(geometry)
    }
}

/// Reads the boundary from a local GeoJSON file; the place name is ignored.
#[derive(Debug, Clone)]
pub struct GeoJsonFileSource {
    path: PathBuf,
}

impl GeoJsonFileSource {
    /// Creates a source reading `path`.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl BoundarySource for GeoJsonFileSource {
    async fn resolve(&self, _place: &str) -> Result<MultiPolygon<f64>> {
        debug!(path = %self.path.display(), "reading boundary file");
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            PipelineError::Boundary(format!("cannot read \"{}\": {e}", self.path.display()))
        })?;
        let value: Value = serde_json::from_str(&raw)?;
        parse_geojson(&value)
    }
}

/// A fixed in-memory boundary.
#[derive(Debug, Clone)]
pub struct StaticBoundary(pub MultiPolygon<f64>);

impl BoundarySource for StaticBoundary {
    async fn resolve(&self, _place: &str) -> Result<MultiPolygon<f64>> {
        Ok(self.0.clone())
    }
}

/// Resolves and repairs the boundary from any source.
///
/// # Errors
///
/// Any source failure or an empty geometry is fatal.
pub async fn resolve_boundary<S: BoundarySource>(source: &S, place: &str) -> Result<Boundary> {
    let parts = source.resolve(place).await?;
    let n_parts = parts.0.len();
    let boundary = Boundary::from_parts(parts)?;
    info!(
        parts = n_parts,
        area_km2 = boundary.area_km2(),
        "boundary resolved"
    );
    Ok(boundary)
}

/// Extracts all polygons from a GeoJSON geometry, Feature or FeatureCollection.
///
/// # Errors
///
/// Returns [`PipelineError::Boundary`] for unsupported or malformed input.
pub fn parse_geojson(value: &Value) -> Result<MultiPolygon<f64>> {
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "Polygon" => Ok(MultiPolygon::new(vec![parse_polygon(coordinates(value)?)?])),
        "MultiPolygon" => {
            let polys = coordinates(value)?
                .as_array()
                .ok_or_else(|| malformed("MultiPolygon coordinates"))?
                .iter()
                .map(parse_polygon)
                .collect::<Result<Vec<_>>>()?;
            Ok(MultiPolygon::new(polys))
        }
        "Feature" => {
            let geometry = value
                .get("geometry")
                .ok_or_else(|| malformed("Feature without geometry"))?;
            parse_geojson(geometry)
        }
        "FeatureCollection" => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| malformed("FeatureCollection without features"))?;
            let mut polys = Vec::new();
            for feature in features {
                polys.extend(parse_geojson(feature)?.0);
            }
            Ok(MultiPolygon::new(polys))
        }
        other => Err(PipelineError::Boundary(format!(
            "unsupported geometry type \"{other}\" (expected a polygon)"
        ))),
    }
}

/// Serializes a polygon as GeoJSON `coordinates` (exterior then holes).
pub fn polygon_coordinates(p: &Polygon<f64>) -> Value {
    let ring = |ls: &LineString<f64>| {
        Value::Array(
            ls.coords()
                .map(|c| Value::Array(vec![c.x.into(), c.y.into()]))
                .collect(),
        )
    };
    let mut rings = vec![ring(p.exterior())];
    rings.extend(p.interiors().iter().map(ring));
    Value::Array(rings)
}

/// Parses GeoJSON polygon `coordinates` (array of rings).
///
/// # Errors
///
/// Returns [`PipelineError::Boundary`] when rings are malformed.
pub fn parse_polygon(coords: &Value) -> Result<Polygon<f64>> {
    let rings = coords
        .as_array()
        .ok_or_else(|| malformed("polygon rings"))?
        .iter()
        .map(parse_ring)
        .collect::<Result<Vec<_>>>()?;
    let mut rings = rings.into_iter();
    let exterior = rings.next().ok_or_else(|| malformed("polygon without rings"))?;
    Ok(Polygon::new(exterior, rings.collect()))
}

fn parse_ring(ring: &Value) -> Result<LineString<f64>> {
    let coords = ring
        .as_array()
        .ok_or_else(|| malformed("ring"))?
        .iter()
        .map(|pos| {
            let x = pos.get(0).and_then(Value::as_f64);
            let y = pos.get(1).and_then(Value::as_f64);
            match (x, y) {
                (Some(x), Some(y)) => Ok(Coord { x, y }),
                _ => Err(malformed("position")),
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString::new(coords))
}

fn coordinates(value: &Value) -> Result<&Value> {
    value
        .get("coordinates")
        .ok_or_else(|| malformed("geometry without coordinates"))
}

fn malformed(what: &str) -> PipelineError {
    PipelineError::Boundary(format!("malformed GeoJSON: {what}"))
}

/// Area of a multi-polygon in Web-Mercator km².
pub fn projected_area_km2(mp: &MultiPolygon<f64>) -> f64 {
    multi_to_mercator(mp).unsigned_area() / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square(x0: f64, y0: f64, size: f64) -> Value {
        json!([[
            [x0, y0],
            [x0 + size, y0],
            [x0 + size, y0 + size],
            [x0, y0 + size],
            [x0, y0]
        ]])
    }

    #[test]
    fn parses_polygon_geometry() {
        let v = json!({"type": "Polygon", "coordinates": square(77.0, 12.0, 0.1)});
        let mp = parse_geojson(&v).ok();
        assert_eq!(mp.map(|m| m.0.len()), Some(1));
    }

    #[test]
    fn parses_feature_collection() {
        let v = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {}, "geometry": {"type": "Polygon", "coordinates": square(0.0, 0.0, 1.0)}},
                {"type": "Feature", "properties": {}, "geometry": {"type": "MultiPolygon", "coordinates": [square(5.0, 5.0, 1.0), square(8.0, 8.0, 1.0)]}}
            ]
        });
        let mp = parse_geojson(&v).ok();
        assert_eq!(mp.map(|m| m.0.len()), Some(3));
    }

    #[test]
    fn rejects_point_geometry() {
        let v = json!({"type": "Point", "coordinates": [77.0, 12.0]});
        assert!(matches!(parse_geojson(&v), Err(PipelineError::Boundary(_))));
    }

    #[test]
    fn keeps_largest_part() {
        let v = json!({"type": "MultiPolygon", "coordinates": [square(77.0, 12.0, 0.05), square(77.5, 12.5, 0.2)]});
        let parts = parse_geojson(&v).ok().unwrap_or_else(|| MultiPolygon::new(vec![]));
        let boundary = Boundary::from_parts(parts).ok();
        let min_x = boundary
            .as_ref()
            .map(|b| b.polygon().exterior().coords().map(|c| c.x).fold(f64::MAX, f64::min));
        assert!(min_x.is_some_and(|x| (x - 77.5).abs() < 1e-6));
    }

    #[test]
    fn empty_geometry_is_fatal() {
        let result = Boundary::from_parts(MultiPolygon::new(vec![]));
        assert!(matches!(result, Err(PipelineError::Boundary(_))));
    }

    #[test]
    fn coordinates_round_trip_through_geojson() {
        let v = json!({"type": "Polygon", "coordinates": square(1.0, 2.0, 3.0)});
        let mp = parse_geojson(&v).ok().unwrap_or_else(|| MultiPolygon::new(vec![]));
        assert_eq!(polygon_coordinates(&mp.0[0]), square(1.0, 2.0, 3.0));
    }
}
