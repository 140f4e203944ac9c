//! Zones as a GeoJSON FeatureCollection.

use std::fs;
use std::path::Path;

use serde_json::{Value, json};

use crate::error::{PipelineError, Result};
use crate::grid::boundary::{parse_polygon, polygon_coordinates};
use crate::grid::{Region, Zone};

/// Serializes zones with their id, centroid and region as properties.
pub fn zones_to_geojson(zones: &[Zone]) -> Value {
    let features: Vec<Value> = zones
        .iter()
        .map(|z| {
            json!({
                "type": "Feature",
                "properties": {
                    "ZoneID": z.id,
                    "centroid_lat": z.centroid_lat,
                    "centroid_lon": z.centroid_lon,
                    "region": z.region.as_str(),
                },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": polygon_coordinates(&z.geometry),
                }
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

/// Writes zones to `path`, creating parent directories.
///
/// # Errors
///
/// Filesystem or serialization failures.
pub fn write_zones(zones: &[Zone], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec(&zones_to_geojson(zones))?)?;
    Ok(())
}

/// Reads zones written by [`write_zones`].
///
/// # Errors
///
/// [`PipelineError::Schema`] when the file is missing, or a feature lacks a
/// polygon geometry or one of the required properties.
pub fn read_zones(path: &Path) -> Result<Vec<Zone>> {
    let schema = |message: String| PipelineError::Schema {
        path: path.to_path_buf(),
        message,
    };
    let raw = fs::read_to_string(path).map_err(|e| schema(format!("cannot open zones: {e}")))?;
    let value: Value = serde_json::from_str(&raw)?;
    let features = value
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| schema("not a FeatureCollection".to_string()))?;

    features
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let props = f
                .get("properties")
                .ok_or_else(|| schema(format!("feature {i} has no properties")))?;
            let text = |key: &str| {
                props
                    .get(key)
                    .and_then(Value::as_str)
                    .ok_or_else(|| schema(format!("feature {i} missing property {key}")))
            };
            let number = |key: &str| {
                props
                    .get(key)
                    .and_then(Value::as_f64)
                    .ok_or_else(|| schema(format!("feature {i} missing property {key}")))
            };
            let coords = f
                .get("geometry")
                .filter(|g| g.get("type").and_then(Value::as_str) == Some("Polygon"))
                .and_then(|g| g.get("coordinates"))
                .ok_or_else(|| schema(format!("feature {i} has no polygon geometry")))?;
            let region = text("region")?
                .parse::<Region>()
                .map_err(|e| schema(format!("feature {i}: {e}")))?;
            Ok(Zone {
                id: text("ZoneID")?.to_string(),
                geometry: parse_polygon(coords)?,
                centroid_lat: number("centroid_lat")?,
                centroid_lon: number("centroid_lon")?,
                region,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Polygon};

    fn zone(id: &str) -> Zone {
        let ring = LineString::from(vec![(77.5, 12.9), (77.52, 12.9), (77.52, 12.92), (77.5, 12.92), (77.5, 12.9)]);
        Zone {
            id: id.to_string(),
            geometry: Polygon::new(ring, vec![]),
            centroid_lat: 12.91,
            centroid_lon: 77.51,
            region: Region::SW,
        }
    }

    #[test]
    fn zones_survive_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("solar-zones-geojson-{}", std::process::id()));
        let path = dir.join("zones.geojson");
        let zones = vec![zone("T-0001"), zone("T-0002")];
        write_zones(&zones, &path).unwrap();
        let back = read_zones(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[1].id, "T-0002");
        assert_eq!(back[0].region, Region::SW);
        assert_eq!(back[0].geometry, zones[0].geometry);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_property_is_schema_error() {
        let dir = std::env::temp_dir().join(format!("solar-zones-geojson-bad-{}", std::process::id()));
        let path = dir.join("zones.geojson");
        let mut value = zones_to_geojson(&[zone("T-0001")]);
        value["features"][0]["properties"]
            .as_object_mut()
            .unwrap()
            .remove("region");
        fs::create_dir_all(&dir).unwrap();
        fs::write(&path, value.to_string()).unwrap();
        assert!(matches!(read_zones(&path), Err(PipelineError::Schema { .. })));
        let _ = fs::remove_dir_all(&dir);
    }
}
