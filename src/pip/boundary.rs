//! Boundary region loading from GeoJSON datasets (Natural Earth or OSM exports).

use std::path::{Path, PathBuf};

use geo::{Geometry, MultiPolygon};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::OverlapPolicy;
use crate::error::BoundaryLoadError;
use crate::io::read_feature_collection;
use crate::models::{BoundaryLevel, BoundaryRegion};

/// Property names tried in order for a region's display name.
const COUNTRY_NAME_FIELDS: &[&str] = &["ADMIN", "NAME", "NAME_LONG", "SOVEREIGNT", "name"];
const SUBDIVISION_NAME_FIELDS: &[&str] = &["name", "NAME", "NAME_1", "admin", "ADMIN1"];

/// Property names tried in order for a region's ISO code.
const COUNTRY_CODE_FIELDS: &[&str] = &["ISO_A2", "ISO_A2_EH", "ISO_A3", "ADM0_A3", "iso_a2"];
const SUBDIVISION_CODE_FIELDS: &[&str] = &["iso_3166_2", "ISO_3166_2", "code_hasc"];

/// Natural Earth's placeholder for "no code".
const MISSING_CODE: &str = "-99";

/// Locations of the two boundary datasets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundarySources {
    pub countries: PathBuf,
    pub subdivisions: PathBuf,
    #[serde(default)]
    pub overlap: OverlapPolicy,
}

/// Load every polygonal feature of a boundary dataset, in source order.
pub fn load_regions(
    path: &Path,
    level: BoundaryLevel,
) -> Result<Vec<BoundaryRegion>, BoundaryLoadError> {
    if !path.exists() {
        return Err(BoundaryLoadError::Missing(path.to_path_buf()));
    }

    info!("Loading {:?} boundaries from {}", level, path.display());
    let fc = read_feature_collection(path)?;

    let (name_fields, code_fields) = match level {
        BoundaryLevel::Country => (COUNTRY_NAME_FIELDS, COUNTRY_CODE_FIELDS),
        BoundaryLevel::Subdivision => (SUBDIVISION_NAME_FIELDS, SUBDIVISION_CODE_FIELDS),
    };

    let mut regions = Vec::new();
    for (order, feature) in fc.features.into_iter().enumerate() {
        let Some(geometry) = feature.geometry else {
            continue;
        };

        let geometry = match Geometry::<f64>::try_from(geometry) {
            Ok(Geometry::Polygon(p)) => MultiPolygon::new(vec![p]),
            Ok(Geometry::MultiPolygon(mp)) => mp,
            Ok(_) => {
                debug!("Skipping non-polygonal boundary feature {}", order);
                continue;
            }
            Err(e) => {
                debug!("Skipping invalid boundary feature {}: {}", order, e);
                continue;
            }
        };

        let properties = feature.properties.unwrap_or_default();
        regions.push(BoundaryRegion {
            level,
            order,
            name: first_property(&properties, name_fields),
            code: first_property(&properties, code_fields),
            geometry,
        });
    }

    if regions.is_empty() {
        return Err(BoundaryLoadError::Empty(path.to_path_buf()));
    }

    info!("Loaded {} {:?} regions", regions.len(), level);
    Ok(regions)
}

fn first_property(properties: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| {
        properties
            .get(*field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != MISSING_CODE)
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_source() {
        let err = load_regions(Path::new("/nonexistent/countries.geojson"), BoundaryLevel::Country)
            .unwrap_err();
        assert!(matches!(err, BoundaryLoadError::Missing(_)));
    }

    #[test]
    fn test_code_fallback_skips_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("countries.geojson");
        std::fs::write(
            &path,
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature",
                 "properties": {"ADMIN": "France", "ISO_A2": "-99", "ISO_A2_EH": "FR"},
                 "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
                {"type": "Feature", "properties": {"ADMIN": "Line"},
                 "geometry": {"type": "LineString", "coordinates": [[0,0],[1,1]]}}
            ]}"#,
        )
        .unwrap();

        let regions = load_regions(&path, BoundaryLevel::Country).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].name.as_deref(), Some("France"));
        assert_eq!(regions[0].code.as_deref(), Some("FR"));
    }

    #[test]
    fn test_no_polygons_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("states.geojson");
        std::fs::write(&path, r#"{"type": "FeatureCollection", "features": []}"#).unwrap();

        assert!(matches!(
            load_regions(&path, BoundaryLevel::Subdivision),
            Err(BoundaryLoadError::Empty(_))
        ));
    }
}
