//! Points-of-interest (ski areas) used as anchors for association.

use std::sync::Arc;

use geo::{BoundingRect, Contains, Geometry, MultiPolygon, Point};

use super::feature::{Feature, FeatureId};
use super::spatial::{GeoBbox, GeoPoint};

/// A named area with its cached centroid and bounding box.
#[derive(Debug, Clone)]
pub struct PointOfInterest {
    pub id: FeatureId,
    pub name: Option<String>,
    /// `name:en`, preferred in reports.
    pub name_en: Option<String>,
    pub geometry: Arc<Geometry<f64>>,
    /// Polygonal extent for containment; `None` for point-only areas.
    pub extent: Option<MultiPolygon<f64>>,
    pub centroid: GeoPoint,
    pub bbox: GeoBbox,
}

impl PointOfInterest {
    /// `None` when the geometry is empty and has no centroid.
    pub fn from_feature(feature: &Feature) -> Option<Self> {
        let centroid = feature.representative_point()?;
        let bbox = feature
            .geometry
            .bounding_rect()
            .map(GeoBbox::from)
            .unwrap_or_else(|| GeoBbox::from_point(centroid));

        let extent = match feature.geometry.as_ref() {
            Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
            Geometry::MultiPolygon(mp) => Some(mp.clone()),
            Geometry::Rect(r) => Some(MultiPolygon::new(vec![r.to_polygon()])),
            _ => None,
        };

        Some(Self {
            id: feature.id,
            name: feature.name().map(str::to_string),
            name_en: feature.tag_str("name:en").map(str::to_string),
            geometry: Arc::clone(&feature.geometry),
            extent,
            centroid,
            bbox,
        })
    }

    /// English name, then local name, then `type/id`.
    pub fn display_name(&self) -> String {
        self.name_en
            .as_ref()
            .or(self.name.as_ref())
            .cloned()
            .unwrap_or_else(|| self.id.to_string())
    }

    /// Exact containment; always false for point-only areas.
    pub fn contains(&self, point: GeoPoint) -> bool {
        if !self.bbox.contains_point(point) {
            return false;
        }
        match &self.extent {
            Some(extent) => extent.contains(&Point::from(point)),
            None => false,
        }
    }
}
