//! Spatial index over points-of-interest for containment and radius queries.

use std::collections::BTreeSet;

use rstar::primitives::GeomWithData;
use rstar::{RTree, RTreeObject, AABB};
use tracing::info;

use crate::models::{GeoBbox, GeoPoint, PointOfInterest};

/// Below this many entries queries scan linearly instead of building R-trees.
pub const LINEAR_SCAN_THRESHOLD: usize = 50;

/// Bounding box of a point-of-interest's polygonal extent, keyed by slot.
#[derive(Clone)]
struct IndexedExtent {
    slot: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedExtent {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

type IndexedCentroid = GeomWithData<[f64; 2], usize>;

enum Lookup {
    Linear,
    Tree {
        extents: RTree<IndexedExtent>,
        centroids: RTree<IndexedCentroid>,
    },
}

/// Points-of-interest in load order plus the structure used to query them.
pub struct PoiIndex {
    entries: Vec<PointOfInterest>,
    lookup: Lookup,
}

impl PoiIndex {
    pub fn build(entries: Vec<PointOfInterest>) -> Self {
        Self::build_with_threshold(entries, LINEAR_SCAN_THRESHOLD)
    }

    pub fn build_with_threshold(entries: Vec<PointOfInterest>, threshold: usize) -> Self {
        if entries.len() < threshold {
            info!(
                "Using linear scan for {} points-of-interest",
                entries.len()
            );
            return Self {
                entries,
                lookup: Lookup::Linear,
            };
        }

        info!(
            "Building spatial index for {} points-of-interest...",
            entries.len()
        );

        let extents: Vec<IndexedExtent> = entries
            .iter()
            .enumerate()
            .filter(|(_, poi)| poi.extent.is_some())
            .map(|(slot, poi)| IndexedExtent {
                slot,
                envelope: poi.bbox.to_aabb(),
            })
            .collect();
        let centroids: Vec<IndexedCentroid> = entries
            .iter()
            .enumerate()
            .map(|(slot, poi)| GeomWithData::new([poi.centroid.lon, poi.centroid.lat], slot))
            .collect();

        let extents = RTree::bulk_load(extents);
        let centroids = RTree::bulk_load(centroids);
        info!(
            "Spatial index built with {} extents and {} centroids",
            extents.size(),
            centroids.size()
        );

        Self {
            entries,
            lookup: Lookup::Tree { extents, centroids },
        }
    }

    /// The point-of-interest whose polygon contains `point`.
    /// Earliest loaded wins when several overlap.
    pub fn containing(&self, point: GeoPoint) -> Option<&PointOfInterest> {
        let slot = match &self.lookup {
            Lookup::Linear => self.entries.iter().position(|poi| poi.contains(point)),
            Lookup::Tree { extents, .. } => extents
                .locate_in_envelope_intersecting(&AABB::from_point([point.lon, point.lat]))
                .map(|e| e.slot)
                .filter(|slot| self.entries[*slot].contains(point))
                .min(),
        };
        slot.map(|slot| &self.entries[slot])
    }

    /// Every point-of-interest whose centroid lies within `radius_m` meters
    /// (inclusive) of `point`, nearest first. Invalid radii match nothing.
    pub fn within_radius(&self, point: GeoPoint, radius_m: f64) -> Vec<(&PointOfInterest, f64)> {
        if !radius_m.is_finite() || radius_m < 0.0 {
            return Vec::new();
        }

        let candidates: Vec<usize> = match &self.lookup {
            Lookup::Linear => (0..self.entries.len()).collect(),
            Lookup::Tree { centroids, .. } => {
                let mut slots = BTreeSet::new();
                for part in GeoBbox::around(point, radius_m).split_antimeridian() {
                    slots.extend(centroids.locate_in_envelope(&part.to_aabb()).map(|c| c.data));
                }
                slots.into_iter().collect()
            }
        };

        let mut matches: Vec<(usize, f64)> = candidates
            .into_iter()
            .map(|slot| (slot, point.haversine_distance(&self.entries[slot].centroid)))
            .filter(|(_, distance)| *distance <= radius_m)
            .collect();
        matches.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        matches
            .into_iter()
            .map(|(slot, distance)| (&self.entries[slot], distance))
            .collect()
    }

    /// Iterate in load order
    pub fn iter(&self) -> impl Iterator<Item = &PointOfInterest> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_tree(&self) -> bool {
        matches!(self.lookup, Lookup::Tree { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Feature, FeatureId, OsmType, Tags};
    use geo::{polygon, Geometry, Point};
    use serde_json::Value;

    fn square_poi(id: i64, name: &str, lon: f64, lat: f64, half: f64) -> PointOfInterest {
        let mut tags = Tags::new();
        tags.insert("name".into(), Value::from(name));
        let feature = Feature::new(
            FeatureId::new(OsmType::Way, id),
            Geometry::Polygon(polygon![
                (x: lon - half, y: lat - half),
                (x: lon + half, y: lat - half),
                (x: lon + half, y: lat + half),
                (x: lon - half, y: lat + half),
                (x: lon - half, y: lat - half),
            ]),
            tags,
        );
        PointOfInterest::from_feature(&feature).unwrap()
    }

    fn point_poi(id: i64, lon: f64, lat: f64) -> PointOfInterest {
        let feature = Feature::new(
            FeatureId::new(OsmType::Node, id),
            Geometry::Point(Point::new(lon, lat)),
            Tags::new(),
        );
        PointOfInterest::from_feature(&feature).unwrap()
    }

    fn grid(n: usize) -> Vec<PointOfInterest> {
        (0..n)
            .map(|i| square_poi(i as i64, &format!("Area {i}"), (i % 10) as f64, (i / 10) as f64, 0.1))
            .collect()
    }

    #[test]
    fn test_tree_and_linear_agree() {
        let tree = PoiIndex::build_with_threshold(grid(100), 0);
        let linear = PoiIndex::build_with_threshold(grid(100), usize::MAX);
        assert!(tree.is_tree());
        assert!(!linear.is_tree());

        let query = GeoPoint::new(3.05, 4.02);
        assert_eq!(
            tree.containing(query).map(|p| p.id),
            linear.containing(query).map(|p| p.id)
        );
        assert_eq!(tree.containing(query).unwrap().name.as_deref(), Some("Area 43"));

        let near_tree: Vec<_> = tree.within_radius(query, 200_000.0).iter().map(|(p, _)| p.id).collect();
        let near_linear: Vec<_> = linear.within_radius(query, 200_000.0).iter().map(|(p, _)| p.id).collect();
        assert!(!near_tree.is_empty());
        assert_eq!(near_tree, near_linear);
    }

    #[test]
    fn test_within_radius_sorted_by_distance() {
        let index = PoiIndex::build(vec![point_poi(1, 0.0, 0.02), point_poi(2, 0.0, 0.01)]);
        let hits = index.within_radius(GeoPoint::new(0.0, 0.0), 5000.0);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.id.osm_id, 2);
        assert!(hits[0].1 < hits[1].1);
    }

    #[test]
    fn test_point_poi_never_contains() {
        let index = PoiIndex::build(vec![point_poi(1, 0.0, 0.0)]);
        assert!(index.containing(GeoPoint::new(0.0, 0.0)).is_none());
    }

    #[test]
    fn test_within_radius_across_antimeridian() {
        let index = PoiIndex::build_with_threshold(vec![point_poi(1, -179.99, -16.5)], 0);
        let hits = index.within_radius(GeoPoint::new(179.99, -16.5), 5000.0);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_exact_radius_is_inclusive_on_both_paths() {
        // 60 entries: above the threshold, so `build` takes the tree path.
        let entries = || {
            (0..60)
                .map(|i| point_poi(i, 7.0 + i as f64 * 0.5, 46.0))
                .collect::<Vec<_>>()
        };
        let tree = PoiIndex::build(entries());
        let linear = PoiIndex::build_with_threshold(entries(), usize::MAX);
        assert!(tree.is_tree());

        // North-east of the first entry, where the box corner is tightest.
        let point = GeoPoint::new(7.03, 46.04);
        let exact = point.haversine_distance(&GeoPoint::new(7.0, 46.0));

        for index in [&tree, &linear] {
            let hits = index.within_radius(point, exact);
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].0.id.osm_id, 0);
            assert!(index.within_radius(point, exact - 0.01).is_empty());
        }
    }

    #[test]
    fn test_invalid_radius() {
        let index = PoiIndex::build(vec![point_poi(1, 0.0, 0.0)]);
        assert!(index.within_radius(GeoPoint::new(0.0, 0.0), -1.0).is_empty());
        assert!(index.within_radius(GeoPoint::new(0.0, 0.0), f64::NAN).is_empty());
    }
}
