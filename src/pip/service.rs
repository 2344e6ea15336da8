//! Boundary index answering country/subdivision lookups for batches of points.

use std::hash::Hash;

use hashbrown::HashMap;
use tracing::{debug, info};

use super::{load_regions, BoundarySources, LevelIndex, OverlapPolicy};
use crate::error::BoundaryLoadError;
use crate::models::{BoundaryAttribution, BoundaryLevel, BoundaryRegion, GeoPoint};

/// Country and subdivision indexes, built once per run and shared read-only.
pub struct BoundaryIndex {
    countries: LevelIndex,
    subdivisions: LevelIndex,
}

impl BoundaryIndex {
    /// Load both boundary datasets. Either one missing or unreadable is fatal.
    pub fn load(sources: &BoundarySources) -> Result<Self, BoundaryLoadError> {
        let countries = load_regions(&sources.countries, BoundaryLevel::Country)?;
        let subdivisions = load_regions(&sources.subdivisions, BoundaryLevel::Subdivision)?;
        Ok(Self::from_regions(countries, subdivisions, sources.overlap))
    }

    pub fn from_regions(
        countries: Vec<BoundaryRegion>,
        subdivisions: Vec<BoundaryRegion>,
        policy: OverlapPolicy,
    ) -> Self {
        Self {
            countries: LevelIndex::build(BoundaryLevel::Country, countries, policy),
            subdivisions: LevelIndex::build(BoundaryLevel::Subdivision, subdivisions, policy),
        }
    }

    /// Classify every point with one join per level.
    ///
    /// Every input key is present in the result; points outside all regions
    /// map to an empty attribution. Duplicate keys must carry the same point.
    pub fn classify_batch<K>(&self, points: &[(K, GeoPoint)]) -> HashMap<K, BoundaryAttribution>
    where
        K: Eq + Hash + Clone,
    {
        let coords: Vec<GeoPoint> = points.iter().map(|(_, p)| *p).collect();
        let countries = self.countries.join(&coords);
        let subdivisions = self.subdivisions.join(&coords);

        let mut result = HashMap::with_capacity(points.len());
        let mut gaps = 0usize;
        for (((key, _), country), subdivision) in points.iter().zip(countries).zip(subdivisions) {
            let mut attribution = BoundaryAttribution::default();
            if let Some(region) = country {
                attribution.set(region);
            }
            if let Some(region) = subdivision {
                attribution.set(region);
            }
            if attribution.is_empty() {
                gaps += 1;
            }
            result.insert(key.clone(), attribution);
        }

        debug!(
            "Classified {} points ({} outside every boundary)",
            points.len(),
            gaps
        );
        result
    }

    /// Single-point convenience over [`BoundaryIndex::classify_batch`].
    pub fn classify(&self, point: GeoPoint) -> BoundaryAttribution {
        let mut attribution = BoundaryAttribution::default();
        if let Some(region) = self.countries.lookup(point) {
            attribution.set(region);
        }
        if let Some(region) = self.subdivisions.lookup(point) {
            attribution.set(region);
        }
        attribution
    }

    pub fn log_stats(&self) {
        info!(
            "Boundary index: {} countries, {} subdivisions",
            self.countries.len(),
            self.subdivisions.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn region(level: BoundaryLevel, order: usize, name: &str, code: &str, min: f64, max: f64) -> BoundaryRegion {
        BoundaryRegion {
            level,
            order,
            name: Some(name.to_string()),
            code: Some(code.to_string()),
            geometry: MultiPolygon::new(vec![polygon![
                (x: min, y: min),
                (x: max, y: min),
                (x: max, y: max),
                (x: min, y: max),
                (x: min, y: min),
            ]]),
        }
    }

    fn index() -> BoundaryIndex {
        BoundaryIndex::from_regions(
            vec![region(BoundaryLevel::Country, 0, "Iceland", "IS", -25.0, 67.0)],
            vec![
                region(BoundaryLevel::Subdivision, 0, "North", "IS-1", -25.0, 67.0),
                region(BoundaryLevel::Subdivision, 1, "South", "IS-2", -25.0, 67.0),
            ],
            OverlapPolicy::FirstLoaded,
        )
    }

    #[test]
    fn test_classify_batch_covers_every_key() {
        let index = index();
        let points = vec![
            ("inland", GeoPoint::new(-21.9, 64.15)),
            ("ocean", GeoPoint::new(-40.0, 10.0)),
        ];
        let result = index.classify_batch(&points);

        assert_eq!(result.len(), 2);
        assert_eq!(result["inland"].country.as_deref(), Some("Iceland"));
        assert_eq!(result["inland"].country_code.as_deref(), Some("IS"));
        assert_eq!(result["ocean"], BoundaryAttribution::default());
        assert_eq!(index.classify(GeoPoint::new(-21.9, 64.15)), result["inland"]);
    }

    #[test]
    fn test_overlap_deterministic() {
        let index = index();
        let point = [(0, GeoPoint::new(-21.9, 64.15))];
        for _ in 0..10 {
            let result = index.classify_batch(&point);
            assert_eq!(result[&0].subdivision.as_deref(), Some("North"));
            assert_eq!(result[&0].subdivision_code.as_deref(), Some("IS-1"));
        }
    }

    #[test]
    fn test_load_missing_is_fatal() {
        let sources = BoundarySources {
            countries: "/nonexistent/a.geojson".into(),
            subdivisions: "/nonexistent/b.geojson".into(),
            overlap: OverlapPolicy::default(),
        };
        assert!(matches!(
            BoundaryIndex::load(&sources),
            Err(BoundaryLoadError::Missing(_))
        ));
    }
}
