//! One bounded extraction per category, then local partitioning by distance.

use std::path::Path;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde_json::Value;
use tracing::{info, warn};

use super::{merged_envelope, Extractor, FeatureCategory};
use crate::error::ExtractionError;
use crate::models::{keys, CollectionRole, Feature, GeoBbox, NamedCollection, PointOfInterest};
use crate::poi::PoiIndex;

/// A feature paired with one point-of-interest within radius.
#[derive(Debug, Clone)]
pub struct Association<'a> {
    pub feature: &'a Feature,
    pub poi: &'a PointOfInterest,
    pub distance_meters: f64,
}

impl Association<'_> {
    /// Shallow copy of the feature annotated with the point-of-interest.
    pub fn to_record(&self) -> Feature {
        let mut record = self.feature.clone();
        record.set_tag(keys::SKI_AREA_ID, self.poi.id.osm_id);
        record.set_tag(keys::SKI_AREA_TYPE, self.poi.id.osm_type.as_str());
        record.set_tag(keys::SKI_AREA_NAME, self.poi.name.clone());
        record.set_tag(keys::DISTANCE_METERS, round_meters(self.distance_meters));
        record
    }
}

fn round_meters(distance: f64) -> Value {
    Value::from((distance * 10.0).round() / 10.0)
}

/// Output of one association run.
#[derive(Debug)]
pub struct AssociationRun {
    /// `None` when there were no points-of-interest and nothing was extracted.
    pub envelope: Option<GeoBbox>,
    pub collections: Vec<NamedCollection>,
}

/// Associates extracted features with every point-of-interest within a fixed radius.
pub struct ProximityAssociator<E> {
    extractor: E,
    radius_m: f64,
    categories: Vec<FeatureCategory>,
    show_progress: bool,
}

impl<E: Extractor> ProximityAssociator<E> {
    pub fn new(extractor: E, radius_m: f64, categories: Vec<FeatureCategory>) -> Self {
        Self {
            extractor,
            radius_m,
            categories,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn radius(&self) -> f64 {
        self.radius_m
    }

    /// Clip the source to the merged envelope once, extract each category
    /// from the clip and associate.
    ///
    /// Any extraction failure aborts the whole run.
    pub async fn run(
        &self,
        source: &Path,
        pois: &PoiIndex,
    ) -> Result<AssociationRun, ExtractionError> {
        let envelope = merged_envelope(pois.iter().map(|p| p.centroid), self.radius_m);

        let Some(envelope) = envelope else {
            warn!("No points-of-interest; skipping extraction");
            return Ok(AssociationRun {
                envelope: None,
                collections: self
                    .categories
                    .iter()
                    .map(|c| NamedCollection::new(&c.name, CollectionRole::Nearby, Vec::new()))
                    .collect(),
            });
        };

        info!(
            "Merged envelope for {} points-of-interest at {} m: {}",
            pois.len(),
            self.radius_m,
            envelope.to_osmium_arg()
        );

        // The full source is read once; categories are cut from the clip.
        let clip = self.extractor.clip(source, &envelope).await?;

        let mut collections = Vec::with_capacity(self.categories.len());
        for category in &self.categories {
            let start = Instant::now();
            let features = self.extractor.extract(&clip, category).await?;
            let extracted = features.len();

            let records = self.associate(&features, pois);
            info!(
                "{}: {} extracted, {} association records in {:.1}s",
                category.name,
                extracted,
                records.len(),
                start.elapsed().as_secs_f64()
            );
            collections.push(NamedCollection::new(
                &category.name,
                CollectionRole::Nearby,
                records,
            ));
        }

        Ok(AssociationRun {
            envelope: Some(envelope),
            collections,
        })
    }

    /// One record per (feature, point-of-interest) pair within radius,
    /// in feature order then nearest first. Unmatched features are dropped.
    pub fn associate(&self, features: &[Feature], pois: &PoiIndex) -> Vec<Feature> {
        let pb = if self.show_progress {
            let pb = ProgressBar::new(features.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let records: Vec<Feature> = features
            .par_iter()
            .flat_map_iter(|feature| {
                pb.inc(1);
                self.associations(feature, pois)
                    .into_iter()
                    .map(|a| a.to_record())
                    .collect::<Vec<_>>()
            })
            .collect();

        pb.finish_and_clear();
        records
    }

    /// Associations for a single feature, nearest first.
    pub fn associations<'a>(
        &self,
        feature: &'a Feature,
        pois: &'a PoiIndex,
    ) -> Vec<Association<'a>> {
        let Some(point) = feature.representative_point() else {
            return Vec::new();
        };
        pois.within_radius(point, self.radius_m)
            .into_iter()
            .map(|(poi, distance_meters)| Association {
                feature,
                poi,
                distance_meters,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureId, GeoPoint, OsmType, Tags, EARTH_RADIUS_M};
    use geo::{Geometry, Point};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeExtractor {
        features: Vec<Feature>,
        clips: AtomicUsize,
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeExtractor {
        fn new(features: Vec<Feature>) -> Self {
            Self {
                features,
                clips: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    impl Extractor for FakeExtractor {
        type Clip = ();

        async fn clip(&self, _source: &Path, _envelope: &GeoBbox) -> Result<(), ExtractionError> {
            self.clips.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn extract(
            &self,
            _clip: &(),
            _category: &FeatureCategory,
        ) -> Result<Vec<Feature>, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ExtractionError::EmptyOutput("lifts.geojson".into()));
            }
            Ok(self.features.clone())
        }
    }

    const REYKJAVIK: (f64, f64) = (-21.9, 64.15);

    fn poi(id: i64, name: &str, lon: f64, lat: f64) -> PointOfInterest {
        let mut tags = Tags::new();
        tags.insert("name".into(), Value::from(name));
        let feature = Feature::new(
            FeatureId::new(OsmType::Way, id),
            Geometry::Point(Point::new(lon, lat)),
            tags,
        );
        PointOfInterest::from_feature(&feature).unwrap()
    }

    /// A node `meters` due north of (lon, lat).
    fn node_north(id: i64, lon: f64, lat: f64, meters: f64) -> Feature {
        let dlat = (meters / EARTH_RADIUS_M).to_degrees();
        Feature::new(
            FeatureId::new(OsmType::Node, id),
            Geometry::Point(Point::new(lon, lat + dlat)),
            Tags::new(),
        )
    }

    #[tokio::test]
    async fn test_one_extraction_per_category() {
        let pois = PoiIndex::build(
            (0..200)
                .map(|i| poi(i, "Area", 7.0 + i as f64 * 0.01, 46.0))
                .collect(),
        );
        let associator = ProximityAssociator::new(
            FakeExtractor::new(vec![]),
            2000.0,
            FeatureCategory::defaults(),
        );

        let run = associator.run(Path::new("alps.osm.pbf"), &pois).await.unwrap();
        assert_eq!(associator.extractor.clips.load(Ordering::SeqCst), 1);
        assert_eq!(associator.extractor.calls.load(Ordering::SeqCst), 3);
        assert_eq!(run.collections.len(), 3);
        assert!(run.envelope.is_some());
    }

    #[tokio::test]
    async fn test_reykjavik_radius() {
        let (lon, lat) = REYKJAVIK;
        let pois = PoiIndex::build(vec![poi(1, "Bláfjöll", lon, lat)]);
        let inside = node_north(10, lon, lat, 4800.0);
        let outside = node_north(11, lon, lat, 5200.0);

        let associator = ProximityAssociator::new(
            FakeExtractor::new(vec![inside, outside]),
            5000.0,
            vec![FeatureCategory::lifts()],
        );
        let run = associator.run(Path::new("iceland.osm.pbf"), &pois).await.unwrap();

        let records = &run.collections[0].features;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.osm_id, 10);
        let distance = records[0].tags[keys::DISTANCE_METERS].as_f64().unwrap();
        assert!((distance - 4800.0).abs() < 1.0);
        assert_eq!(records[0].tag_str(keys::SKI_AREA_NAME), Some("Bláfjöll"));
        assert_eq!(records[0].tags[keys::SKI_AREA_ID], Value::from(1));
        assert_eq!(records[0].tag_str(keys::SKI_AREA_TYPE), Some("way"));
    }

    #[test]
    fn test_radius_is_inclusive() {
        let (lon, lat) = REYKJAVIK;
        let pois = PoiIndex::build(vec![poi(1, "Edge", lon, lat)]);
        let feature = node_north(10, lon, lat, 5000.0);
        let exact = feature
            .representative_point()
            .unwrap()
            .haversine_distance(&GeoPoint::new(lon, lat));

        let at = ProximityAssociator::new(FakeExtractor::new(vec![]), exact, vec![]);
        assert_eq!(at.associate(std::slice::from_ref(&feature), &pois).len(), 1);

        let below = ProximityAssociator::new(FakeExtractor::new(vec![]), exact - 0.01, vec![]);
        assert!(below.associate(std::slice::from_ref(&feature), &pois).is_empty());
    }

    #[test]
    fn test_fan_out_keeps_geometry() {
        let (lon, lat) = REYKJAVIK;
        let pois = PoiIndex::build(vec![
            poi(1, "West", lon - 0.01, lat),
            poi(2, "East", lon + 0.01, lat),
        ]);
        let mut tags = Tags::new();
        tags.insert("aerialway".into(), Value::from("chair_lift"));
        let feature = Feature::new(
            FeatureId::new(OsmType::Way, 5),
            Geometry::Point(Point::new(lon, lat)),
            tags,
        );

        let associator = ProximityAssociator::new(FakeExtractor::new(vec![]), 2000.0, vec![]);
        let records = associator.associate(std::slice::from_ref(&feature), &pois);

        assert_eq!(records.len(), 2);
        assert!(std::sync::Arc::ptr_eq(&records[0].geometry, &records[1].geometry));
        assert!(records.iter().all(|r| r.tag_str("aerialway") == Some("chair_lift")));
        let names: Vec<_> = records.iter().filter_map(|r| r.tag_str(keys::SKI_AREA_NAME)).collect();
        assert!(names.contains(&"West") && names.contains(&"East"));
    }

    #[tokio::test]
    async fn test_extraction_failure_is_fatal() {
        let pois = PoiIndex::build(vec![poi(1, "Area", 7.0, 46.0)]);
        let mut extractor = FakeExtractor::new(vec![]);
        extractor.fail = true;
        let associator = ProximityAssociator::new(extractor, 2000.0, FeatureCategory::defaults());

        let result = associator.run(Path::new("alps.osm.pbf"), &pois).await;
        assert!(result.is_err());
        assert_eq!(associator.extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_points_of_interest() {
        let pois = PoiIndex::build(vec![]);
        let associator = ProximityAssociator::new(
            FakeExtractor::new(vec![]),
            2000.0,
            FeatureCategory::defaults(),
        );

        let run = associator.run(Path::new("alps.osm.pbf"), &pois).await.unwrap();
        assert!(run.envelope.is_none());
        assert_eq!(associator.extractor.clips.load(Ordering::SeqCst), 0);
        assert_eq!(associator.extractor.calls.load(Ordering::SeqCst), 0);
        assert!(run.collections.iter().all(|c| c.is_empty()));
    }
}
