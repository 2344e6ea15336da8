//! Boundary and ski area attribution over whole feature collections.

use std::time::{Duration, Instant};

use hashbrown::HashSet;
use rayon::prelude::*;
use serde_json::Value;
use tracing::info;

use crate::models::{
    keys, BoundaryAttribution, CollectionRole, Feature, GeoPoint, NamedCollection,
};
use crate::pip::BoundaryIndex;
use crate::poi::PoiIndex;

/// Counts of what one collection's enrichment could not attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub collection: String,
    pub features: usize,
    pub without_point: usize,
    pub without_country: usize,
    pub without_state: usize,
    pub without_ski_area: usize,
    pub elapsed: Duration,
}

impl EnrichReport {
    pub fn log(&self) {
        info!(
            "Enriched {} ({} features) in {:.2}s: {} without country, {} without state, {} without ski area, {} without geometry",
            self.collection,
            self.features,
            self.elapsed.as_secs_f64(),
            self.without_country,
            self.without_state,
            self.without_ski_area,
            self.without_point
        );
    }
}

#[derive(Default, Clone, Copy)]
struct Outcome {
    no_point: bool,
    no_country: bool,
    no_state: bool,
    no_ski_area: bool,
}

/// Stamps features with `country`, `state` and `ski_area` using indexes
/// built once per run.
pub struct BatchEnricher<'a> {
    boundaries: &'a BoundaryIndex,
    pois: &'a PoiIndex,
}

impl<'a> BatchEnricher<'a> {
    pub fn new(boundaries: &'a BoundaryIndex, pois: &'a PoiIndex) -> Self {
        Self { boundaries, pois }
    }

    /// Enrich independent collections in parallel, preserving their order.
    pub fn enrich_all(&self, collections: Vec<NamedCollection>) -> Vec<NamedCollection> {
        collections
            .into_par_iter()
            .map(|mut collection| {
                self.enrich_collection(&mut collection).log();
                collection
            })
            .collect()
    }

    /// One batched boundary classification for the collection, then a
    /// containment query per feature.
    ///
    /// Boundary attribution is keyed on the representative point, so fan-out
    /// copies of a feature always receive the same values.
    pub fn enrich_collection(&self, collection: &mut NamedCollection) -> EnrichReport {
        let start = Instant::now();

        let points: Vec<Option<GeoPoint>> = collection
            .features
            .par_iter()
            .map(Feature::representative_point)
            .collect();

        let mut seen = HashSet::new();
        let unique: Vec<((u64, u64), GeoPoint)> = points
            .iter()
            .flatten()
            .filter(|p| seen.insert(p.bits()))
            .map(|p| (p.bits(), *p))
            .collect();
        let attributions = self.boundaries.classify_batch(&unique);

        let role = collection.role;
        let outcomes: Vec<Outcome> = collection
            .features
            .par_iter_mut()
            .zip(points.par_iter())
            .map(|(feature, point)| {
                let attribution = point
                    .and_then(|p| attributions.get(&p.bits()))
                    .cloned()
                    .unwrap_or_default();
                let ski_area = self.ski_area(feature, *point, role);

                let outcome = Outcome {
                    no_point: point.is_none(),
                    no_country: attribution.country.is_none(),
                    no_state: attribution.subdivision.is_none(),
                    no_ski_area: ski_area.is_none(),
                };
                apply(feature, attribution, ski_area);
                outcome
            })
            .collect();

        let mut report = EnrichReport {
            collection: collection.name.clone(),
            features: collection.features.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            report.without_point += outcome.no_point as usize;
            report.without_country += outcome.no_country as usize;
            report.without_state += outcome.no_state as usize;
            report.without_ski_area += outcome.no_ski_area as usize;
        }
        report.elapsed = start.elapsed();
        report
    }

    fn ski_area(&self, feature: &Feature, point: Option<GeoPoint>, role: CollectionRole) -> Option<String> {
        match role {
            CollectionRole::SkiAreas => feature.name().map(str::to_string),
            CollectionRole::Nearby => feature
                .tag_str(keys::SKI_AREA_NAME)
                .map(str::to_string)
                .or_else(|| self.containing_name(point)),
            CollectionRole::Standalone => self.containing_name(point),
        }
    }

    fn containing_name(&self, point: Option<GeoPoint>) -> Option<String> {
        point
            .and_then(|p| self.pois.containing(p))
            .and_then(|poi| poi.name.clone())
    }
}

/// Known values overwrite; unknown values are written as `null` only when the
/// key is absent, so existing tags are never lost.
fn apply(feature: &mut Feature, attribution: BoundaryAttribution, ski_area: Option<String>) {
    let values = [
        (keys::COUNTRY, attribution.country),
        (keys::COUNTRY_CODE, attribution.country_code),
        (keys::STATE, attribution.subdivision),
        (keys::STATE_CODE, attribution.subdivision_code),
        (keys::SKI_AREA, ski_area),
    ];
    for (key, value) in values {
        match value {
            Some(v) => {
                feature.tags.insert(key.to_string(), Value::String(v));
            }
            None => {
                feature.tags.entry(key.to_string()).or_insert(Value::Null);
            }
        }
    }
}

/// Enrich every collection against indexes loaded once for the run.
pub fn enrich_all(
    collections: Vec<NamedCollection>,
    boundaries: &BoundaryIndex,
    pois: &PoiIndex,
) -> Vec<NamedCollection> {
    BatchEnricher::new(boundaries, pois).enrich_all(collections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundaryLevel, BoundaryRegion, FeatureId, OsmType, PointOfInterest, Tags};
    use crate::pip::OverlapPolicy;
    use geo::{polygon, Geometry, MultiPolygon, Point};

    fn square(level: BoundaryLevel, order: usize, name: &str, min: (f64, f64), max: (f64, f64)) -> BoundaryRegion {
        BoundaryRegion {
            level,
            order,
            name: Some(name.to_string()),
            code: Some(format!("{}-{}", name.len(), order)),
            geometry: MultiPolygon::new(vec![polygon![
                (x: min.0, y: min.1),
                (x: max.0, y: min.1),
                (x: max.0, y: max.1),
                (x: min.0, y: max.1),
                (x: min.0, y: min.1),
            ]]),
        }
    }

    fn boundaries() -> BoundaryIndex {
        BoundaryIndex::from_regions(
            vec![square(BoundaryLevel::Country, 0, "Iceland", (-25.0, 63.0), (-13.0, 67.0))],
            vec![
                square(BoundaryLevel::Subdivision, 0, "Capital Region", (-22.5, 63.8), (-21.0, 64.5)),
                square(BoundaryLevel::Subdivision, 1, "Southern Region", (-22.0, 63.0), (-13.0, 64.3)),
            ],
            OverlapPolicy::FirstLoaded,
        )
    }

    fn pois() -> PoiIndex {
        let mut tags = Tags::new();
        tags.insert("name".into(), Value::from("Bláfjöll"));
        let area = Feature::new(
            FeatureId::new(OsmType::Way, 1),
            Geometry::Polygon(polygon![
                (x: -21.7, y: 63.95),
                (x: -21.6, y: 63.95),
                (x: -21.6, y: 64.0),
                (x: -21.7, y: 64.0),
                (x: -21.7, y: 63.95),
            ]),
            tags,
        );
        PoiIndex::build(vec![PointOfInterest::from_feature(&area).unwrap()])
    }

    fn node(id: i64, lon: f64, lat: f64) -> Feature {
        Feature::new(
            FeatureId::new(OsmType::Node, id),
            Geometry::Point(Point::new(lon, lat)),
            Tags::new(),
        )
    }

    #[test]
    fn test_international_waters_kept_with_nulls() {
        let (boundaries, pois) = (boundaries(), pois());
        let mut collection = NamedCollection::new("lifts", CollectionRole::Standalone, vec![node(1, -30.0, 60.0)]);

        let report = BatchEnricher::new(&boundaries, &pois).enrich_collection(&mut collection);

        assert_eq!(collection.len(), 1);
        let tags = &collection.features[0].tags;
        assert_eq!(tags[keys::COUNTRY], Value::Null);
        assert_eq!(tags[keys::STATE], Value::Null);
        assert_eq!(tags[keys::SKI_AREA], Value::Null);
        assert_eq!(report.without_country, 1);
    }

    #[test]
    fn test_containment_and_boundaries() {
        let (boundaries, pois) = (boundaries(), pois());
        let mut collection = NamedCollection::new("pistes", CollectionRole::Standalone, vec![node(1, -21.65, 63.97)]);

        BatchEnricher::new(&boundaries, &pois).enrich_collection(&mut collection);

        let feature = &collection.features[0];
        assert_eq!(feature.tag_str(keys::COUNTRY), Some("Iceland"));
        // Inside both subdivisions: the first loaded wins.
        assert_eq!(feature.tag_str(keys::STATE), Some("Capital Region"));
        assert_eq!(feature.tag_str(keys::SKI_AREA), Some("Bláfjöll"));
    }

    #[test]
    fn test_fan_out_invariant() {
        let (boundaries, pois) = (boundaries(), pois());
        let mut a = node(7, -21.3, 64.1);
        a.set_tag(keys::SKI_AREA_NAME, "West");
        let mut b = node(7, -21.3, 64.1);
        b.set_tag(keys::SKI_AREA_NAME, "East");
        let alone = node(7, -21.3, 64.1);

        let collections = enrich_all(
            vec![
                NamedCollection::new("nearby", CollectionRole::Nearby, vec![a, b]),
                NamedCollection::new("alone", CollectionRole::Standalone, vec![alone]),
            ],
            &boundaries,
            &pois,
        );

        let fanned = &collections[0].features;
        let single = &collections[1].features[0];
        for record in fanned {
            for key in [keys::COUNTRY, keys::COUNTRY_CODE, keys::STATE, keys::STATE_CODE] {
                assert_eq!(record.tags[key], single.tags[key]);
            }
        }
        assert_eq!(fanned[0].tag_str(keys::SKI_AREA), Some("West"));
        assert_eq!(fanned[1].tag_str(keys::SKI_AREA), Some("East"));
    }

    #[test]
    fn test_idempotent() {
        let (boundaries, pois) = (boundaries(), pois());
        let enricher = BatchEnricher::new(&boundaries, &pois);
        let features = vec![node(1, -21.65, 63.97), node(2, -30.0, 60.0), node(3, -15.0, 65.0)];

        let once = enricher.enrich_all(vec![NamedCollection::new("lifts", CollectionRole::Standalone, features)]);
        let twice = enricher.enrich_all(once.clone());

        for (a, b) in once[0].features.iter().zip(&twice[0].features) {
            assert_eq!(
                serde_json::to_string(&a.tags).unwrap(),
                serde_json::to_string(&b.tags).unwrap()
            );
        }
    }

    #[test]
    fn test_ski_area_collection_uses_own_name() {
        let (boundaries, pois) = (boundaries(), pois());
        let mut area = node(9, -18.0, 65.5);
        area.set_tag("name", "Hlíðarfjall");
        let mut collection = NamedCollection::new("ski_areas", CollectionRole::SkiAreas, vec![area]);

        BatchEnricher::new(&boundaries, &pois).enrich_collection(&mut collection);
        assert_eq!(collection.features[0].tag_str(keys::SKI_AREA), Some("Hlíðarfjall"));
    }

    #[test]
    fn test_existing_tags_preserved() {
        let (boundaries, pois) = (boundaries(), pois());
        let mut feature = node(1, -30.0, 60.0);
        feature.set_tag(keys::COUNTRY, "Atlantis");
        feature.set_tag("aerialway", "t-bar");
        let mut collection = NamedCollection::new("lifts", CollectionRole::Standalone, vec![feature]);

        BatchEnricher::new(&boundaries, &pois).enrich_collection(&mut collection);
        let feature = &collection.features[0];
        assert_eq!(feature.tag_str(keys::COUNTRY), Some("Atlantis"));
        assert_eq!(feature.tag_str("aerialway"), Some("t-bar"));
    }
}
