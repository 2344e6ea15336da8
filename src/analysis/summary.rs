//! Per ski area terrain and lift statistics from the association output.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use geo::{ChamberlainDuquetteArea, Distance, Geometry, Haversine, LineString, Point};
use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::info;

use crate::models::{keys, Feature, FeatureId, OsmType, PointOfInterest};
use crate::pip::BoundaryIndex;
use crate::poi::PoiIndex;

/// `aerialway` values that are ski lifts (not stations, pylons, goods lifts).
pub const LIFT_TYPES: &[&str] = &[
    "chair_lift",
    "gondola",
    "cable_car",
    "drag_lift",
    "t-bar",
    "j-bar",
    "platter",
    "magic_carpet",
    "rope_tow",
    "mixed_lift",
];

/// `piste:difficulty` values counted separately.
pub const PISTE_DIFFICULTIES: &[&str] = &[
    "novice",
    "easy",
    "intermediate",
    "advanced",
    "expert",
    "freeride",
    "extreme",
];

/// Width assumed for linear pistes without `piste:width`, in meters.
const DEFAULT_PISTE_WIDTH_M: f64 = 30.0;
const HA_TO_ACRES: f64 = 2.47105;
const M_TO_MI: f64 = 1.0 / 1609.344;
const M2_PER_HA: f64 = 10_000.0;

const DOWNHILL_RESORT: &str = "downhill ski resort";
const NOT_DOWNHILL_RESORT: &str = "not a downhill ski resort";

/// CSV column order, matching [`SkiAreaSummary`]'s fields.
const HEADER: &[&str] = &[
    "ski_area_id",
    "ski_area_type",
    "name",
    "country",
    "state",
    "centroid_lat",
    "centroid_lon",
    "total_area_ha",
    "total_area_acres",
    "skiable_terrain_ha",
    "skiable_terrain_acres",
    "total_lifts",
    "longest_lift_mi",
    "downhill_trails",
    "longest_trail_mi",
    "avg_trail_mi",
    "trails_novice",
    "trails_easy",
    "trails_intermediate",
    "trails_advanced",
    "trails_expert",
    "trails_freeride",
    "trails_extreme",
    "gladed_terrain",
    "snow_park",
    "sledding_tubing",
    "lift_types",
    "resort_type",
];

/// One CSV row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkiAreaSummary {
    pub ski_area_id: i64,
    pub ski_area_type: OsmType,
    pub name: String,
    pub country: Option<String>,
    pub state: Option<String>,
    pub centroid_lat: f64,
    pub centroid_lon: f64,
    pub total_area_ha: f64,
    pub total_area_acres: f64,
    pub skiable_terrain_ha: f64,
    pub skiable_terrain_acres: f64,
    pub total_lifts: usize,
    pub longest_lift_mi: f64,
    pub downhill_trails: usize,
    pub longest_trail_mi: f64,
    pub avg_trail_mi: f64,
    pub trails_novice: usize,
    pub trails_easy: usize,
    pub trails_intermediate: usize,
    pub trails_advanced: usize,
    pub trails_expert: usize,
    pub trails_freeride: usize,
    pub trails_extreme: usize,
    #[serde(serialize_with = "yes_no")]
    pub gladed_terrain: bool,
    #[serde(serialize_with = "yes_no")]
    pub snow_park: bool,
    #[serde(serialize_with = "yes_no")]
    pub sledding_tubing: bool,
    pub lift_types: String,
    pub resort_type: &'static str,
}

fn yes_no<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(if *value { "Yes" } else { "No" })
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn line_length_m(line: &LineString<f64>) -> f64 {
    line.lines()
        .map(|segment| Haversine.distance(Point::from(segment.start), Point::from(segment.end)))
        .sum()
}

/// Great-circle length of linear geometries; zero for everything else.
fn length_m(geometry: &Geometry<f64>) -> Option<f64> {
    match geometry {
        Geometry::Line(l) => Some(Haversine.distance(Point::from(l.start), Point::from(l.end))),
        Geometry::LineString(ls) => Some(line_length_m(ls)),
        Geometry::MultiLineString(mls) => Some(mls.iter().map(line_length_m).sum()),
        _ => None,
    }
}

/// Area in square meters of polygonal geometries.
fn area_m2(geometry: &Geometry<f64>) -> Option<f64> {
    match geometry {
        Geometry::Polygon(p) => Some(p.chamberlain_duquette_unsigned_area()),
        Geometry::MultiPolygon(mp) => Some(mp.chamberlain_duquette_unsigned_area()),
        Geometry::Rect(r) => Some(r.to_polygon().chamberlain_duquette_unsigned_area()),
        _ => None,
    }
}

/// The ski area an association record belongs to.
fn association_key(feature: &Feature) -> Option<FeatureId> {
    let osm_type = feature.tag_str(keys::SKI_AREA_TYPE).and_then(OsmType::parse)?;
    let osm_id = match feature.tags.get(keys::SKI_AREA_ID)? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    Some(FeatureId::new(osm_type, osm_id))
}

/// Summaries for every point-of-interest in load order.
///
/// `nearby` holds association records from any number of collections; a
/// feature seen more than once for the same ski area counts once. Country and
/// state come from one batched classification of all centroids.
pub fn summarize<'a, I>(
    pois: &PoiIndex,
    nearby: I,
    boundaries: Option<&BoundaryIndex>,
) -> Vec<SkiAreaSummary>
where
    I: IntoIterator<Item = &'a Feature>,
{
    let mut by_area: HashMap<FeatureId, Vec<&Feature>> = HashMap::new();
    let mut seen: HashSet<(FeatureId, FeatureId)> = HashSet::new();
    for feature in nearby {
        if let Some(area) = association_key(feature) {
            if seen.insert((area, feature.id)) {
                by_area.entry(area).or_default().push(feature);
            }
        }
    }

    let entries: Vec<&PointOfInterest> = pois.iter().collect();
    let attributions = boundaries.map(|index| {
        let points: Vec<(usize, _)> = entries
            .iter()
            .enumerate()
            .map(|(slot, poi)| (slot, poi.centroid))
            .collect();
        index.classify_batch(&points)
    });

    let summaries: Vec<SkiAreaSummary> = entries
        .par_iter()
        .enumerate()
        .map(|(slot, poi)| {
            let features = by_area.get(&poi.id).map(Vec::as_slice).unwrap_or(&[]);
            let mut summary = summarize_one(poi, features);
            if let Some(attribution) = attributions.as_ref().and_then(|a| a.get(&slot)) {
                summary.country = attribution.country.clone();
                summary.state = attribution.subdivision.clone();
            }
            summary
        })
        .collect();

    info!(
        "Summarized {} ski areas from {} associated features",
        summaries.len(),
        seen.len()
    );
    summaries
}

fn summarize_one(poi: &PointOfInterest, nearby: &[&Feature]) -> SkiAreaSummary {
    let mut skiable_m2 = 0.0;
    let mut downhill_trails = 0;
    let mut trail_lengths: Vec<f64> = Vec::new();
    let mut difficulty_counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut gladed_terrain = false;
    let mut snow_park = false;
    let mut sledding_tubing = false;

    let mut total_lifts = 0;
    let mut longest_lift_m: f64 = 0.0;
    let mut lift_type_counts: BTreeMap<&str, usize> = BTreeMap::new();

    for feature in nearby {
        match feature.tag_str("piste:type") {
            Some("freestyle") => snow_park = true,
            Some("sled") | Some("tubing") => sledding_tubing = true,
            Some("downhill") => {
                downhill_trails += 1;
                if let Some(difficulty) = feature.tag_str("piste:difficulty") {
                    let difficulty = difficulty.to_lowercase();
                    if let Some(known) = PISTE_DIFFICULTIES.iter().find(|d| **d == difficulty) {
                        *difficulty_counts.entry(*known).or_default() += 1;
                    }
                }
                if feature.tag_str("piste:grooming") == Some("no") {
                    gladed_terrain = true;
                }

                if let Some(area) = area_m2(&feature.geometry) {
                    skiable_m2 += area;
                } else if let Some(length) = length_m(&feature.geometry) {
                    let width = feature
                        .tag_str("piste:width")
                        .and_then(|w| w.parse::<f64>().ok())
                        .filter(|w| w.is_finite() && *w > 0.0)
                        .unwrap_or(DEFAULT_PISTE_WIDTH_M);
                    skiable_m2 += length * width;
                    trail_lengths.push(length);
                }
            }
            _ => {}
        }

        if let Some(kind) = feature.tag_str("aerialway") {
            if let Some(lift) = LIFT_TYPES.iter().find(|t| **t == kind) {
                total_lifts += 1;
                *lift_type_counts.entry(*lift).or_default() += 1;
                if let Some(length) = length_m(&feature.geometry) {
                    longest_lift_m = longest_lift_m.max(length);
                }
            }
        }
    }

    let total_area_ha = round_to(area_m2(&poi.geometry).unwrap_or(0.0) / M2_PER_HA, 2);
    let skiable_terrain_ha = round_to(skiable_m2 / M2_PER_HA, 2);
    let longest_trail_m = trail_lengths.iter().copied().fold(0.0, f64::max);
    let avg_trail_m = if trail_lengths.is_empty() {
        0.0
    } else {
        trail_lengths.iter().sum::<f64>() / trail_lengths.len() as f64
    };

    let lift_types = lift_type_counts
        .iter()
        .map(|(kind, count)| format!("{}: {}", kind.replace('_', " "), count))
        .collect::<Vec<_>>()
        .join(", ");

    let is_downhill = skiable_m2 > 0.0 || total_lifts > 0 || downhill_trails > 0;
    let trails = |difficulty: &str| difficulty_counts.get(difficulty).copied().unwrap_or(0);

    SkiAreaSummary {
        ski_area_id: poi.id.osm_id,
        ski_area_type: poi.id.osm_type,
        name: poi.display_name(),
        country: None,
        state: None,
        centroid_lat: round_to(poi.centroid.lat, 6),
        centroid_lon: round_to(poi.centroid.lon, 6),
        total_area_ha,
        total_area_acres: round_to(total_area_ha * HA_TO_ACRES, 0),
        skiable_terrain_ha,
        skiable_terrain_acres: round_to(skiable_terrain_ha * HA_TO_ACRES, 0),
        total_lifts,
        longest_lift_mi: round_to(longest_lift_m * M_TO_MI, 2),
        downhill_trails,
        longest_trail_mi: round_to(longest_trail_m * M_TO_MI, 2),
        avg_trail_mi: round_to(avg_trail_m * M_TO_MI, 2),
        trails_novice: trails("novice"),
        trails_easy: trails("easy"),
        trails_intermediate: trails("intermediate"),
        trails_advanced: trails("advanced"),
        trails_expert: trails("expert"),
        trails_freeride: trails("freeride"),
        trails_extreme: trails("extreme"),
        gladed_terrain,
        snow_park,
        sledding_tubing,
        lift_types,
        resort_type: if is_downhill {
            DOWNHILL_RESORT
        } else {
            NOT_DOWNHILL_RESORT
        },
    }
}

/// Write summaries as CSV. The header is written even with no rows.
pub fn write_csv(path: &Path, summaries: &[SkiAreaSummary]) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(file));

    writer.write_record(HEADER)?;
    for summary in summaries {
        writer.serialize(summary)?;
    }
    writer.flush()?;

    info!("Saved {} analyzed ski areas to {}", summaries.len(), path.display());
    Ok(())
}
