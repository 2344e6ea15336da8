//! Extracted map features and the named collections that carry them.

use std::iter::Peekable;
use std::str::Chars;
use std::sync::Arc;

use geo::{Centroid, Geometry};
use geojson::feature::Id;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::keys;
use super::spatial::{GeoPoint, OsmType};

/// Feature attributes: string keys to string/number/null values.
pub type Tags = Map<String, Value>;

/// Stable identity of a feature in the source dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId {
    pub osm_type: OsmType,
    pub osm_id: i64,
}

impl FeatureId {
    pub fn new(osm_type: OsmType, osm_id: i64) -> Self {
        Self { osm_type, osm_id }
    }
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.osm_type, self.osm_id)
    }
}

/// A geometry plus its tags.
///
/// The geometry is shared (`Arc`) so fan-out copies produced by association
/// point at the same immutable shape; only the tags are per-record.
#[derive(Debug, Clone)]
pub struct Feature {
    pub id: FeatureId,
    pub geometry: Arc<Geometry<f64>>,
    pub tags: Tags,
}

impl Feature {
    pub fn new(id: FeatureId, geometry: Geometry<f64>, tags: Tags) -> Self {
        Self {
            id,
            geometry: Arc::new(geometry),
            tags,
        }
    }

    /// The point itself for point features, the centroid otherwise.
    /// `None` for empty geometries.
    pub fn representative_point(&self) -> Option<GeoPoint> {
        match self.geometry.as_ref() {
            Geometry::Point(p) => Some(GeoPoint::from(*p)),
            other => other.centroid().map(GeoPoint::from),
        }
    }

    /// Non-blank string tag.
    pub fn tag_str(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.tag_str("name").or_else(|| self.tag_str("Name"))
    }

    pub fn set_tag(&mut self, key: &str, value: impl Into<Value>) {
        self.tags.insert(key.to_string(), value.into());
    }

    /// Convert a GeoJSON feature written by `ogr2ogr` (or by this crate).
    ///
    /// `position` is the feature's index in its collection, used as the id of
    /// last resort. Returns `None` for features without a usable geometry.
    pub fn from_geojson(feature: geojson::Feature, position: usize) -> Option<Self> {
        let geometry = match feature.geometry {
            Some(g) => g,
            None => {
                debug!("Skipping feature {} without geometry", position);
                return None;
            }
        };
        let geometry = match geo_types::Geometry::<f64>::try_from(geometry) {
            Ok(g) => g,
            Err(e) => {
                debug!("Skipping feature {}: {}", position, e);
                return None;
            }
        };

        let mut hints = IdHints::default();
        if let Some(id) = &feature.id {
            let (osm_type, osm_id) = parse_feature_id(id);
            hints.feature_type = osm_type;
            hints.feature = osm_id;
        }

        let mut tags = Tags::new();
        let mut other_tags = Vec::new();

        for (key, value) in feature.properties.unwrap_or_default() {
            let identity = match key.as_str() {
                "osm_relation_id" => {
                    hints.relation = parse_id(&value);
                    true
                }
                "osm_way_id" => {
                    hints.way = parse_id(&value);
                    true
                }
                keys::OSM_ID => {
                    hints.osm = parse_id(&value);
                    true
                }
                keys::OSM_TYPE => {
                    hints.osm_type = value.as_str().and_then(OsmType::parse);
                    true
                }
                "id" => {
                    hints.plain = parse_id(&value);
                    true
                }
                "other_tags" => {
                    if let Some(raw) = value.as_str() {
                        other_tags = parse_other_tags(raw);
                    }
                    true
                }
                _ => false,
            };
            if !identity && !is_blank(&value) {
                tags.insert(key, value);
            }
        }

        // Dedicated columns win over the catch-all column.
        for (key, value) in other_tags {
            tags.entry(key).or_insert(Value::String(value));
        }

        let id = hints.resolve(&geometry, position);
        Some(Feature::new(id, geometry, tags))
    }

    /// GeoJSON form with `osm_type`/`osm_id` properties, readable by [`Feature::from_geojson`].
    pub fn to_geojson(&self) -> geojson::Feature {
        let mut properties = self.tags.clone();
        properties.insert(
            keys::OSM_TYPE.to_string(),
            Value::from(self.id.osm_type.as_str()),
        );
        properties.insert(keys::OSM_ID.to_string(), Value::from(self.id.osm_id));

        geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(
                self.geometry.as_ref(),
            ))),
            id: Some(Id::String(self.id.to_string())),
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

/// Identity columns found on a GeoJSON feature.
#[derive(Default)]
struct IdHints {
    relation: Option<i64>,
    way: Option<i64>,
    osm: Option<i64>,
    osm_type: Option<OsmType>,
    plain: Option<i64>,
    feature: Option<i64>,
    feature_type: Option<OsmType>,
}

impl IdHints {
    fn resolve(&self, geometry: &Geometry<f64>, position: usize) -> FeatureId {
        if let Some(id) = self.relation {
            return FeatureId::new(OsmType::Relation, id);
        }
        if let Some(id) = self.way {
            return FeatureId::new(OsmType::Way, id);
        }
        if let (Some(osm_type), Some(id)) = (self.osm_type, self.osm) {
            return FeatureId::new(osm_type, id);
        }
        if let (Some(osm_type), Some(id)) = (self.feature_type, self.feature) {
            return FeatureId::new(osm_type, id);
        }

        let id = self
            .osm
            .or(self.plain)
            .or(self.feature)
            .unwrap_or(position as i64);
        FeatureId::new(osm_type_for(geometry), id)
    }
}

/// ogr2ogr's OSM driver: points are nodes, lines are ways, and the
/// multilinestrings (routes) and multipolygons layers hold relations.
fn osm_type_for(geometry: &Geometry<f64>) -> OsmType {
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => OsmType::Node,
        Geometry::Line(_) | Geometry::LineString(_) => OsmType::Way,
        _ => OsmType::Relation,
    }
}

fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `"way/123"`, `"123"` or a number.
fn parse_feature_id(id: &Id) -> (Option<OsmType>, Option<i64>) {
    match id {
        Id::Number(n) => (None, n.as_i64()),
        Id::String(s) => match s.split_once('/') {
            Some((kind, num)) => (OsmType::parse(kind), num.parse().ok()),
            None => (None, s.parse().ok()),
        },
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Expand ogr2ogr's `other_tags` column: `"key"=>"value","key2"=>"value2"`,
/// or a JSON object when GDAL writes tags as JSON.
pub fn parse_other_tags(raw: &str) -> Vec<(String, String)> {
    let raw = raw.trim();
    if raw.starts_with('{') {
        return match serde_json::from_str::<Map<String, Value>>(raw) {
            Ok(map) => map
                .into_iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect(),
            Err(e) => {
                debug!("Unparseable other_tags object: {}", e);
                Vec::new()
            }
        };
    }

    let mut pairs = Vec::new();
    let mut chars = raw.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let Some(key) = read_quoted(&mut chars) else {
            break;
        };
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        if chars.next() != Some('=') || chars.next() != Some('>') {
            break;
        }
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        let Some(value) = read_quoted(&mut chars) else {
            break;
        };
        pairs.push((key, value));
    }
    pairs
}

fn read_quoted(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
    if chars.next()? != '"' {
        return None;
    }
    let mut out = String::new();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(chars.next()?),
            '"' => return Some(out),
            c => out.push(c),
        }
    }
    None
}

/// How a collection relates to the points-of-interest, which decides its
/// `ski_area` attribution during enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionRole {
    /// The points-of-interest themselves.
    SkiAreas,
    /// Output of proximity association.
    Nearby,
    /// Anything else; attributed by containment.
    #[default]
    Standalone,
}

/// An ordered feature collection with a name (e.g. `lifts`, `pistes`).
#[derive(Debug, Clone)]
pub struct NamedCollection {
    pub name: String,
    pub role: CollectionRole,
    pub features: Vec<Feature>,
}

impl NamedCollection {
    pub fn new(name: impl Into<String>, role: CollectionRole, features: Vec<Feature>) -> Self {
        Self {
            name: name.into(),
            role,
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
