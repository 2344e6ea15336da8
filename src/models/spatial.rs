//! Geographic primitives: OSM identity, lon/lat points and bounding boxes.

use std::f64::consts::FRAC_PI_2;

use geo::{Distance, Haversine, Point, Rect};
use rstar::AABB;
use serde::{Deserialize, Serialize};

/// Mean earth radius used by `geo`'s haversine measure, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Padding added to buffered boxes so points exactly at the radius stay inside.
const BUFFER_EPSILON_DEG: f64 = 1e-7;

/// Type of OSM object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsmType {
    Node,
    Way,
    Relation,
}

impl OsmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsmType::Node => "node",
            OsmType::Way => "way",
            OsmType::Relation => "relation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "node" => Some(OsmType::Node),
            "way" => Some(OsmType::Way),
            "relation" => Some(OsmType::Relation),
            _ => None,
        }
    }
}

impl std::fmt::Display for OsmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geographic point (lat/lon)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in meters.
    pub fn haversine_distance(&self, other: &GeoPoint) -> f64 {
        Haversine.distance(Point::from(*self), Point::from(*other))
    }

    /// Exact bit pattern of the coordinates, usable as a hash key.
    pub fn bits(&self) -> (u64, u64) {
        (self.lon.to_bits(), self.lat.to_bits())
    }
}

impl From<GeoPoint> for Point<f64> {
    fn from(p: GeoPoint) -> Self {
        Point::new(p.lon, p.lat)
    }
}

impl From<Point<f64>> for GeoPoint {
    fn from(p: Point<f64>) -> Self {
        GeoPoint::new(p.x(), p.y())
    }
}

/// Axis-aligned lon/lat box.
///
/// Boxes produced by [`GeoBbox::around`] may extend past ±180° of longitude when
/// the buffered circle crosses the antimeridian. Use [`GeoBbox::normalized`] for a
/// single valid rectangle or [`GeoBbox::split_antimeridian`] for exact parts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBbox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl GeoBbox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    pub fn from_point(p: GeoPoint) -> Self {
        Self::new(p.lon, p.lat, p.lon, p.lat)
    }

    /// Smallest box holding every point within `radius_m` meters of `center`.
    ///
    /// Uses the spherical-cap bound: the longitude half-width grows as
    /// `asin(sin(d) / cos(lat))`, and a cap reaching a pole spans every longitude.
    pub fn around(center: GeoPoint, radius_m: f64) -> Self {
        let angular = (radius_m / EARTH_RADIUS_M).max(0.0);
        let dlat = angular.to_degrees() + BUFFER_EPSILON_DEG;
        let min_lat = (center.lat - dlat).max(-90.0);
        let max_lat = (center.lat + dlat).min(90.0);

        if min_lat <= -90.0 || max_lat >= 90.0 || angular >= FRAC_PI_2 {
            return Self::new(-180.0, min_lat, 180.0, max_lat);
        }

        let ratio = angular.sin() / center.lat.to_radians().cos();
        if ratio >= 1.0 {
            return Self::new(-180.0, min_lat, 180.0, max_lat);
        }

        let dlon = ratio.asin().to_degrees() + BUFFER_EPSILON_DEG;
        Self::new(center.lon - dlon, min_lat, center.lon + dlon, max_lat)
    }

    pub fn union(&self, other: &GeoBbox) -> Self {
        Self::new(
            self.min_lon.min(other.min_lon),
            self.min_lat.min(other.min_lat),
            self.max_lon.max(other.max_lon),
            self.max_lat.max(other.max_lat),
        )
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.min_lon < -180.0 || self.max_lon > 180.0
    }

    /// Clamp into one valid WGS84 rectangle. A box crossing the antimeridian
    /// widens to every longitude.
    pub fn normalized(&self) -> Self {
        let min_lat = self.min_lat.max(-90.0);
        let max_lat = self.max_lat.min(90.0);
        if self.crosses_antimeridian() {
            Self::new(-180.0, min_lat, 180.0, max_lat)
        } else {
            Self::new(self.min_lon, min_lat, self.max_lon, max_lat)
        }
    }

    /// Valid rectangles covering this box, wrapping the overhang past ±180°.
    pub fn split_antimeridian(&self) -> Vec<GeoBbox> {
        let min_lat = self.min_lat.max(-90.0);
        let max_lat = self.max_lat.min(90.0);

        if self.max_lon - self.min_lon >= 360.0 {
            return vec![Self::new(-180.0, min_lat, 180.0, max_lat)];
        }

        let mut parts = vec![Self::new(
            self.min_lon.max(-180.0),
            min_lat,
            self.max_lon.min(180.0),
            max_lat,
        )];
        if self.min_lon < -180.0 {
            parts.push(Self::new(self.min_lon + 360.0, min_lat, 180.0, max_lat));
        }
        if self.max_lon > 180.0 {
            parts.push(Self::new(-180.0, min_lat, self.max_lon - 360.0, max_lat));
        }
        parts
    }

    /// Inclusive point test.
    pub fn contains_point(&self, p: GeoPoint) -> bool {
        p.lon >= self.min_lon && p.lon <= self.max_lon && p.lat >= self.min_lat && p.lat <= self.max_lat
    }

    pub fn contains(&self, other: &GeoBbox) -> bool {
        other.min_lon >= self.min_lon
            && other.max_lon <= self.max_lon
            && other.min_lat >= self.min_lat
            && other.max_lat <= self.max_lat
    }

    /// `left,bottom,right,top`, the form `osmium extract -b` expects.
    pub fn to_osmium_arg(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }

    pub fn to_aabb(&self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.min_lon, self.min_lat], [self.max_lon, self.max_lat])
    }
}

impl From<Rect<f64>> for GeoBbox {
    fn from(rect: Rect<f64>) -> Self {
        GeoBbox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}
