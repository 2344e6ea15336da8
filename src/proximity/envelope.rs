//! Merged extraction envelope over all points-of-interest.

use crate::models::{GeoBbox, GeoPoint};

/// Union of every point's radius-buffered box, as one valid rectangle.
///
/// `None` when there are no points. A union crossing the antimeridian spans
/// every longitude, since the extraction tool takes a single rectangle.
pub fn merged_envelope<I>(points: I, radius_m: f64) -> Option<GeoBbox>
where
    I: IntoIterator<Item = GeoPoint>,
{
    points
        .into_iter()
        .map(|p| GeoBbox::around(p, radius_m))
        .reduce(|acc, b| acc.union(&b))
        .map(|b| b.normalized())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert!(merged_envelope(Vec::new(), 1000.0).is_none());
    }

    #[test]
    fn test_contains_every_buffered_box() {
        let points = vec![
            GeoPoint::new(-21.9, 64.15),
            GeoPoint::new(7.75, 46.02),
            GeoPoint::new(-106.95, 39.19),
        ];
        let envelope = merged_envelope(points.clone(), 5000.0).unwrap();
        for p in points {
            assert!(envelope.contains(&GeoBbox::around(p, 5000.0)));
        }
    }

    #[test]
    fn test_antimeridian_spans_all_longitudes() {
        let points = vec![GeoPoint::new(179.99, -16.5), GeoPoint::new(178.0, -17.0)];
        let envelope = merged_envelope(points, 5000.0).unwrap();
        assert_eq!(envelope.min_lon, -180.0);
        assert_eq!(envelope.max_lon, 180.0);
        assert!(envelope.contains_point(GeoPoint::new(-179.99, -16.5)));
    }

    #[test]
    fn test_near_pole() {
        let envelope = merged_envelope(vec![GeoPoint::new(15.0, 89.98)], 5000.0).unwrap();
        assert_eq!(envelope.max_lat, 90.0);
        assert_eq!(envelope.min_lon, -180.0);
        assert_eq!(envelope.max_lon, 180.0);
    }
}
