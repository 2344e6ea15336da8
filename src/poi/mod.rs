//! Point-of-interest (ski area) index.

mod index;

pub use index::{PoiIndex, LINEAR_SCAN_THRESHOLD};

use tracing::warn;

use crate::models::{Feature, PointOfInterest};

/// Points-of-interest for every feature with a usable centroid, in order.
pub fn points_of_interest(features: &[Feature]) -> Vec<PointOfInterest> {
    let pois: Vec<PointOfInterest> = features
        .iter()
        .filter_map(PointOfInterest::from_feature)
        .collect();

    if pois.len() < features.len() {
        warn!(
            "{} points-of-interest without a centroid were skipped",
            features.len() - pois.len()
        );
    }
    pois
}
