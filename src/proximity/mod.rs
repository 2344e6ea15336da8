//! Proximity association between extracted features and points-of-interest.
//!
//! The envelope over every point-of-interest is merged first and the source
//! dataset is clipped to it in a single pass, regardless of how many
//! points-of-interest or feature categories there are. Categories are cut
//! from the clip and partitioned locally by distance.

mod associator;
mod envelope;
mod extractor;

pub use associator::{Association, AssociationRun, ProximityAssociator};
pub use envelope::merged_envelope;
pub use extractor::{ClippedSource, Extractor, FeatureCategory, OsmiumExtractor};
