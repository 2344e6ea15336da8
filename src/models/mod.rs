//! Core data models for the enrichment engine.

pub mod admin;
pub mod feature;
pub mod keys;
pub mod poi;
pub mod spatial;

pub use admin::{BoundaryAttribution, BoundaryLevel, BoundaryRegion};
pub use feature::{CollectionRole, Feature, FeatureId, NamedCollection, Tags};
pub use poi::PointOfInterest;
pub use spatial::{GeoBbox, GeoPoint, OsmType, EARTH_RADIUS_M};
