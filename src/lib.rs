//! Skiatlas - geospatial proximity and boundary enrichment for ski areas
//!
//! This library provides the indexes, association and enrichment steps used
//! by the `pipeline` binary.

pub mod analysis;
pub mod config;
pub mod enrich;
pub mod error;
pub mod io;
pub mod models;
pub mod notify;
pub mod pip;
pub mod poi;
pub mod proximity;

pub use error::{BoundaryLoadError, CollectionError, ExtractionError};
pub use models::{Feature, FeatureId, GeoBbox, GeoPoint, NamedCollection, OsmType};
