//! Point-in-Polygon (PIP) boundary attribution.
//!
//! Loads country and subdivision polygons once and classifies batches of
//! points using an R-tree spatial index per level.

mod boundary;
mod index;
mod service;

pub use boundary::{load_regions, BoundarySources};
pub use index::{IndexedBoundary, LevelIndex, OverlapPolicy};
pub use service::BoundaryIndex;
