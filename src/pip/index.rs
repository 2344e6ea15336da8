//! Spatial index for fast boundary lookups.

use std::cmp::Ordering;
use std::sync::Arc;

use geo::{BoundingRect, ChamberlainDuquetteArea, Contains, Point};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{BoundaryLevel, BoundaryRegion, GeoPoint};

/// Which region wins when a point falls inside several regions of one level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Earliest region in the source collection.
    #[default]
    FirstLoaded,
    /// Region with the smallest area; load order breaks exact ties.
    SmallestArea,
}

/// Wrapper for R-tree indexing of boundary regions
#[derive(Clone)]
pub struct IndexedBoundary {
    pub region: Arc<BoundaryRegion>,
    area: f64,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedBoundary {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl IndexedBoundary {
    pub fn new(region: BoundaryRegion) -> Option<Self> {
        let rect = region.geometry.bounding_rect()?;
        let area = region.geometry.chamberlain_duquette_unsigned_area();
        Some(Self {
            region: Arc::new(region),
            area,
            envelope: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
        })
    }

    fn precedence(&self, other: &Self, policy: OverlapPolicy) -> Ordering {
        match policy {
            OverlapPolicy::FirstLoaded => self.region.order.cmp(&other.region.order),
            OverlapPolicy::SmallestArea => self
                .area
                .total_cmp(&other.area)
                .then(self.region.order.cmp(&other.region.order)),
        }
    }
}

/// R-tree over the regions of a single boundary level.
pub struct LevelIndex {
    policy: OverlapPolicy,
    tree: RTree<IndexedBoundary>,
}

impl LevelIndex {
    /// Build spatial index from boundary regions
    pub fn build(level: BoundaryLevel, regions: Vec<BoundaryRegion>, policy: OverlapPolicy) -> Self {
        info!("Building {:?} index for {} regions...", level, regions.len());

        let indexed: Vec<IndexedBoundary> = regions
            .into_iter()
            .filter_map(IndexedBoundary::new)
            .collect();

        let tree = RTree::bulk_load(indexed);
        info!("{:?} index built with {} entries", level, tree.size());

        Self { policy, tree }
    }

    /// The winning region containing a point, if any.
    pub fn lookup(&self, point: GeoPoint) -> Option<&Arc<BoundaryRegion>> {
        let query = Point::from(point);
        let query_envelope = AABB::from_point([point.lon, point.lat]);

        // Candidates via envelope intersection, then exact containment
        self.tree
            .locate_in_envelope_intersecting(&query_envelope)
            .filter(|ib| ib.region.geometry.contains(&query))
            .min_by(|a, b| a.precedence(b, self.policy))
            .map(|ib| &ib.region)
    }

    /// Spatial join of every point against this level, in parallel.
    /// The result is aligned with `points`.
    pub fn join(&self, points: &[GeoPoint]) -> Vec<Option<&Arc<BoundaryRegion>>> {
        points.par_iter().map(|p| self.lookup(*p)).collect()
    }

    /// Get total number of indexed regions
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
