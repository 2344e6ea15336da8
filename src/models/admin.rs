//! Administrative boundary types for point-in-polygon attribution.

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

/// Boundary layers, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryLevel {
    /// Country (admin_level=2)
    Country,
    /// State / province / first-level subdivision (admin_level=4)
    Subdivision,
}

/// A named region with its polygonal extent.
#[derive(Debug, Clone)]
pub struct BoundaryRegion {
    pub level: BoundaryLevel,
    /// Position in the source collection; first-loaded wins ties.
    pub order: usize,
    pub name: Option<String>,
    /// ISO 3166 code (alpha-2 for countries, 3166-2 for subdivisions).
    pub code: Option<String>,
    pub geometry: MultiPolygon<f64>,
}

/// Country and subdivision a point falls in. Every field is `None` for
/// points outside all regions (international waters).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryAttribution {
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub subdivision: Option<String>,
    pub subdivision_code: Option<String>,
}

impl BoundaryAttribution {
    /// Set the name and code for a given level
    pub fn set(&mut self, region: &BoundaryRegion) {
        match region.level {
            BoundaryLevel::Country => {
                self.country = region.name.clone();
                self.country_code = region.code.clone();
            }
            BoundaryLevel::Subdivision => {
                self.subdivision = region.name.clone();
                self.subdivision_code = region.code.clone();
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.subdivision.is_none()
    }
}
