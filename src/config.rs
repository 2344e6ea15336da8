//! Run configuration loaded from a TOML file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::CollectionRole;
use crate::pip::BoundarySources;
use crate::proximity::FeatureCategory;

pub const DEFAULT_RADIUS_METERS: f64 = 2000.0;

/// Output name of the enriched points-of-interest collection.
pub const SKI_AREAS_COLLECTION: &str = "ski_areas";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub run: RunConfig,
    pub boundaries: BoundarySources,
    #[serde(default = "FeatureCategory::defaults")]
    pub categories: Vec<FeatureCategory>,
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    /// Raw vector dataset handed to the extractor.
    pub source: PathBuf,
    /// Points-of-interest (ski areas) collection.
    pub ski_areas: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default = "default_radius")]
    pub radius_meters: f64,
    pub extraction_timeout_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub show_progress: bool,
    #[serde(default = "default_osmium")]
    pub osmium: PathBuf,
    #[serde(default = "default_ogr2ogr")]
    pub ogr2ogr: PathBuf,
}

/// An additional collection enriched alongside the association output.
#[derive(Debug, Deserialize, Clone)]
pub struct CollectionConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub role: CollectionRole,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotificationConfig {
    pub discord_webhook: Option<String>,
}

fn default_radius() -> f64 {
    DEFAULT_RADIUS_METERS
}

fn default_true() -> bool {
    true
}

fn default_osmium() -> PathBuf {
    PathBuf::from("osmium")
}

fn default_ogr2ogr() -> PathBuf {
    PathBuf::from("ogr2ogr")
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let radius = self.run.radius_meters;
        if !radius.is_finite() || radius < 0.0 {
            bail!("radius_meters must be a non-negative number, got {}", radius);
        }

        if self.run.extraction_timeout_secs == Some(0) {
            bail!("extraction_timeout_secs must be greater than zero");
        }

        let mut names = HashSet::from([SKI_AREAS_COLLECTION]);
        for category in &self.categories {
            if category.name.trim().is_empty() {
                bail!("Feature category names must not be empty");
            }
            if !names.insert(category.name.as_str()) {
                bail!("Duplicate feature category: {}", category.name);
            }
        }

        for collection in &self.collections {
            if !names.insert(collection.name.as_str()) {
                bail!("Collection {} collides with another output name", collection.name);
            }
        }

        Ok(())
    }

    pub fn extraction_timeout(&self) -> Option<Duration> {
        self.run.extraction_timeout_secs.map(Duration::from_secs)
    }
}
