//! Bounded extraction through external tools (osmium + ogr2ogr).

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::ExtractionError;
use crate::io::read_feature_collection;
use crate::models::{Feature, GeoBbox};

/// Layers produced by GDAL's OSM driver.
const OGR_LAYERS: &[&str] = &["points", "lines", "multilinestrings", "multipolygons"];

/// A named set of `osmium tags-filter` expressions. No filters keeps everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureCategory {
    pub name: String,
    #[serde(default)]
    pub filters: Vec<String>,
}

impl FeatureCategory {
    pub fn new(name: impl Into<String>, filters: &[&str]) -> Self {
        Self {
            name: name.into(),
            filters: filters.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// `aerialway=*`: lifts and their stations.
    pub fn lifts() -> Self {
        Self::new("lifts", &["n/aerialway", "w/aerialway", "r/aerialway"])
    }

    /// `piste:type=*`
    pub fn pistes() -> Self {
        Self::new("pistes", &["n/piste:type", "w/piste:type", "r/piste:type"])
    }

    /// Every feature in the envelope.
    pub fn nearby() -> Self {
        Self::new("osm_near_ski_areas", &[])
    }

    pub fn defaults() -> Vec<Self> {
        vec![Self::lifts(), Self::pistes(), Self::nearby()]
    }
}

/// The external extraction collaborator.
///
/// Extraction is two-phase: [`Extractor::clip`] reads the full source once
/// and bounds it to the envelope, then [`Extractor::extract`] is called once
/// per category against that clip. Implementations never return partial
/// results.
pub trait Extractor: Send + Sync {
    /// The source bounded to one envelope, shared by every category of a run.
    type Clip: Send + Sync;

    fn clip(
        &self,
        source: &Path,
        envelope: &GeoBbox,
    ) -> impl Future<Output = Result<Self::Clip, ExtractionError>> + Send;

    fn extract(
        &self,
        clip: &Self::Clip,
        category: &FeatureCategory,
    ) -> impl Future<Output = Result<Vec<Feature>, ExtractionError>> + Send;
}

/// A clipped `.osm.pbf`, removed when dropped.
#[derive(Debug)]
pub struct ClippedSource {
    source: PathBuf,
    path: PathBuf,
    _dir: TempDir,
}

impl ClippedSource {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Runs `osmium extract`, `osmium tags-filter` and `ogr2ogr` as child processes.
#[derive(Debug, Clone)]
pub struct OsmiumExtractor {
    osmium: PathBuf,
    ogr2ogr: PathBuf,
    timeout: Option<Duration>,
}

impl Default for OsmiumExtractor {
    fn default() -> Self {
        Self {
            osmium: PathBuf::from("osmium"),
            ogr2ogr: PathBuf::from("ogr2ogr"),
            timeout: None,
        }
    }
}

impl OsmiumExtractor {
    pub fn new(osmium: impl Into<PathBuf>, ogr2ogr: impl Into<PathBuf>) -> Self {
        Self {
            osmium: osmium.into(),
            ogr2ogr: ogr2ogr.into(),
            timeout: None,
        }
    }

    /// Per-process time limit. A process exceeding it is killed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run_tool(&self, program: &Path, args: Vec<OsString>) -> Result<(), ExtractionError> {
        let name = program.display().to_string();
        debug!("Running {} {:?}", name, args);

        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExtractionError::Spawn {
                program: name.clone(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(ExtractionError::Timeout {
                        program: name,
                        timeout: limit,
                    })
                }
            },
            None => child.wait_with_output().await?,
        };

        if !output.status.success() {
            return Err(ExtractionError::NonZeroExit {
                program: name,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn require_output(path: &Path) -> Result<(), ExtractionError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(ExtractionError::EmptyOutput(path.to_path_buf())),
        }
    }
}

impl Extractor for OsmiumExtractor {
    type Clip = ClippedSource;

    async fn clip(&self, source: &Path, envelope: &GeoBbox) -> Result<ClippedSource, ExtractionError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clipped.osm.pbf");
        let start = Instant::now();
        self.run_tool(
            &self.osmium,
            vec![
                "extract".into(),
                "-b".into(),
                envelope.to_osmium_arg().into(),
                source.into(),
                "-o".into(),
                path.clone().into(),
                "--overwrite".into(),
            ],
        )
        .await?;
        Self::require_output(&path)?;

        info!(
            "Clipped {} to {} in {:.1}s",
            source.display(),
            envelope.to_osmium_arg(),
            start.elapsed().as_secs_f64()
        );
        Ok(ClippedSource {
            source: source.to_path_buf(),
            path,
            _dir: dir,
        })
    }

    async fn extract(
        &self,
        clip: &ClippedSource,
        category: &FeatureCategory,
    ) -> Result<Vec<Feature>, ExtractionError> {
        let workdir = tempfile::tempdir()?;

        let input = if category.filters.is_empty() {
            clip.path().to_path_buf()
        } else {
            let filtered = workdir.path().join("filtered.osm.pbf");
            let mut args: Vec<OsString> =
                vec!["tags-filter".into(), "-O".into(), clip.path().into()];
            args.extend(category.filters.iter().map(OsString::from));
            args.push("-o".into());
            args.push(filtered.clone().into());
            self.run_tool(&self.osmium, args).await?;
            Self::require_output(&filtered)?;
            filtered
        };

        let mut features = Vec::new();
        for layer in OGR_LAYERS {
            let layer_path = workdir.path().join(format!("{layer}.geojson"));
            self.run_tool(
                &self.ogr2ogr,
                vec![
                    "-f".into(),
                    "GeoJSON".into(),
                    "-t_srs".into(),
                    "EPSG:4326".into(),
                    "-sql".into(),
                    format!("SELECT * FROM {layer}").into(),
                    layer_path.clone().into(),
                    input.clone().into(),
                ],
            )
            .await?;
            Self::require_output(&layer_path)?;

            let offset = features.len();
            let fc = read_feature_collection(&layer_path)?;
            features.extend(
                fc.features
                    .into_iter()
                    .enumerate()
                    .filter_map(|(i, f)| Feature::from_geojson(f, offset + i)),
            );
        }

        info!(
            "Extracted {} {} features from {}",
            features.len(),
            category.name,
            clip.source.display()
        );
        Ok(features)
    }
}
