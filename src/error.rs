//! Error types for the collaborators the engine depends on.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Reading or writing a GeoJSON FeatureCollection.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse GeoJSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: geojson::Error,
    },

    #[error("{path} is not a FeatureCollection")]
    NotACollection { path: PathBuf },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Boundary datasets could not be loaded. Fatal to enrichment.
#[derive(Debug, Error)]
pub enum BoundaryLoadError {
    #[error("boundary source not found: {0}")]
    Missing(PathBuf),

    #[error("boundary source unreadable: {0}")]
    Collection(#[from] CollectionError),

    #[error("boundary source {0} contains no polygons")]
    Empty(PathBuf),
}

/// The external extraction tool failed. Partial output is never used.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    NonZeroExit {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("extraction produced no output at {0}")]
    EmptyOutput(PathBuf),

    #[error("extraction output is malformed: {0}")]
    Malformed(#[from] CollectionError),

    #[error("extraction I/O error: {0}")]
    Io(#[from] std::io::Error),
}
