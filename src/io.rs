//! GeoJSON FeatureCollection reading and writing.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use geojson::{FeatureCollection, GeoJson};
use tracing::debug;

use crate::error::CollectionError;
use crate::models::Feature;

/// Parse a FeatureCollection, decompressing `.gz` files on the fly.
pub fn read_feature_collection(path: &Path) -> Result<FeatureCollection, CollectionError> {
    let file = File::open(path).map_err(|source| CollectionError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    match GeoJson::from_reader(reader) {
        Ok(GeoJson::FeatureCollection(fc)) => Ok(fc),
        Ok(_) => Err(CollectionError::NotACollection {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(CollectionError::Parse {
            path: path.to_path_buf(),
            source: geojson::Error::MalformedJson(source),
        }),
    }
}

/// Read a collection into features, skipping entries without usable geometry.
pub fn read_collection(path: &Path) -> Result<Vec<Feature>, CollectionError> {
    let fc = read_feature_collection(path)?;
    let total = fc.features.len();

    let features: Vec<Feature> = fc
        .features
        .into_iter()
        .enumerate()
        .filter_map(|(i, f)| Feature::from_geojson(f, i))
        .collect();

    debug!(
        "Read {} features from {} ({} skipped)",
        features.len(),
        path.display(),
        total - features.len()
    );
    Ok(features)
}

/// Write features as a FeatureCollection, preserving order.
pub fn write_collection(path: &Path, features: &[Feature]) -> Result<(), CollectionError> {
    let fc = FeatureCollection {
        bbox: None,
        features: features.iter().map(Feature::to_geojson).collect(),
        foreign_members: None,
    };

    let file = File::create(path).map_err(|source| CollectionError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &fc).map_err(|source| CollectionError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|source| CollectionError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
