//! Pipeline steps. Indexes are built once per invocation and passed down.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::task::block_in_place;
use tracing::info;

use skiatlas::analysis::{summarize, write_csv};
use skiatlas::config::{Config, SKI_AREAS_COLLECTION};
use skiatlas::enrich::enrich_all;
use skiatlas::io::{read_collection, write_collection};
use skiatlas::models::{CollectionRole, Feature, NamedCollection};
use skiatlas::notify::{Notifier, RunMessage};
use skiatlas::pip::BoundaryIndex;
use skiatlas::poi::{points_of_interest, PoiIndex};
use skiatlas::proximity::{OsmiumExtractor, ProximityAssociator};

use crate::Step;

const SUMMARY_FILE: &str = "ski_areas_analyzed.csv";

/// Run one step; returns a short description for notifications.
pub async fn execute(config: &Config, step: Step, notifier: &Notifier) -> Result<String> {
    let start = Instant::now();
    let (ski_areas, pois) = load_ski_areas(config)?;

    let description = match step {
        Step::Nearby => {
            let nearby = extract_nearby(config, &pois).await?;
            write_outputs(&config.run.output_dir, &nearby)?;
            describe(&nearby)
        }
        Step::Enrich => {
            let boundaries = load_boundaries(config)?;
            let mut collections = read_nearby(config)?;
            collections.extend(read_extra(config)?);
            let enriched = enrich(ski_areas, collections, &boundaries, &pois);
            write_outputs(&config.run.output_dir, &enriched)?;
            describe(&enriched)
        }
        Step::Analyze => {
            let boundaries = load_boundaries(config)?;
            let nearby = read_nearby(config)?;
            let rows = analyze(config, &pois, &nearby, &boundaries)?;
            format!("{} ski areas analyzed", rows)
        }
        Step::Run => {
            let boundaries = load_boundaries(config)?;

            let extra = read_extra(config)?;

            let step_start = Instant::now();
            let mut collections = extract_nearby(config, &pois).await?;
            notifier
                .notify(RunMessage::step(
                    "Nearby Extraction Complete",
                    step_start.elapsed(),
                    &collections,
                ))
                .await;

            let step_start = Instant::now();
            collections.extend(extra);
            let enriched = enrich(ski_areas, collections, &boundaries, &pois);
            write_outputs(&config.run.output_dir, &enriched)?;
            notifier
                .notify(RunMessage::step(
                    "Enrichment Complete",
                    step_start.elapsed(),
                    &enriched,
                ))
                .await;

            let rows = analyze(config, &pois, &enriched, &boundaries)?;
            format!("{}; {} ski areas analyzed", describe(&enriched), rows)
        }
    };

    info!("Finished in {:.1}s", start.elapsed().as_secs_f64());
    Ok(description)
}

fn describe(collections: &[NamedCollection]) -> String {
    collections
        .iter()
        .map(|c| format!("{}: {}", c.name, c.len()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn output_path(config: &Config, name: &str) -> PathBuf {
    config.run.output_dir.join(format!("{}.geojson", name))
}

fn load_ski_areas(config: &Config) -> Result<(Vec<Feature>, PoiIndex)> {
    let features = read_collection(&config.run.ski_areas)
        .with_context(|| format!("Failed to load ski areas from {}", config.run.ski_areas.display()))?;
    let pois = block_in_place(|| PoiIndex::build(points_of_interest(&features)));
    info!("Loaded {} ski areas", pois.len());
    Ok((features, pois))
}

fn load_boundaries(config: &Config) -> Result<BoundaryIndex> {
    let boundaries =
        block_in_place(|| BoundaryIndex::load(&config.boundaries)).context("Failed to load boundaries")?;
    boundaries.log_stats();
    Ok(boundaries)
}

async fn extract_nearby(config: &Config, pois: &PoiIndex) -> Result<Vec<NamedCollection>> {
    let extractor = OsmiumExtractor::new(&config.run.osmium, &config.run.ogr2ogr)
        .with_timeout(config.extraction_timeout());
    let associator = ProximityAssociator::new(
        extractor,
        config.run.radius_meters,
        config.categories.clone(),
    )
    .with_progress(config.run.show_progress);

    let run = associator
        .run(&config.run.source, pois)
        .await
        .context("Proximity extraction failed")?;
    Ok(run.collections)
}

/// Association outputs of an earlier `nearby` step, read from disk.
fn read_nearby(config: &Config) -> Result<Vec<NamedCollection>> {
    let mut collections = Vec::new();
    for category in &config.categories {
        let path = output_path(config, &category.name);
        let features = read_collection(&path)
            .with_context(|| format!("Failed to read {}; run the nearby step first", path.display()))?;
        collections.push(NamedCollection::new(&category.name, CollectionRole::Nearby, features));
    }
    Ok(collections)
}

fn read_extra(config: &Config) -> Result<Vec<NamedCollection>> {
    let mut collections = Vec::new();
    for extra in &config.collections {
        let features = read_collection(&extra.path)
            .with_context(|| format!("Failed to read collection {}", extra.path.display()))?;
        collections.push(NamedCollection::new(&extra.name, extra.role, features));
    }
    Ok(collections)
}

fn enrich(
    ski_areas: Vec<Feature>,
    mut collections: Vec<NamedCollection>,
    boundaries: &BoundaryIndex,
    pois: &PoiIndex,
) -> Vec<NamedCollection> {
    collections.insert(
        0,
        NamedCollection::new(SKI_AREAS_COLLECTION, CollectionRole::SkiAreas, ski_areas),
    );
    block_in_place(|| enrich_all(collections, boundaries, pois))
}

fn analyze(
    config: &Config,
    pois: &PoiIndex,
    collections: &[NamedCollection],
    boundaries: &BoundaryIndex,
) -> Result<usize> {
    let nearby = collections
        .iter()
        .filter(|c| c.role == CollectionRole::Nearby)
        .flat_map(|c| c.features.iter());
    let summaries = block_in_place(|| summarize(pois, nearby, Some(boundaries)));

    std::fs::create_dir_all(&config.run.output_dir)?;
    write_csv(&config.run.output_dir.join(SUMMARY_FILE), &summaries)?;
    Ok(summaries.len())
}

/// Write every collection only after the step producing them succeeded.
fn write_outputs(output_dir: &Path, collections: &[NamedCollection]) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    for collection in collections {
        let path = output_dir.join(format!("{}.geojson", collection.name));
        write_collection(&path, &collection.features)?;
        info!("Saved {} features to {}", collection.len(), path.display());
    }
    Ok(())
}
