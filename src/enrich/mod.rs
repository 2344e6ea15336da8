//! Batch enrichment of feature collections.

mod batch;

pub use batch::{enrich_all, BatchEnricher, EnrichReport};
