//! Ski area analysis built on top of the enrichment output.

mod summary;

pub use summary::{summarize, write_csv, SkiAreaSummary, LIFT_TYPES, PISTE_DIFFICULTIES};
