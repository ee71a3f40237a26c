use std::path::Path;

pub mod cluster;
pub mod config;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod reproject;
pub mod simplify;
pub mod writer;

pub use config::{Crs, DatasetSpec, Manifest, PipelineConfig, ProjectLayout};
pub use dataset::{Dataset, Feature, GeometryKind};
pub use error::{LoadError, PipelineError};
pub use loader::InputFormat;
pub use pipeline::{BatchReport, DatasetOutcome, DatasetReport, ReductionOutcome, SkipReason};

/// Simplifies every dataset in `specs`, reading from `<root>/data` and
/// writing to `<root>/geojsons_simplified`.
pub fn simplify_project(
    root: &Path,
    specs: &[DatasetSpec],
    config: &PipelineConfig,
) -> BatchReport {
    let layout = ProjectLayout::from_root(root);
    pipeline::run_batch(specs, &layout, config)
}
