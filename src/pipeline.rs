use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::cluster::{needs_reduction, reduce_density, ReductionSummary};
use crate::config::{DatasetSpec, PipelineConfig, ProjectLayout};
use crate::error::PipelineError;
use crate::loader::load_dataset;
use crate::reproject::reproject;
use crate::simplify::simplify_dataset;
use crate::writer::write_geojson;

/// What happened to the density reduction step for one dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum ReductionOutcome {
    NotNeeded,
    Reduced(ReductionSummary),
    /// Reduction was attempted and abandoned; the unreduced features were written.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingSource(PathBuf),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingSource(path) => write!(f, "path {} does not exist", path.display()),
        }
    }
}

#[derive(Debug)]
pub enum DatasetOutcome {
    Written {
        path: PathBuf,
        features: usize,
        reduction: ReductionOutcome,
    },
    Skipped(SkipReason),
    Failed(PipelineError),
}

#[derive(Debug)]
pub struct DatasetReport {
    pub name: String,
    pub outcome: DatasetOutcome,
}

/// Per-dataset results of one batch, in processing order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub datasets: Vec<DatasetReport>,
}

impl BatchReport {
    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, DatasetOutcome::Written { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DatasetOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DatasetOutcome::Failed(_)))
    }

    pub fn get(&self, name: &str) -> Option<&DatasetReport> {
        self.datasets.iter().find(|report| report.name == name)
    }

    fn count(&self, predicate: impl Fn(&DatasetOutcome) -> bool) -> usize {
        self.datasets
            .iter()
            .filter(|report| predicate(&report.outcome))
            .count()
    }
}

/// Runs every dataset through the pipeline, one after the other. A problem
/// with one dataset never stops the others.
pub fn run_batch(
    specs: &[DatasetSpec],
    layout: &ProjectLayout,
    config: &PipelineConfig,
) -> BatchReport {
    info!("=== Simplifying {} datasets ===", specs.len());
    let datasets = specs
        .iter()
        .map(|spec| process_dataset(spec, layout, config))
        .collect();
    let report = BatchReport { datasets };
    info!(
        "=== Done: {} written, {} skipped, {} failed ===",
        report.written(),
        report.skipped(),
        report.failed()
    );
    report
}

pub fn process_dataset(
    spec: &DatasetSpec,
    layout: &ProjectLayout,
    config: &PipelineConfig,
) -> DatasetReport {
    info!("Processing dataset: {}", spec.name);
    let source = layout.resolve(&spec.path);

    let outcome = if !source.exists() {
        let reason = SkipReason::MissingSource(source);
        warn!("{}: {}", spec.name, reason);
        DatasetOutcome::Skipped(reason)
    } else {
        match run_stages(spec, &source, layout, config) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{}: {}", spec.name, e);
                DatasetOutcome::Failed(e)
            }
        }
    };

    DatasetReport {
        name: spec.name.clone(),
        outcome,
    }
}

fn run_stages(
    spec: &DatasetSpec,
    source: &Path,
    layout: &ProjectLayout,
    config: &PipelineConfig,
) -> Result<DatasetOutcome, PipelineError> {
    let mut dataset = load_dataset(&spec.name, source)?;
    if let Some(columns) = &spec.columns {
        dataset.retain_columns(columns)?;
    }

    reproject(&mut dataset, &config.target_crs)?;

    let dropped = dataset.drop_null_geometries();
    if dropped > 0 {
        info!("Dropped {} features without geometry", dropped);
    }

    simplify_dataset(&mut dataset, config.tolerance);

    let reduction = if needs_reduction(dataset.len(), config) {
        match reduce_density(&mut dataset, config) {
            Ok(summary) => ReductionOutcome::Reduced(summary),
            Err(e) => {
                warn!("Clustering and dissolve failed for {}: {}", spec.name, e);
                ReductionOutcome::Failed(e.to_string())
            }
        }
    } else {
        ReductionOutcome::NotNeeded
    };

    let path = write_geojson(&dataset, &layout.output_dir)?;
    Ok(DatasetOutcome::Written {
        path,
        features: dataset.len(),
        reduction,
    })
}
