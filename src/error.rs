//! Error types for each stage of the simplification pipeline.
//!
//! Every stage has its own enum so callers can tell a read problem from a
//! projection problem. [`PipelineError`] rolls the fatal ones up for a
//! single dataset; [`ReduceError`] never leaves the density reducer's caller
//! because a failed reduction only downgrades the output.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of one dataset inside a batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Reproject(#[from] ReprojectError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Problems reading a source file or shaping its attributes.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse GeoJSON '{path}': {source}")]
    GeoJson {
        path: PathBuf,
        #[source]
        source: geojson::Error,
    },

    #[error("failed to read shapefile '{path}': {source}")]
    Shapefile {
        path: PathBuf,
        #[source]
        source: shapefile::Error,
    },

    /// A geometry that could not be turned into a `geo` geometry.
    #[error("feature {index} of '{path}' has an unusable geometry: {reason}")]
    Geometry {
        path: PathBuf,
        index: usize,
        reason: String,
    },

    #[error("unsupported input format for '{path}'")]
    UnsupportedFormat { path: PathBuf },

    /// No coordinate reference system could be determined for the source.
    #[error("no coordinate reference system found for '{path}'")]
    UnknownCrs { path: PathBuf },

    #[error("dataset '{dataset}' has no column(s) named {}", .missing.join(", "))]
    MissingColumns {
        dataset: String,
        missing: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum ReprojectError {
    #[error("cannot build transformation from {from} to {to}: {source}")]
    Setup {
        from: String,
        to: String,
        #[source]
        source: proj::ProjCreateError,
    },

    #[error("failed to transform feature {index}: {source}")]
    Transform {
        index: usize,
        #[source]
        source: proj::ProjError,
    },
}

/// Reasons the density reducer gave up.
#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("feature {index} has no centroid")]
    NoCentroid { index: usize },

    #[error("feature {index} has a non-finite centroid")]
    NonFiniteCentroid { index: usize },

    #[error("cluster radius must be positive and finite, got {0}")]
    InvalidRadius(f64),

    #[error("geometry union failed: {0}")]
    Union(String),
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Problems with the dataset manifest handed to the binary.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
