use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ManifestError;

/// Default target projection: spherical Web Mercator, metres.
pub const DEFAULT_TARGET_EPSG: u32 = 3857;
pub const DEFAULT_TOLERANCE: f64 = 1000.0;
/// Datasets with more features than this are clustered and dissolved.
pub const DEFAULT_MAX_FEATURES: usize = 60_000;
pub const DEFAULT_CLUSTER_RADIUS: f64 = 150.0;
pub const DEFAULT_CLUSTER_MIN_SAMPLES: usize = 1;

/// Name of the output directory under the project root.
pub const OUTPUT_DIR_NAME: &str = "geojsons_simplified";
pub const DATA_DIR_NAME: &str = "data";

/// A coordinate reference system, either by EPSG code or as a full
/// definition (WKT from a `.prj` file, a PROJ string, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Crs {
    Epsg(u32),
    Definition(String),
}

impl Crs {
    /// Parses the CRS notations found in the wild: `EPSG:3857`, a bare code,
    /// OGC URNs as used by the legacy GeoJSON `crs` member. Anything else is
    /// kept as an opaque definition for PROJ to interpret.
    pub fn parse(input: &str) -> Crs {
        let trimmed = input.trim();

        if trimmed.contains("CRS84") {
            return Crs::Epsg(4326);
        }
        if let Ok(code) = trimmed.parse::<u32>() {
            return Crs::Epsg(code);
        }

        let upper = trimmed.to_ascii_uppercase();
        if upper.starts_with("EPSG:") || upper.starts_with("URN:OGC:DEF:CRS:EPSG:") {
            if let Some(code) = trimmed.rsplit(':').next().and_then(|c| c.parse().ok()) {
                return Crs::Epsg(code);
            }
        }

        Crs::Definition(trimmed.to_string())
    }

    /// The string handed to PROJ.
    pub fn to_proj_string(&self) -> String {
        match self {
            Crs::Epsg(code) => format!("EPSG:{}", code),
            Crs::Definition(definition) => definition.clone(),
        }
    }

    /// OGC URN for the legacy GeoJSON `crs` member, when one exists.
    pub fn to_urn(&self) -> Option<String> {
        match self {
            Crs::Epsg(code) => Some(format!("urn:ogc:def:crs:EPSG::{}", code)),
            Crs::Definition(_) => None,
        }
    }
}

impl Default for Crs {
    fn default() -> Self {
        Crs::Epsg(DEFAULT_TARGET_EPSG)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{}", code),
            Crs::Definition(_) => write!(f, "custom CRS definition"),
        }
    }
}

/// Knobs for one pipeline run. Distances are in the linear units of
/// `target_crs` (metres for the default).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub target_crs: Crs,
    /// Maximum perpendicular deviation allowed by vertex reduction.
    pub tolerance: f64,
    pub max_features: usize,
    pub cluster_radius: f64,
    pub cluster_min_samples: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_crs: Crs::default(),
            tolerance: DEFAULT_TOLERANCE,
            max_features: DEFAULT_MAX_FEATURES,
            cluster_radius: DEFAULT_CLUSTER_RADIUS,
            cluster_min_samples: DEFAULT_CLUSTER_MIN_SAMPLES,
        }
    }
}

/// Where sources are read from and results written to.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl ProjectLayout {
    pub fn from_root(root: &Path) -> Self {
        Self {
            data_dir: root.join(DATA_DIR_NAME),
            output_dir: root.join(OUTPUT_DIR_NAME),
        }
    }

    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.data_dir.join(relative)
    }
}

/// One named dataset to process.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetSpec {
    pub name: String,
    /// Source path relative to the data directory.
    pub path: PathBuf,
    /// Attribute columns to keep; `None` keeps everything.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

impl DatasetSpec {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            columns: None,
        }
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Builds specs from a name → path mapping plus a name → columns mapping.
    /// Processing order follows `paths`.
    pub fn from_mappings<I>(paths: I, columns_keep: &HashMap<String, Vec<String>>) -> Vec<Self>
    where
        I: IntoIterator<Item = (String, PathBuf)>,
    {
        paths
            .into_iter()
            .map(|(name, path)| {
                let columns = columns_keep.get(&name).cloned();
                DatasetSpec { name, path, columns }
            })
            .collect()
    }
}

/// JSON list of datasets consumed by the command-line front end.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub datasets: Vec<DatasetSpec>,
}

impl Manifest {
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
