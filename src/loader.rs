use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use geo::Geometry;
use geojson::GeoJson;
use serde_json::{Map, Value};
use shapefile::dbase::{FieldValue, Record};
use shapefile::Shape;
use tracing::{debug, info};

use crate::config::Crs;
use crate::dataset::{Dataset, Feature};
use crate::error::LoadError;

/// CRS assumed for GeoJSON without a `crs` member (RFC 7946).
const GEOJSON_DEFAULT_EPSG: u32 = 4326;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    GeoJSON,
    Shapefile,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "geojson" | "json" => Some(InputFormat::GeoJSON),
            "shp" => Some(InputFormat::Shapefile),
            _ => None,
        }
    }
}

/// Reads the dataset at `path`, picking the reader from the file extension.
pub fn load_dataset(name: &str, path: &Path) -> Result<Dataset, LoadError> {
    info!("Loading file: {}", path.display());
    let dataset = match InputFormat::from_path(path) {
        Some(InputFormat::GeoJSON) => load_geojson(name, path)?,
        Some(InputFormat::Shapefile) => load_shapefile(name, path)?,
        None => {
            return Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
        }
    };
    info!("Loaded {} features from {}", dataset.len(), path.display());
    Ok(dataset)
}

pub fn load_geojson(name: &str, path: &Path) -> Result<Dataset, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let geojson = GeoJson::from_reader(BufReader::new(file)).map_err(|source| {
        LoadError::GeoJson {
            path: path.to_path_buf(),
            source: source.into(),
        }
    })?;

    let (raw_features, declared_crs) = match geojson {
        GeoJson::FeatureCollection(fc) => {
            let crs = fc
                .foreign_members
                .as_ref()
                .and_then(|members| members.get("crs"))
                .and_then(crs_from_member);
            (fc.features, crs)
        }
        GeoJson::Feature(feature) => (vec![feature], None),
        GeoJson::Geometry(geometry) => (
            vec![geojson::Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            None,
        ),
    };

    let mut fields = FieldCollector::default();
    let mut features = Vec::with_capacity(raw_features.len());
    for (index, raw) in raw_features.into_iter().enumerate() {
        let geometry = match raw.geometry {
            Some(geometry) => Some(Geometry::<f64>::try_from(geometry.value).map_err(|e| {
                LoadError::Geometry {
                    path: path.to_path_buf(),
                    index,
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };
        let properties = raw.properties.unwrap_or_default();
        fields.observe(properties.keys());
        features.push(Feature {
            geometry,
            properties,
        });
    }

    Ok(Dataset {
        name: name.to_string(),
        source: path.to_path_buf(),
        crs: declared_crs.unwrap_or(Crs::Epsg(GEOJSON_DEFAULT_EPSG)),
        fields: fields.into_fields(),
        features,
    })
}

pub fn load_shapefile(name: &str, path: &Path) -> Result<Dataset, LoadError> {
    let crs = read_prj(path)?;
    let mut reader = shapefile::Reader::from_path(path).map_err(|source| {
        LoadError::Shapefile {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let mut fields = FieldCollector::default();
    let mut features = Vec::new();
    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = result.map_err(|source| LoadError::Shapefile {
            path: path.to_path_buf(),
            source,
        })?;
        if (index + 1) % 10_000 == 0 {
            debug!("Read {} records from {}", index + 1, path.display());
        }

        let geometry = shape_to_geometry(shape).map_err(|reason| LoadError::Geometry {
            path: path.to_path_buf(),
            index,
            reason,
        })?;
        let properties = record_to_properties(record);
        fields.observe(properties.keys());
        features.push(Feature {
            geometry,
            properties,
        });
    }

    let mut fields = fields.into_fields();
    fields.sort();

    Ok(Dataset {
        name: name.to_string(),
        source: path.to_path_buf(),
        crs,
        fields,
        features,
    })
}

/// The legacy GeoJSON member: `{"type": "name", "properties": {"name": ...}}`.
fn crs_from_member(member: &Value) -> Option<Crs> {
    member
        .get("properties")?
        .get("name")?
        .as_str()
        .map(Crs::parse)
}

fn read_prj(shp_path: &Path) -> Result<Crs, LoadError> {
    let prj_path = shp_path.with_extension("prj");
    if !prj_path.exists() {
        return Err(LoadError::UnknownCrs {
            path: shp_path.to_path_buf(),
        });
    }
    let wkt = fs::read_to_string(&prj_path).map_err(|source| LoadError::Io {
        path: prj_path.clone(),
        source,
    })?;
    if wkt.trim().is_empty() {
        return Err(LoadError::UnknownCrs {
            path: shp_path.to_path_buf(),
        });
    }
    Ok(Crs::parse(&wkt))
}

fn shape_to_geometry(shape: Shape) -> Result<Option<Geometry<f64>>, String> {
    if let Shape::NullShape = shape {
        return Ok(None);
    }
    let geometry = Geometry::<f64>::try_from(shape).map_err(|e| e.to_string())?;
    Ok(Some(collapse_single_part(geometry)))
}

/// Shapefiles store every polyline and polygon as multi-part; a record with
/// one part is reported as the single-part kind.
fn collapse_single_part(geometry: Geometry<f64>) -> Geometry<f64> {
    match geometry {
        Geometry::MultiLineString(mut lines) if lines.0.len() == 1 => {
            Geometry::LineString(lines.0.remove(0))
        }
        Geometry::MultiPolygon(mut polygons) if polygons.0.len() == 1 => {
            Geometry::Polygon(polygons.0.remove(0))
        }
        other => other,
    }
}

fn record_to_properties(record: Record) -> Map<String, Value> {
    record
        .into_iter()
        .map(|(name, value)| (name, field_to_json(value)))
        .collect()
}

fn field_to_json(value: FieldValue) -> Value {
    match value {
        FieldValue::Character(text) => text.map(Value::String).unwrap_or(Value::Null),
        FieldValue::Memo(text) => Value::String(text),
        FieldValue::Numeric(number) => number.map(number_to_json).unwrap_or(Value::Null),
        FieldValue::Float(number) => number
            .map(|n| number_to_json(f64::from(n)))
            .unwrap_or(Value::Null),
        FieldValue::Double(number) | FieldValue::Currency(number) => number_to_json(number),
        FieldValue::Integer(number) => Value::from(number),
        FieldValue::Logical(flag) => flag.map(Value::Bool).unwrap_or(Value::Null),
        FieldValue::Date(date) => date
            .map(|d| Value::String(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day())))
            .unwrap_or(Value::Null),
        other => Value::String(format!("{:?}", other)),
    }
}

/// dBase numerics are all floating point; whole values are written as integers.
fn number_to_json(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < 9_007_199_254_740_992.0 {
        Value::from(number as i64)
    } else {
        Value::from(number)
    }
}

/// Union of attribute names in first-seen order.
#[derive(Default)]
struct FieldCollector {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl FieldCollector {
    fn observe<'a>(&mut self, keys: impl Iterator<Item = &'a String>) {
        for key in keys {
            if self.seen.insert(key.clone()) {
                self.ordered.push(key.clone());
            }
        }
    }

    fn into_fields(self) -> Vec<String> {
        self.ordered
    }
}
