use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use geojson::{Feature as GeoJsonFeature, FeatureCollection, Geometry as GeoJsonGeometry};
use serde_json::{json, Map};
use tracing::info;

use crate::dataset::Dataset;
use crate::error::WriteError;

/// `<output_dir>/<source file stem>.geojson`.
pub fn output_path(dataset: &Dataset, output_dir: &Path) -> PathBuf {
    let file_stem = dataset
        .source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    output_dir.join(format!("{}.geojson", file_stem))
}

fn to_feature_collection(dataset: &Dataset) -> FeatureCollection {
    let features = dataset
        .features
        .iter()
        .map(|feature| GeoJsonFeature {
            bbox: None,
            geometry: feature
                .geometry
                .as_ref()
                .map(|geometry| GeoJsonGeometry::new(geojson::Value::from(geometry))),
            id: None,
            properties: Some(feature.properties.clone()),
            foreign_members: None,
        })
        .collect();

    // Output stays in the projected CRS; say so for readers that care.
    let foreign_members = dataset.crs.to_urn().map(|urn| {
        let mut members = Map::new();
        members.insert(
            "crs".to_string(),
            json!({"type": "name", "properties": {"name": urn}}),
        );
        members
    });

    FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    }
}

/// Serializes the dataset, creating `output_dir` if needed and replacing any
/// previous output. Returns the written path.
pub fn write_geojson(dataset: &Dataset, output_dir: &Path) -> Result<PathBuf, WriteError> {
    create_dir_all(output_dir).map_err(|source| WriteError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let output_path = output_path(dataset, output_dir);
    let feature_collection = to_feature_collection(dataset);

    let file = File::create(&output_path).map_err(|source| WriteError::Io {
        path: output_path.clone(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &feature_collection).map_err(|source| {
        WriteError::Json {
            path: output_path.clone(),
            source,
        }
    })?;
    writer.flush().map_err(|source| WriteError::Io {
        path: output_path.clone(),
        source,
    })?;

    info!(
        "Saved simplified geojson: {} ({} features)",
        output_path.display(),
        feature_collection.features.len()
    );
    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Crs;
    use crate::dataset::Feature;
    use geo::point;
    use geojson::GeoJson;
    use std::fs;

    fn dataset(source: &str) -> Dataset {
        Dataset {
            name: "Ports".to_string(),
            source: PathBuf::from(source),
            crs: Crs::Epsg(3857),
            fields: vec!["name".to_string()],
            features: vec![
                Feature::new(point!(x: 1.0, y: 2.0).into()).with_property("name", "Houston"),
                Feature::new(point!(x: 3.0, y: 4.0).into()).with_property("name", "Tacoma"),
            ],
        }
    }

    #[test]
    fn names_output_after_source_stem() {
        let ds = dataset("Principal_Ports/Principal_Port.shp");
        assert_eq!(
            output_path(&ds, Path::new("out")),
            PathBuf::from("out/Principal_Port.geojson")
        );
    }

    #[test]
    fn writes_feature_collection_with_crs() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("nested").join("geojsons_simplified");

        let path = write_geojson(&dataset("ports/ports.shp"), &out_dir).unwrap();

        assert_eq!(path, out_dir.join("ports.geojson"));
        let text = fs::read_to_string(&path).unwrap();
        let parsed: GeoJson = text.parse().unwrap();
        match parsed {
            GeoJson::FeatureCollection(fc) => {
                assert_eq!(fc.features.len(), 2);
                let crs = &fc.foreign_members.unwrap()["crs"];
                assert_eq!(crs["properties"]["name"], "urn:ogc:def:crs:EPSG::3857");
                assert_eq!(
                    fc.features[1].properties.as_ref().unwrap()["name"],
                    "Tacoma"
                );
            }
            other => panic!("expected a feature collection, got {other:?}"),
        }
    }

    #[test]
    fn overwrites_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ports.geojson"), "stale").unwrap();

        let mut ds = dataset("ports.shp");
        ds.features.truncate(1);
        let path = write_geojson(&ds, dir.path()).unwrap();

        let parsed: GeoJson = fs::read_to_string(path).unwrap().parse().unwrap();
        assert!(matches!(parsed, GeoJson::FeatureCollection(fc) if fc.features.len() == 1));
    }
}
