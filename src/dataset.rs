use std::path::PathBuf;

use geo::Geometry;
use serde_json::{Map, Value};

use crate::config::Crs;
use crate::error::LoadError;

/// Name under which a column list refers to the geometry itself.
pub const GEOMETRY_COLUMN: &str = "geometry";

/// One geometry plus its attribute row.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// The geometry kinds the simplifier treats differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Polygon,
    Line,
    MultiPolygon,
    MultiLine,
    Other,
}

impl GeometryKind {
    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Polygon(_) => GeometryKind::Polygon,
            Geometry::LineString(_) => GeometryKind::Line,
            Geometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
            Geometry::MultiLineString(_) => GeometryKind::MultiLine,
            _ => GeometryKind::Other,
        }
    }
}

/// A named feature collection moving through the pipeline.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    /// Source file, used to name the output.
    pub source: PathBuf,
    pub crs: Crs,
    /// Attribute columns seen while loading.
    pub fields: Vec<String>,
    pub features: Vec<Feature>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Restricts attributes to exactly `columns`. Listing a column the
    /// dataset never had is an error; `geometry` always exists.
    pub fn retain_columns(&mut self, columns: &[String]) -> Result<(), LoadError> {
        let missing: Vec<String> = columns
            .iter()
            .filter(|c| c.as_str() != GEOMETRY_COLUMN && !self.fields.contains(c))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::MissingColumns {
                dataset: self.name.clone(),
                missing,
            });
        }

        let keep: Vec<&String> = columns
            .iter()
            .filter(|c| c.as_str() != GEOMETRY_COLUMN)
            .collect();
        for feature in &mut self.features {
            feature.properties.retain(|key, _| keep.iter().any(|k| *k == key));
        }
        self.fields.retain(|field| keep.contains(&field));
        Ok(())
    }

    /// Removes features without a geometry, returning how many went.
    pub fn drop_null_geometries(&mut self) -> usize {
        let before = self.features.len();
        self.features.retain(|f| f.geometry.is_some());
        before - self.features.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon, MultiLineString};

    fn dataset(features: Vec<Feature>, fields: &[&str]) -> Dataset {
        Dataset {
            name: "test".to_string(),
            source: PathBuf::from("test.shp"),
            crs: Crs::Epsg(4326),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            features,
        }
    }

    #[test]
    fn classifies_geometry_kinds() {
        let square = polygon![(x: 0., y: 0.), (x: 1., y: 0.), (x: 1., y: 1.), (x: 0., y: 0.)];
        let line = line_string![(x: 0., y: 0.), (x: 1., y: 1.)];

        assert_eq!(GeometryKind::of(&square.clone().into()), GeometryKind::Polygon);
        assert_eq!(GeometryKind::of(&line.clone().into()), GeometryKind::Line);
        assert_eq!(
            GeometryKind::of(&geo::MultiPolygon::new(vec![square]).into()),
            GeometryKind::MultiPolygon
        );
        assert_eq!(
            GeometryKind::of(&MultiLineString::new(vec![line]).into()),
            GeometryKind::MultiLine
        );
        assert_eq!(GeometryKind::of(&point!(x: 1., y: 2.).into()), GeometryKind::Other);
    }

    #[test]
    fn drops_exactly_the_null_geometries() {
        let mut ds = dataset(
            vec![
                Feature::new(point!(x: 0., y: 0.).into()),
                Feature { geometry: None, properties: Map::new() },
                Feature::new(point!(x: 1., y: 1.).into()),
                Feature { geometry: None, properties: Map::new() },
            ],
            &[],
        );

        assert_eq!(ds.drop_null_geometries(), 2);
        assert_eq!(ds.len(), 2);
        assert!(ds.features.iter().all(|f| f.geometry.is_some()));
    }

    #[test]
    fn retains_listed_columns_only() {
        let mut ds = dataset(
            vec![Feature::new(point!(x: 0., y: 0.).into())
                .with_property("name", "a")
                .with_property("flow", 12)],
            &["name", "flow"],
        );

        ds.retain_columns(&["flow".to_string(), "geometry".to_string()])
            .unwrap();

        assert_eq!(ds.fields, vec!["flow".to_string()]);
        let props = &ds.features[0].properties;
        assert_eq!(props.len(), 1);
        assert_eq!(props["flow"], 12);
    }

    #[test]
    fn geometry_only_projection_clears_attributes() {
        let mut ds = dataset(
            vec![Feature::new(point!(x: 0., y: 0.).into()).with_property("name", "a")],
            &["name"],
        );

        ds.retain_columns(&["geometry".to_string()]).unwrap();

        assert!(ds.fields.is_empty());
        assert!(ds.features[0].properties.is_empty());
        assert!(ds.features[0].geometry.is_some());
    }

    #[test]
    fn missing_column_is_an_error() {
        let mut ds = dataset(vec![], &["name"]);
        let err = ds
            .retain_columns(&["name".to_string(), "capacity".to_string()])
            .unwrap_err();

        match err {
            LoadError::MissingColumns { missing, .. } => {
                assert_eq!(missing, vec!["capacity".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
