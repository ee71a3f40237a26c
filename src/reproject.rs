use geo::{Coord, MapCoords};
use proj::{Proj, ProjError};
use tracing::{debug, info};

use crate::config::Crs;
use crate::dataset::Dataset;
use crate::error::ReprojectError;

/// Moves every geometry of `dataset` into `target` and records `target` as
/// the dataset's CRS. Null geometries are left alone.
pub fn reproject(dataset: &mut Dataset, target: &Crs) -> Result<(), ReprojectError> {
    if dataset.crs == *target {
        debug!("{} already in {}, skipping reprojection", dataset.name, target);
        return Ok(());
    }

    let from = dataset.crs.to_proj_string();
    let to = target.to_proj_string();
    let transform = Proj::new_known_crs(&from, &to, None).map_err(|source| {
        ReprojectError::Setup {
            from: dataset.crs.to_string(),
            to: target.to_string(),
            source,
        }
    })?;

    info!("Reprojecting {} from {} to {}", dataset.name, dataset.crs, target);
    for (index, feature) in dataset.features.iter_mut().enumerate() {
        if let Some(geometry) = feature.geometry.as_mut() {
            *geometry = geometry
                .try_map_coords(|coord| {
                    let (x, y) = transform.convert((coord.x, coord.y))?;
                    Ok::<_, ProjError>(Coord { x, y })
                })
                .map_err(|source| ReprojectError::Transform { index, source })?;
        }
    }

    dataset.crs = target.clone();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Feature;
    use geo::{point, Geometry, Point};
    use serde_json::Map;
    use std::path::PathBuf;

    fn dataset(crs: Crs, features: Vec<Feature>) -> Dataset {
        Dataset {
            name: "test".to_string(),
            source: PathBuf::from("test.geojson"),
            crs,
            fields: vec![],
            features,
        }
    }

    #[test]
    fn same_crs_is_untouched() {
        let mut ds = dataset(
            Crs::Epsg(3857),
            vec![Feature::new(point!(x: 10.0, y: 20.0).into())],
        );

        reproject(&mut ds, &Crs::Epsg(3857)).unwrap();

        assert_eq!(
            ds.features[0].geometry,
            Some(Geometry::Point(point!(x: 10.0, y: 20.0)))
        );
    }

    #[test]
    fn geographic_to_web_mercator() {
        let mut ds = dataset(
            Crs::Epsg(4326),
            vec![
                Feature::new(point!(x: 1.0, y: 0.0).into()),
                Feature {
                    geometry: None,
                    properties: Map::new(),
                },
            ],
        );

        reproject(&mut ds, &Crs::Epsg(3857)).unwrap();

        assert_eq!(ds.crs, Crs::Epsg(3857));
        let moved = Point::try_from(ds.features[0].geometry.clone().unwrap()).unwrap();
        assert!((moved.x() - 111_319.490_793).abs() < 0.01);
        assert!(moved.y().abs() < 0.01);
        assert!(ds.features[1].geometry.is_none());
    }
}
