use std::collections::HashMap;

use geo::{Geometry, MultiLineString, MultiPolygon, Simplify};
use tracing::{debug, info};

use crate::dataset::{Dataset, Feature, GeometryKind};

/// Douglas-Peucker vertex reduction, per geometry kind. Members of a
/// multi-geometry are simplified one by one and reassembled into the same
/// kind; anything else is returned unchanged.
pub fn simplify_geometry(geometry: Geometry<f64>, tolerance: f64) -> Geometry<f64> {
    let tolerance = effective_tolerance(tolerance);
    if tolerance == 0.0 {
        return geometry;
    }

    match geometry {
        Geometry::Polygon(polygon) => Geometry::Polygon(polygon.simplify(&tolerance)),
        Geometry::LineString(line) => Geometry::LineString(line.simplify(&tolerance)),
        Geometry::MultiPolygon(polygons) => Geometry::MultiPolygon(MultiPolygon::new(
            polygons
                .0
                .iter()
                .map(|polygon| polygon.simplify(&tolerance))
                .collect(),
        )),
        Geometry::MultiLineString(lines) => Geometry::MultiLineString(MultiLineString::new(
            lines
                .0
                .iter()
                .map(|line| line.simplify(&tolerance))
                .collect(),
        )),
        other => other,
    }
}

pub fn simplify_feature(feature: &mut Feature, tolerance: f64) {
    if let Some(geometry) = feature.geometry.take() {
        feature.geometry = Some(simplify_geometry(geometry, tolerance));
    }
}

/// Simplifies every feature in place. The feature count never changes.
pub fn simplify_dataset(dataset: &mut Dataset, tolerance: f64) {
    info!(
        "Simplifying {} features of {} with tolerance {}",
        dataset.len(),
        dataset.name,
        tolerance
    );
    let mut kinds: HashMap<GeometryKind, usize> = HashMap::new();
    for feature in &mut dataset.features {
        if let Some(geometry) = &feature.geometry {
            *kinds.entry(GeometryKind::of(geometry)).or_default() += 1;
        }
        simplify_feature(feature, tolerance);
    }
    debug!("Geometry kinds in {}: {:?}", dataset.name, kinds);
}

fn effective_tolerance(tolerance: f64) -> f64 {
    if tolerance.is_finite() && tolerance > 0.0 {
        tolerance
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{coord, line_string, point, polygon, LineString};
    use serde_json::Map;

    fn wiggly_line() -> LineString<f64> {
        line_string![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.4),
            (x: 20.0, y: -0.3),
            (x: 30.0, y: 0.2),
            (x: 40.0, y: 0.0),
        ]
    }

    fn jagged_square(offset: f64) -> geo::Polygon<f64> {
        polygon![
            (x: offset, y: 0.0),
            (x: offset + 50.0, y: 0.5),
            (x: offset + 100.0, y: 0.0),
            (x: offset + 100.0, y: 100.0),
            (x: offset, y: 100.0),
            (x: offset, y: 0.0),
        ]
    }

    #[test]
    fn zero_tolerance_keeps_vertices() {
        let line = Geometry::LineString(wiggly_line());
        let square = Geometry::Polygon(jagged_square(0.0));

        assert_eq!(simplify_geometry(line.clone(), 0.0), line);
        assert_eq!(simplify_geometry(square.clone(), 0.0), square);
    }

    #[test]
    fn tolerance_removes_small_deviations() {
        let simplified = simplify_geometry(Geometry::LineString(wiggly_line()), 1.0);

        match simplified {
            Geometry::LineString(line) => {
                assert_eq!(
                    line.0,
                    vec![coord! { x: 0.0, y: 0.0 }, coord! { x: 40.0, y: 0.0 }]
                );
            }
            other => panic!("kind changed: {other:?}"),
        }
    }

    #[test]
    fn polygon_stays_polygon() {
        let simplified = simplify_geometry(Geometry::Polygon(jagged_square(0.0)), 1.0);

        match simplified {
            Geometry::Polygon(polygon) => assert_eq!(polygon.exterior().0.len(), 5),
            other => panic!("kind changed: {other:?}"),
        }
    }

    #[test]
    fn multi_geometries_keep_their_parts() {
        let polygons = MultiPolygon::new(vec![
            jagged_square(0.0),
            jagged_square(200.0),
            jagged_square(400.0),
        ]);
        let lines = MultiLineString::new(vec![wiggly_line(), wiggly_line()]);

        match simplify_geometry(Geometry::MultiPolygon(polygons.clone()), 1.0) {
            Geometry::MultiPolygon(out) => {
                assert_eq!(out.0.len(), 3);
                for (simplified, original) in out.0.iter().zip(&polygons.0) {
                    assert_eq!(simplified, &original.simplify(&1.0));
                }
            }
            other => panic!("kind changed: {other:?}"),
        }

        match simplify_geometry(Geometry::MultiLineString(lines), 1.0) {
            Geometry::MultiLineString(out) => {
                assert_eq!(out.0.len(), 2);
                assert!(out.0.iter().all(|line| line.0.len() == 2));
            }
            other => panic!("kind changed: {other:?}"),
        }
    }

    #[test]
    fn other_kinds_pass_through() {
        let pt = Geometry::Point(point!(x: 3.0, y: 4.0));
        assert_eq!(simplify_geometry(pt.clone(), 1000.0), pt);

        let collection = Geometry::GeometryCollection(geo::GeometryCollection::from(vec![
            Geometry::LineString(wiggly_line()),
        ]));
        assert_eq!(simplify_geometry(collection.clone(), 1000.0), collection);
    }

    #[test]
    fn null_geometry_is_tolerated() {
        let mut feature = Feature {
            geometry: None,
            properties: Map::new(),
        };
        simplify_feature(&mut feature, 1000.0);
        assert!(feature.geometry.is_none());
    }

    #[test]
    fn invalid_tolerance_is_a_no_op() {
        let line = Geometry::LineString(wiggly_line());
        assert_eq!(simplify_geometry(line.clone(), -5.0), line);
        assert_eq!(simplify_geometry(line.clone(), f64::NAN), line);
    }
}
