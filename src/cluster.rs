//! Feature-count reduction for very dense layers.
//!
//! Feature centroids are grouped with DBSCAN and every group is dissolved
//! into a single feature. With the default `min_samples` of 1 every point is
//! a core point, so clusters are simply the connected components of the
//! "closer than `eps`" graph.

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};

use geo::{
    BooleanOps, Centroid, Geometry, GeometryCollection, LineString, MultiLineString,
    MultiPoint, MultiPolygon, Point, Polygon,
};
use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde_json::Map;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::dataset::{Dataset, Feature};
use crate::error::ReduceError;

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Feature counts around one reduction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionSummary {
    pub before: usize,
    pub after: usize,
}

pub fn needs_reduction(feature_count: usize, config: &PipelineConfig) -> bool {
    feature_count > config.max_features
}

/// Clusters the dataset's centroids and dissolves each cluster into one
/// feature. On error the dataset is left as it was.
pub fn reduce_density(
    dataset: &mut Dataset,
    config: &PipelineConfig,
) -> Result<ReductionSummary, ReduceError> {
    let radius = config.cluster_radius;
    if !radius.is_finite() || radius <= 0.0 {
        return Err(ReduceError::InvalidRadius(radius));
    }

    info!(
        "Clustering and merging {} features of {} to reduce count",
        dataset.len(),
        dataset.name
    );
    let points = centroids(&dataset.features)?;
    let clustering = dbscan(&points, radius, config.cluster_min_samples);
    debug!("Found {} clusters", clustering.clusters);

    // geo's boolean ops can panic on degenerate rings.
    let merged =
        panic::catch_unwind(AssertUnwindSafe(|| dissolve(&dataset.features, &clustering.labels)))
            .map_err(|payload| ReduceError::Union(panic_message(payload.as_ref())))?;

    let summary = ReductionSummary {
        before: dataset.len(),
        after: merged.len(),
    };
    dataset.features = merged;
    info!(
        "Resulting feature count after spatial clustering and dissolve: {}",
        summary.after
    );
    Ok(summary)
}

fn centroids(features: &[Feature]) -> Result<Vec<[f64; 2]>, ReduceError> {
    features
        .iter()
        .enumerate()
        .map(|(index, feature)| {
            let centroid = feature
                .geometry
                .as_ref()
                .and_then(|geometry| geometry.centroid())
                .ok_or(ReduceError::NoCentroid { index })?;
            if !centroid.x().is_finite() || !centroid.y().is_finite() {
                return Err(ReduceError::NonFiniteCentroid { index });
            }
            Ok([centroid.x(), centroid.y()])
        })
        .collect()
}

/// Labels produced by one clustering pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clustering {
    /// One label per input point, each in `0..clusters`.
    pub labels: Vec<usize>,
    pub clusters: usize,
}

/// DBSCAN over `points`. Neighbourhoods include the point itself and every
/// point at distance `<= eps`. Points left as noise get a label of their
/// own, so every point belongs to exactly one cluster.
pub fn dbscan(points: &[[f64; 2]], eps: f64, min_samples: usize) -> Clustering {
    expand_clusters(points, eps, min_samples).0
}

/// Does the work of [`dbscan`], also returning how many points went through
/// the expansion queue. A point is labelled when queued, so that count never
/// exceeds `points.len()`.
fn expand_clusters(points: &[[f64; 2]], eps: f64, min_samples: usize) -> (Clustering, usize) {
    let min_samples = min_samples.max(1);
    let tree = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(index, point)| IndexedPoint::new(*point, index))
            .collect(),
    );
    let max_squared_radius = eps * eps;
    let neighbours = |index: usize| -> Vec<usize> {
        tree.locate_within_distance(points[index], max_squared_radius)
            .map(|neighbour| neighbour.data)
            .collect()
    };

    let mut labels: Vec<Option<usize>> = vec![None; points.len()];
    let mut noise = vec![false; points.len()];
    let mut next_label = 0;
    let mut enqueued = 0;

    for start in 0..points.len() {
        if labels[start].is_some() || noise[start] {
            continue;
        }
        let seeds = neighbours(start);
        if seeds.len() < min_samples {
            noise[start] = true;
            continue;
        }

        let label = next_label;
        next_label += 1;
        labels[start] = Some(label);

        let mut queue = VecDeque::new();
        enqueued += claim(seeds, label, &mut labels, &noise, &mut queue);
        while let Some(index) = queue.pop_front() {
            let reachable = neighbours(index);
            if reachable.len() >= min_samples {
                enqueued += claim(reachable, label, &mut labels, &noise, &mut queue);
            }
        }
    }

    let labels = labels
        .into_iter()
        .map(|label| {
            label.unwrap_or_else(|| {
                let singleton = next_label;
                next_label += 1;
                singleton
            })
        })
        .collect();
    let clustering = Clustering {
        labels,
        clusters: next_label,
    };
    (clustering, enqueued)
}

/// Labels every unlabelled candidate and queues those that may still be
/// core points. Returns how many were queued.
fn claim(
    candidates: Vec<usize>,
    label: usize,
    labels: &mut [Option<usize>],
    noise: &[bool],
    queue: &mut VecDeque<usize>,
) -> usize {
    let mut queued = 0;
    for candidate in candidates {
        if labels[candidate].is_some() {
            continue;
        }
        labels[candidate] = Some(label);
        // Known not to be a core point: joins as a border point only.
        if !noise[candidate] {
            queue.push_back(candidate);
            queued += 1;
        }
    }
    queued
}

/// Merges all features sharing a label into one feature per label, in order
/// of each cluster's first member. The merged feature takes the attributes
/// of that first member; its geometry is the union of all members.
pub fn dissolve(features: &[Feature], labels: &[usize]) -> Vec<Feature> {
    debug_assert_eq!(features.len(), labels.len());

    let mut group_of: HashMap<usize, usize> = HashMap::new();
    let mut groups: Vec<(Map<String, serde_json::Value>, Vec<Geometry<f64>>)> = Vec::new();
    for (feature, label) in features.iter().zip(labels) {
        let group = *group_of.entry(*label).or_insert_with(|| {
            groups.push((feature.properties.clone(), Vec::new()));
            groups.len() - 1
        });
        if let Some(geometry) = &feature.geometry {
            groups[group].1.push(geometry.clone());
        }
    }

    groups
        .into_iter()
        .map(|(properties, members)| Feature {
            geometry: merge_geometries(members),
            properties,
        })
        .collect()
}

#[derive(Default)]
struct Parts {
    polygons: Vec<Polygon<f64>>,
    lines: Vec<LineString<f64>>,
    points: Vec<Point<f64>>,
}

impl Parts {
    fn add(&mut self, geometry: Geometry<f64>) {
        match geometry {
            Geometry::Point(point) => self.points.push(point),
            Geometry::MultiPoint(points) => self.points.extend(points.0),
            Geometry::Line(line) => self.lines.push(LineString::from(line)),
            Geometry::LineString(line) => self.lines.push(line),
            Geometry::MultiLineString(lines) => self.lines.extend(lines.0),
            Geometry::Polygon(polygon) => self.polygons.push(polygon),
            Geometry::MultiPolygon(polygons) => self.polygons.extend(polygons.0),
            Geometry::Rect(rect) => self.polygons.push(rect.to_polygon()),
            Geometry::Triangle(triangle) => self.polygons.push(triangle.to_polygon()),
            Geometry::GeometryCollection(collection) => {
                for member in collection {
                    self.add(member);
                }
            }
        }
    }
}

fn merge_geometries(mut members: Vec<Geometry<f64>>) -> Option<Geometry<f64>> {
    match members.len() {
        0 => return None,
        1 => return members.pop(),
        _ => {}
    }

    let mut parts = Parts::default();
    for member in members {
        parts.add(member);
    }

    let mut merged: Vec<Geometry<f64>> = Vec::new();
    if !parts.polygons.is_empty() {
        let mut dissolved = union_polygons(parts.polygons);
        merged.push(if dissolved.0.len() == 1 {
            Geometry::Polygon(dissolved.0.remove(0))
        } else {
            Geometry::MultiPolygon(dissolved)
        });
    }
    if !parts.lines.is_empty() {
        let mut lines = parts.lines;
        merged.push(if lines.len() == 1 {
            Geometry::LineString(lines.remove(0))
        } else {
            Geometry::MultiLineString(MultiLineString::new(lines))
        });
    }
    if !parts.points.is_empty() {
        let mut points = dedup_points(parts.points);
        merged.push(if points.len() == 1 {
            Geometry::Point(points.remove(0))
        } else {
            Geometry::MultiPoint(MultiPoint::new(points))
        });
    }

    if merged.len() == 1 {
        merged.pop()
    } else {
        Some(Geometry::GeometryCollection(GeometryCollection::from(merged)))
    }
}

fn union_polygons(polygons: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    let mut polygons = polygons.into_iter();
    let first = match polygons.next() {
        Some(polygon) => MultiPolygon::new(vec![polygon]),
        None => return MultiPolygon::new(Vec::new()),
    };
    polygons.fold(first, |acc, polygon| {
        acc.union(&MultiPolygon::new(vec![polygon]))
    })
}

fn dedup_points(points: Vec<Point<f64>>) -> Vec<Point<f64>> {
    let mut seen = HashSet::new();
    points
        .into_iter()
        .filter(|point| seen.insert((point.x().to_bits(), point.y().to_bits())))
        .collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
